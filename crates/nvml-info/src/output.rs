use std::io::Write;

use anyhow::{Context, Result};

use crate::config::OutputFormat;
use crate::report::SystemInfo;

/// Writes the report in the requested format.
pub fn render<W: Write>(info: &SystemInfo, format: OutputFormat, mut writer: W) -> Result<()> {
    match format {
        OutputFormat::Text => write!(writer, "{info}").context("write text report")?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, info).context("write json report")?;
            writeln!(writer).context("write json report")?;
        }
    }
    writer.flush().context("flush report")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_output_round_trips_through_serde_json() {
        let info = SystemInfo {
            nvml_version: "12.550.54.14".into(),
            cuda_version: 12_040,
            ..SystemInfo::default()
        };
        let mut out = Vec::new();
        render(&info, OutputFormat::Json, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["nvml_version"], "12.550.54.14");
        assert_eq!(value["cuda_version"], 12_040);
        assert!(out.ends_with(b"\n"));
    }

    #[test]
    fn text_output_matches_display() {
        let info = SystemInfo::default();
        let mut out = Vec::new();
        render(&info, OutputFormat::Text, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), info.to_string());
    }
}
