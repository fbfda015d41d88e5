use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use utils::version;

/// Report GPU memory and per-process GPU usage through NVML.
///
/// NVML is loaded at runtime; entry points the installed driver lacks are
/// reported as unavailable instead of failing the run.
#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    /// Output format for the report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// NVML library to try before the default sonames
    #[arg(long, value_name = "PATH")]
    pub lib_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_text_and_default_library() {
        let cli = Cli::try_parse_from(["nvml-info"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.lib_path, None);
    }

    #[test]
    fn format_and_library_can_be_chosen() {
        let cli = Cli::try_parse_from([
            "nvml-info",
            "--format",
            "json",
            "--lib-path",
            "/usr/lib64/libnvidia-ml.so.1",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(
            cli.lib_path,
            Some(PathBuf::from("/usr/lib64/libnvidia-ml.so.1"))
        );
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["nvml-info", "extra"]).is_err());
    }
}
