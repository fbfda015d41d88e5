//! provides logging helpers

use tracing::Subscriber;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// fmt layer writing to stderr, so stdout stays reserved for reports
pub fn get_fmt_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    layer().with_writer(std::io::stderr).with_target(true)
}

/// initiate the global tracing subscriber
///
/// `RUST_LOG` overrides `default_level` when set.
pub fn init(default_level: filter::LevelFilter) {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt_layer = get_fmt_layer().with_filter(env_filter);

    // a subscriber may already be installed (tests, embedding binaries)
    let _ = registry().with(fmt_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init(filter::LevelFilter::WARN);
        init(filter::LevelFilter::DEBUG);
        tracing::warn!("logging initialised twice");
    }
}
