use std::io;

use anyhow::Result;
use clap::Parser;
use nvml_dyn::BindingTable;
use nvml_info::config::Cli;
use nvml_info::{output, walker};
use tracing_subscriber::filter::LevelFilter;
use utils::{logging, version};

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() {
    setup_global_hooks();

    let cli = Cli::parse();
    logging::init(LevelFilter::WARN);

    tracing::debug!("Starting nvml-info {}", &**version::VERSION);

    // Partial reports and a missing library both still exit successfully.
    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut table = match BindingTable::load(cli.lib_path.as_deref().map(|p| p.as_os_str())) {
        Ok(table) => table,
        Err(err) => {
            tracing::error!("{err}");
            return Ok(());
        }
    };

    let collection = walker::collect(&table);
    if let Some(err) = collection.status.error() {
        tracing::warn!("report is incomplete: {err}");
    }

    let result = output::render(&collection.info, cli.format, io::stdout().lock());
    table.shutdown();
    result
}
