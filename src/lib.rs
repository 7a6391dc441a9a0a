pub mod annotations;
pub mod cli;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod report;
pub mod sampling;
pub mod settings;
pub mod table;
pub mod utils;
pub mod wrangle;

use clap::Parser;

pub use error::PipelineError;
pub use settings::PipelineSettings;

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = cli::Cli::parse();
    log::debug!("Running {:?}", cli.command);

    if let Err(err) = cli.execute() {
        log::error!("{err:#}");
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
