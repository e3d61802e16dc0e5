mod cli;
mod commands;
mod fetch_ui;
mod format;
mod interactive;
mod output;

use bukusync::{config, error::Result};
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Initialize logger; --debug wins over RUST_LOG
    let mut logger = env_logger::Builder::from_default_env();
    if args.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if args.version {
        println!("bukusync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let cfg = if let Some(config_path) = &args.config {
        config::Config::load_from_path(config_path)?
    } else {
        config::Config::load()
    };

    cli::handle_args(args, &cfg)
}
