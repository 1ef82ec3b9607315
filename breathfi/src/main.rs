mod cli;
mod ingest;
mod monitor;
mod query;

use clap::Parser;
use cli::{Cli, Commands};
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::error::Error;
use std::fs::OpenOptions;

use crate::ingest::run_ingest;
use crate::monitor::run_monitor;
use crate::query::{run_bpm, run_replay};

/// Result of a command; errors may cross thread boundaries.
pub type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Could not set up logging: {}", e);
    }

    let result = match cli.command {
        Commands::Ingest(args) => run_ingest(args),
        Commands::Monitor(args) => run_monitor(args),
        Commands::Replay(args) => run_replay(args),
        Commands::Bpm(args) => run_bpm(args),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        cli.loglevel,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(path) = &cli.logfile {
        loggers.push(WriteLogger::new(
            cli.loglevel,
            Config::default(),
            OpenOptions::new().create(true).append(true).open(path)?,
        ));
    }

    CombinedLogger::init(loggers)?;
    Ok(())
}
