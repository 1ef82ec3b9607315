use breathfi_lib::{EngineConfig, PayloadFormat, DEFAULT_EXPECTED_LEN, DEFAULT_WINDOW_SECS};
use clap::{Args, Parser, Subcommand, ValueEnum};
use simplelog::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted duration argument, one year.
const MAX_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Parses a finite, strictly positive number of seconds.
fn positive_secs(arg: &str) -> Result<f64, String> {
    let secs = non_negative_secs(arg)?;
    if secs == 0.0 {
        return Err("must be greater than zero".to_string());
    }
    Ok(secs)
}

/// Parses a finite number of seconds between zero and one year.
fn non_negative_secs(arg: &str) -> Result<f64, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{}", e))?;
    if !secs.is_finite() || !(0.0..=MAX_SECS).contains(&secs) {
        return Err(format!("must be between 0 and {} seconds", MAX_SECS));
    }
    Ok(secs)
}

#[derive(Parser)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Log level for output (off, error, warn, info, debug, trace)
    #[arg(global = true, long, default_value = "info")]
    pub loglevel: LevelFilter,

    /// Additionally write log output to this file
    #[arg(global = true, long)]
    pub logfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode station payloads and store them in the frame database
    Ingest(IngestArgs),

    /// Continuously report the breathing rate of the most recent window
    Monitor(MonitorArgs),

    /// Evaluate sliding windows over the stored history
    Replay(ReplayArgs),

    /// Report the breathing rate of the most recent window once, as JSON
    Bpm(BpmArgs),
}

/// Encoding of ingested lines
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InputFormat {
    /// One `{"frames":[...]}` payload per line
    Json,
    /// `CSI_DATA` rows of the station's serial console
    Csv,
}

impl From<InputFormat> for PayloadFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Json => PayloadFormat::Json,
            InputFormat::Csv => PayloadFormat::Csv,
        }
    }
}

#[derive(Args)]
pub struct EngineArgs {
    /// Length of the estimation window in seconds
    #[arg(long, default_value_t = DEFAULT_WINDOW_SECS, value_parser = positive_secs)]
    pub window: f64,

    /// Expected length of a frame's interleaved I/Q sample list
    #[arg(long, default_value_t = DEFAULT_EXPECTED_LEN)]
    pub expected_len: usize,
}

impl EngineArgs {
    pub fn config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_window_secs(self.window)
            .with_expected_len(self.expected_len)
    }
}

#[derive(Parser)]
pub struct IngestArgs {
    /// SQLite frame database
    #[arg(long)]
    pub db: PathBuf,

    /// Read payloads from this file instead of stdin ('-' for stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Encoding of the input lines
    #[arg(long, value_enum, default_value = "json")]
    pub format: InputFormat,
}

#[derive(Parser)]
pub struct MonitorArgs {
    /// SQLite frame database
    #[arg(long)]
    pub db: PathBuf,

    /// Also ingest payloads from this file ('-' for stdin) while monitoring
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Encoding of the input lines
    #[arg(long, value_enum, default_value = "json")]
    pub format: InputFormat,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Seconds between two reports
    #[arg(long, default_value = "1", value_parser = positive_secs)]
    pub interval: f64,

    /// Seconds after start-up before the first estimate
    #[arg(long, default_value = "20", value_parser = non_negative_secs)]
    pub warmup: f64,
}

impl MonitorArgs {
    pub fn config(&self) -> EngineConfig {
        self.engine
            .config()
            .with_warmup(Duration::from_secs_f64(self.warmup))
    }
}

#[derive(Parser)]
pub struct ReplayArgs {
    /// SQLite frame database
    #[arg(long)]
    pub db: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Seconds between the starts of two windows
    #[arg(long, default_value = "1", value_parser = positive_secs)]
    pub step: f64,

    /// Write the window series to this file (.csv or .parquet)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser)]
pub struct BpmArgs {
    /// SQLite frame database
    #[arg(long)]
    pub db: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,
}
