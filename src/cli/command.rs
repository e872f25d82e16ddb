use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use frameparser::process::extract::StreamFormat;
use frameparser::utils::timing::DEFAULT_JITTER_TOLERANCE_US;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = concat!(
        env!("CARGO_PKG_VERSION"),
        " (frameparser ", env!("FRAMEPARSER_VERSION"),
        ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for inspecting MPEG audio and AAC elementary streams",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Largest tolerated difference between real and predicted playback times.
    #[arg(long, global = true, value_name = "MICROSECONDS", default_value_t = DEFAULT_JITTER_TOLERANCE_US)]
    pub jitter_tolerance_us: u64,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print stream information
    Info(InfoArgs),

    /// Dump one record per parsed frame, with its decode command.
    Frames(FramesArgs),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input elementary stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Stream syntax of the input.
    #[arg(long, value_enum, default_value_t = CodecArg::Auto)]
    pub codec: CodecArg,
}

#[derive(Debug, Args)]
pub struct FramesArgs {
    /// Input elementary stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Stream syntax of the input.
    #[arg(long, value_enum, default_value_t = CodecArg::Auto)]
    pub codec: CodecArg,

    /// Output YAML file; stdout when omitted.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum CodecArg {
    /// Detect from the first frames.
    Auto,
    /// MPEG-1/2/2.5 audio, layers I to III.
    MpegAudio,
    /// AAC in ADTS framing.
    Aac,
}

impl CodecArg {
    pub fn stream_format(self) -> Option<StreamFormat> {
        match self {
            CodecArg::Auto => None,
            CodecArg::MpegAudio => Some(StreamFormat::MpegAudio),
            CodecArg::Aac => Some(StreamFormat::Adts),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}
