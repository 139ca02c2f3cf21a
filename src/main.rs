//! tdlc: compile a TDL source and print the resolved timeline.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{debug, info, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use tdl::config::TdlConfig;
use tdl::Compiler;

const LOG_PATTERN: &str = "{h({l:<5})} {t} - {m}{n}";

/// Compile a Timeline Description Language source
#[derive(Parser)]
#[command(name = "tdlc")]
#[command(about = "Compile a Timeline Description Language source into a resolved schedule")]
#[command(version)]
struct Cli {
    /// Source file, or `-` to read stdin
    input: PathBuf,

    /// Config file (default: ~/.tdl/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// Skip statements whose bar position or event reference resolves to nothing
    #[arg(long)]
    lenient: bool,

    /// SMPTE frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Only validate the source, print nothing on success
    #[arg(long)]
    check: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tdlc: {e}");
            return ExitCode::from(2);
        }
    };

    let level = match cli.log_level {
        Some(level) => level.into(),
        None => config.level_filter().unwrap_or(LevelFilter::Info),
    };
    if let Err(e) = init_logging(level) {
        eprintln!("tdlc: failed to initialise logging: {e}");
        return ExitCode::from(2);
    }
    debug!("{config:?}");

    let mut options = config.parse_options();
    if cli.lenient {
        options.strict = false;
    }
    if let Some(fps) = cli.fps {
        if !(fps.is_finite() && fps > 0.0) {
            eprintln!("tdlc: --fps must be positive, got {fps}");
            return ExitCode::from(2);
        }
        options.smpte_fps = fps;
    }

    let source = match read_source(&cli.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("tdlc: cannot read {}: {e}", cli.input.display());
            return ExitCode::from(2);
        }
    };

    info!("compiling {}", cli.input.display());
    let (ok, timeline) = Compiler::with_options(options).parse(&source);
    if !ok {
        return ExitCode::from(1);
    }

    info!(
        "{} event definitions, {} scheduled, duration {}",
        timeline.event_defs().len(),
        timeline.events().len(),
        timeline.duration()
    );
    if !cli.check {
        println!("{timeline}");
    }
    ExitCode::SUCCESS
}

/// Explicit paths must load; the standard path falls back to defaults.
fn load_config(path: Option<&Path>) -> Result<TdlConfig, tdl::config::ConfigError> {
    match path {
        Some(path) => TdlConfig::load_from(path),
        None => Ok(TdlConfig::load().unwrap_or_default()),
    }
}

fn init_logging(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn read_source(input: &Path) -> std::io::Result<String> {
    if input == Path::new("-") {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(input)
    }
}
