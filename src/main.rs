use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use printlog::{lprint, Config, Logger, PrintOptions};

const DEFAULT_CONFIG: &str = "printlog.toml";

struct Args {
    config: PathBuf,
    crash: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: PathBuf::from(DEFAULT_CONFIG),
        crash: false,
    };
    for arg in std::env::args().skip(1) {
        if arg == "--crash" {
            args.crash = true;
        } else {
            args.config = PathBuf::from(arg);
        }
    }
    args
}

fn main() -> Result<()> {
    // Diagnostics from the logger itself go to stderr
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "printlog=warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args();
    let config = Config::load_or_default(&args.config)?;
    let logger = Logger::new(config).context("Failed to start logger")?;

    lprint!(logger, "System initializing...");
    lprint!(logger, "Loading modules"; end = "...");
    lprint!(logger, "Done!");

    logger.success(["Database connected successfully."]);
    logger.warning(["High latency detected:", "450ms"]);
    logger.error(["Connection dropped."]);
    logger.critical(["System Failure! Shutting down."]);
    logger
        .with(PrintOptions::new().sep(", "))
        .debug(["Variable state:", "x=10", "y=20"]);

    for pct in (0..=100).step_by(25) {
        lprint!(logger, format!("\rProgress: {pct}%"); end = "", flush = true);
    }
    lprint!(logger, "");

    if let Some(path) = logger.current_log_file() {
        lprint!(logger => info, "Logging to", path.display());
    }

    if args.crash {
        let divisor = std::hint::black_box(0);
        lprint!(logger, "Result:", 1 / divisor);
    }

    Ok(())
}
