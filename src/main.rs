use maskflow::app::replay::{SharedWriter, run_replay};
use maskflow::cli::Args;
use maskflow::config::{self, PathConfig, Settings};

use anyhow::Context;
use clap::Parser;
use log::{debug, info, warn};
use std::io::BufReader;
use std::sync::{Arc, Mutex};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());

    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // Initialize logger based on --log flag
    if let Some(log_path_opt) = &args.log_file {
        let log_path = match log_path_opt {
            Some(path) => path.clone(),
            None => {
                path_config.ensure_dirs()?;
                path_config.config_file(config::LOG_FILE)
            }
        };
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set); stdout carries the replay output
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level.as_str()))
            .format_timestamp_millis()
            .target(env_logger::Target::Stderr)
            .init();
    }

    info!("Maskflow v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = path_config.config_file(config::SETTINGS_FILE);
    info!("Config path: {}", settings_path.display());
    let settings = Settings::load(&settings_path)?.with_overrides(args.segment_size, args.timeout, args.no_confirm);
    debug!("Settings: {:?}", settings);

    let out: SharedWriter = Arc::new(Mutex::new(Box::new(std::io::stdout())));
    let summary = match &args.script {
        Some(path) => {
            info!("Replaying {}", path.display());
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open script: {}", path.display()))?;
            run_replay(&settings, BufReader::new(file), out)?
        }
        None => run_replay(&settings, std::io::stdin().lock(), out)?,
    };

    if summary.rejected > 0 {
        warn!("{} step(s) ended in a recoverable error", summary.rejected);
    }
    info!("Final session state: {}", summary.final_state);
    Ok(())
}
