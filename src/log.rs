use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub const LOG_FILE: &str = "train.log";

/// Installs the global subscriber: every event goes to stdout and is appended
/// to `log_file`. `RUST_LOG` wins over `default_level` when set.
///
/// If the log file cannot be opened, logging continues on stdout only.
pub fn init(default_level: &str, log_file: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = OpenOptions::new().create(true).append(true).open(log_file);
    let result = match file {
        Ok(f) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::io::stdout.and(Mutex::new(f)))
            .try_init(),
        Err(e) => {
            let r = tracing_subscriber::fmt().with_env_filter(filter).try_init();
            tracing::warn!(error = %e, path = %log_file.display(), "log file unavailable, stdout only");
            r
        }
    };
    // a second init keeps the first subscriber
    if result.is_err() {
        tracing::debug!("subscriber already installed");
    }
}

/// Numeric metric in one greppable shape: `metric step=.. name=.. value=..`.
pub fn scalar(step: u64, name: &str, value: f32) {
    tracing::info!(target: "metric", step, name, value = value as f64);
}
