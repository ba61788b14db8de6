use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Parse `--logging-level`: INFO, WARNING (or WARN), ERROR; any case.
pub fn parse_level(s: &str) -> Result<Level, String> {
    match s.to_ascii_uppercase().as_str() {
        "INFO" => Ok(Level::INFO),
        "WARNING" | "WARN" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        "DEBUG" => Ok(Level::DEBUG),
        other => Err(format!(
            "unknown logging level '{other}' (expected INFO, WARNING or ERROR)"
        )),
    }
}

/// Directory that receives per-stage log files: the input's parent.
pub fn log_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Append plain-text logs for one stage to `<dir>/<file_name>`.
pub fn init_file(dir: &Path, file_name: &str, level: Level) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    SubscriberBuilder::default()
        .with_target(false)
        .with_ansi(false)
        .with_max_level(level)
        .with_writer(Mutex::new(file))
        .init();
    Ok(path)
}

/// Logs on stderr, for commands without an input file.
pub fn init_stderr() {
    SubscriberBuilder::default()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
