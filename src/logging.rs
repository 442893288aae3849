//! Logger setup for the mftpath binary
//!
//! The library only emits through the `log` facade. The binary installs
//! env_logger here, writing `[millis] [LEVEL] [target] message` lines to
//! stderr or to a log file that is truncated on every run.

use chrono::Utc;
use env_logger::{Builder, Env, Target};
use log::Level;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Default filter for a `-v` count; `RUST_LOG` wins when set
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Render one log line
pub fn format_line(timestamp_ms: i64, level: Level, target: &str, message: &str) -> String {
    format!("[{:013}] [{:5}] [{}] {}", timestamp_ms, level, target, message)
}

/// Install the global logger. Fails if the log file cannot be created or a
/// logger is already installed.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> io::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter(verbosity)));

    builder.format(|buf, record| {
        let line = format_line(
            Utc::now().timestamp_millis(),
            record.level(),
            record.target(),
            &record.args().to_string(),
        );
        writeln!(buf, "{}", line)
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
