//! Tracing setup for the export pipeline.
//!
//! Logs go to stderr by default. When [`LoggingConfig::file`] is set the
//! subscriber appends plain (non-ANSI) output to that file instead, so a
//! long-running export can be inspected after the terminal is gone.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber from the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level filter. Safe to
/// call more than once; only the first call installs a subscriber.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if let Some(path) = &config.file {
        match open_log_file(path) {
            Ok(file) => {
                let builder = fmt::Subscriber::builder()
                    .with_env_filter(env_filter())
                    .with_writer(Mutex::new(file))
                    .with_ansi(false);
                if config.json {
                    tracing::subscriber::set_global_default(builder.json().finish()).ok();
                } else {
                    tracing::subscriber::set_global_default(builder.finish()).ok();
                }
                return;
            }
            Err(e) => {
                eprintln!(
                    "Failed to open log file {}: {e}; logging to stderr",
                    path.display()
                );
            }
        }
    }

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr);
    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish()).ok();
    } else {
        let subscriber = builder
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().append(true).create(true).open(path)
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() {
    init_logging(&LoggingConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_creates_and_appends() {
        let dir = std::env::temp_dir().join(format!("traceburn-log-{}", std::process::id()));
        let path = dir.join("export.log");

        let file = open_log_file(&path).unwrap();
        drop(file);
        assert!(path.exists());

        // Append mode: reopening must not truncate.
        std::fs::write(&path, b"first line\n").unwrap();
        let file = open_log_file(&path).unwrap();
        drop(file);
        assert_eq!(std::fs::read(&path).unwrap(), b"first line\n");

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn init_tolerates_repeated_calls() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            json: false,
            file: None,
        };
        init_logging(&config);
        init_logging(&config);
    }
}
