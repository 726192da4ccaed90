//! Log output setup and credential-safe formatting helpers.
//!
//! [`init_logging`] installs the global `tracing` subscriber described by a
//! [`LoggingSection`]: text or JSON lines, to stderr or to a daily-rolling
//! file. The returned [`LoggingGuard`] must stay alive for the life of the
//! process so buffered file output is flushed on exit.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingSection};
use crate::error::DocentError;

/// Guard that must be kept alive for the duration of the application
/// to ensure proper log flushing.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level when set. Fails if a subscriber
/// is already installed.
pub fn init_logging(config: &LoggingSection) -> crate::Result<LoggingGuard> {
    // Dependency chatter stays out of the log unless RUST_LOG asks for it.
    let directives = format!(
        "{},tokio=warn,hyper=warn,reqwest=warn,tungstenite=warn",
        config.level
    );
    let filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&directives))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_guard = match &config.file {
        Some(path) => {
            let directory = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let file_name = path.file_name().ok_or_else(|| {
                DocentError::configuration(format!(
                    "log file path '{}' has no file name",
                    path.display()
                ))
            })?;
            fs::create_dir_all(directory).map_err(|e| {
                DocentError::configuration(format!(
                    "failed to create log directory '{}': {}",
                    directory.display(),
                    e
                ))
            })?;

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(
                    "%Y-%m-%d %H:%M:%S%.3f UTC".to_string(),
                ));
            match config.format {
                LogFormat::Json => tracing_subscriber::registry()
                    .with(filter())
                    .with(layer.json())
                    .try_init(),
                LogFormat::Text => tracing_subscriber::registry()
                    .with(filter())
                    .with(layer)
                    .try_init(),
            }
            .map_err(|e| DocentError::configuration(format!("logging setup failed: {}", e)))?;
            Some(guard)
        }
        None => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true);
            match config.format {
                LogFormat::Json => tracing_subscriber::registry()
                    .with(filter())
                    .with(layer.json())
                    .try_init(),
                LogFormat::Text => tracing_subscriber::registry()
                    .with(filter())
                    .with(layer)
                    .try_init(),
            }
            .map_err(|e| DocentError::configuration(format!("logging setup failed: {}", e)))?;
            None
        }
    };

    info!(format = ?config.format, file = ?config.file, "logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"sk-[A-Za-z0-9_-]{10,}").unwrap());

/// Obscures a credential string by showing only the first few characters.
///
/// # Examples
///
/// ```rust
/// use docent::logging::obscure_credential;
///
/// let credential = "sk-ant-REDACTED";
/// assert_eq!(obscure_credential(credential), "sk-ant***");
/// ```
pub fn obscure_credential(credential: &str) -> String {
    let char_count = credential.chars().count();
    if char_count <= 6 {
        "*".repeat(char_count)
    } else {
        let prefix: String = credential.chars().take(6).collect();
        format!("{}***", prefix)
    }
}

/// Replaces anything that looks like an API key with its obscured form.
///
/// Useful for sanitizing upstream error bodies before they reach the log.
pub fn sanitize_for_logging(input: &str) -> String {
    SECRET_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            obscure_credential(&caps[0])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_obscure_credential() {
        assert_eq!(obscure_credential("sk-ant-REDACTED"), "sk-ant***");
        assert_eq!(obscure_credential("short"), "*****");
        assert_eq!(obscure_credential(""), "");
        assert_eq!(obscure_credential("a"), "*");
    }

    #[test]
    fn test_sanitize_for_logging() {
        let input = "authentication failed for key sk-ant-REDACTED, retry later";
        let sanitized = sanitize_for_logging(input);
        assert!(sanitized.contains("sk-ant***"));
        assert!(!sanitized.contains("verylongsecret"));
        assert!(sanitized.contains("retry later"));

        // Ordinary text passes through untouched.
        assert_eq!(sanitize_for_logging("no secrets here"), "no secrets here");
    }

    #[test]
    fn test_init_logging_is_single_shot() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingSection {
            level: "debug".to_string(),
            format: LogFormat::Json,
            file: Some(dir.path().join("logs").join("docent.log")),
        };

        let _guard = init_logging(&config).unwrap();
        assert!(dir.path().join("logs").is_dir());
        tracing::info!("logging smoke test line");

        // The global subscriber can only be installed once per process.
        let again = init_logging(&LoggingSection {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        });
        assert!(again.is_err());
    }

    #[test]
    fn test_log_file_path_needs_a_file_name() {
        let config = LoggingSection {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: Some(PathBuf::from("/tmp/docent-logs/..")),
        };
        assert!(init_logging(&config).is_err());
    }
}
