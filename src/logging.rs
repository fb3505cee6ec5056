//! Log output for the pdfchat server.
//!
//! Everything is printed to stdout. A copy also goes to a log file, picked by
//! `PDFCHAT_LOG_FILE`: unset means `logs/pdfchat.log`, `off` disables the copy, any other
//! value is a path to append to. `RUST_LOG` filters both outputs.
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "PDFCHAT_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "pdfchat.log";
const DEFAULT_FILTER: &str = "info";

// Dropping the guard stops the background writer, so it lives as long as the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file copy of the logs is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// `logs/pdfchat.log` under the working directory.
    Default,
    /// A file named by the operator, opened for appending.
    File(PathBuf),
    /// No file copy.
    Disabled,
}

/// Resolve the log file setting from `lookup`.
pub fn log_destination<F>(lookup: F) -> LogDestination
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(LOG_FILE_ENV).map(|value| value.trim().to_string()) {
        None => LogDestination::Default,
        Some(value) if value.is_empty() => LogDestination::Default,
        Some(value) if value.eq_ignore_ascii_case("off") => LogDestination::Disabled,
        Some(value) => LogDestination::File(PathBuf::from(value)),
    }
}

/// Install the global subscriber. Call once, before anything worth logging happens.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry().with(filter).with(console);

    let destination = log_destination(|key| std::env::var(key).ok());
    match open_writer(&destination) {
        Ok(Some((writer, guard))) => {
            let _ = FILE_GUARD.set(guard);
            registry
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_target(true)
                        .with_ansi(false)
                        .compact(),
                )
                .init();
        }
        Ok(None) => registry.init(),
        Err(err) => {
            // No subscriber exists yet, so this cannot go through tracing.
            eprintln!("Logging to stdout only; could not open log file: {err}");
            registry.init();
        }
    }
}

fn open_writer(destination: &LogDestination) -> io::Result<Option<(NonBlocking, WorkerGuard)>> {
    let file = match destination {
        LogDestination::Disabled => return Ok(None),
        LogDestination::File(path) => append_to(path)?,
        LogDestination::Default => {
            fs::create_dir_all(DEFAULT_LOG_DIR)?;
            append_to(&Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_NAME))?
        }
    };
    Ok(Some(tracing_appender::non_blocking(file)))
}

fn append_to(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| io::Error::new(err.kind(), format!("{}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination_for(value: Option<&str>) -> LogDestination {
        log_destination(|key| {
            assert_eq!(key, LOG_FILE_ENV);
            value.map(str::to_string)
        })
    }

    #[test]
    fn unset_or_blank_uses_default_file() {
        assert_eq!(destination_for(None), LogDestination::Default);
        assert_eq!(destination_for(Some("  ")), LogDestination::Default);
    }

    #[test]
    fn off_disables_file_copy() {
        assert_eq!(destination_for(Some("OFF")), LogDestination::Disabled);
    }

    #[test]
    fn explicit_path_is_kept() {
        assert_eq!(
            destination_for(Some(" /var/log/pdfchat.log ")),
            LogDestination::File(PathBuf::from("/var/log/pdfchat.log"))
        );
    }

    #[test]
    fn disabled_destination_opens_nothing() {
        assert!(open_writer(&LogDestination::Disabled).unwrap().is_none());
    }

    #[test]
    fn unopenable_path_names_the_file() {
        let missing = std::env::temp_dir()
            .join(uuid::Uuid::new_v4().to_string())
            .join("pdfchat.log");
        let Err(err) = open_writer(&LogDestination::File(missing.clone())) else {
            panic!("opening a file in a missing directory should fail");
        };
        assert!(err.to_string().contains(&missing.display().to_string()));
    }
}
