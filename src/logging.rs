//! Tracing configuration and log routing.
//!
//! The server logs to stdout and to a file chosen by `ANALYZER_LOG_FILE`: unset means a daily
//! rolling `logs/proposal-analyzer.log`, `off` disables the file, anything else is a path to
//! append to. The file layer also records span closes, so each `analyze` span leaves one line
//! carrying its `request_id`, `filename` and busy/idle time. The CLI logs to stderr instead of
//! stdout because stdout carries its JSON output.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, fmt::format::FmtSpan, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_VAR: &str = "ANALYZER_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "proposal-analyzer.log";
/// `tower_http` emits request and latency events at debug level.
const DEFAULT_FILTER: &str = "info,tower_http=debug";

/// Where file logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// No file logging.
    Disabled,
    /// Append to a single file.
    File(PathBuf),
    /// Daily rolling files under `directory` named after `prefix`.
    Rolling {
        /// Directory holding the rolled files.
        directory: PathBuf,
        /// File name prefix.
        prefix: String,
    },
}

impl LogTarget {
    /// Interpret the value of `ANALYZER_LOG_FILE`.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Rolling {
                directory: PathBuf::from(DEFAULT_LOG_DIR),
                prefix: DEFAULT_LOG_FILE.to_string(),
            },
            Some(value) if value.eq_ignore_ascii_case("off") => Self::Disabled,
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }

    fn open(&self) -> Option<NonBlocking> {
        let (writer, guard) = match self {
            Self::Disabled => return None,
            Self::File(path) => {
                match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                    Ok(file) => tracing_appender::non_blocking(file),
                    Err(err) => {
                        eprintln!("Failed to open log file {}: {err}", path.display());
                        return None;
                    }
                }
            }
            Self::Rolling { directory, prefix } => {
                if let Err(err) = std::fs::create_dir_all(directory) {
                    eprintln!("Failed to create log directory {}: {err}", directory.display());
                    return None;
                }
                tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, prefix))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Some(writer)
    }
}

/// Configure tracing for the HTTP server: compact stdout plus the configured file target.
///
/// Respects `RUST_LOG`; the default filter keeps `info` and adds `tower_http` request events.
pub fn init_tracing() {
    let target = LogTarget::from_setting(std::env::var(LOG_FILE_VAR).ok().as_deref());
    install(target, false);
}

/// Configure tracing for command-line tools: compact stderr plus the configured file target.
pub fn init_cli_tracing() {
    let target = LogTarget::from_setting(std::env::var(LOG_FILE_VAR).ok().as_deref());
    install(target, true);
}

fn install(target: LogTarget, console_to_stderr: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console_layer = if console_to_stderr {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    } else {
        fmt::layer().with_target(false).compact().boxed()
    };
    let file_layer = target.open().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
