//! Install a global `tracing` subscriber configured from `RUST_LOG`.
//!
//! Console output goes to stderr so that stdout stays free for program data.
//! Programs pass their own default filter, used when `RUST_LOG` is unset.

use std::path::{Path, PathBuf};

use time::{UtcOffset, format_description::well_known::Iso8601};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("local UTC offset: {source}")]
    Offset {
        #[from]
        source: time::error::ComponentRange,
    },
    #[error("log filter \"{directives}\": {source}")]
    Filter {
        directives: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("log file {path}: {source}")]
    IoPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("setting global subscriber: {source}")]
    SetGlobal {
        #[from]
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

struct Guard {}

impl Drop for Guard {
    fn drop(&mut self) {}
}

/// Where and how to log.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset or empty. Nothing is logged when
    /// this is also `None`, except errors.
    pub default_filter: Option<String>,
    /// Also write to this file, without ANSI colors.
    pub file: Option<PathBuf>,
    pub disable_console: bool,
}

impl LogConfig {
    pub fn with_default_filter(default_filter: &str) -> Self {
        Self {
            default_filter: Some(default_filter.to_string()),
            ..Default::default()
        }
    }
}

/// The filter directives in effect given the value of `RUST_LOG`.
pub fn filter_directives(rust_log: Option<&str>, default_filter: Option<&str>) -> String {
    match rust_log.map(str::trim) {
        Some(var) if !var.is_empty() => var.to_string(),
        _ => default_filter.unwrap_or("error").to_string(),
    }
}

/// Log to the console, filtered by `RUST_LOG` or else `default_filter`.
pub fn init(default_filter: &str) -> Result<impl Drop + use<>, Error> {
    initiate_logging(&LogConfig::with_default_filter(default_filter))
}

/// Start logging to file and console, both optional.
pub fn initiate_logging(cfg: &LogConfig) -> Result<impl Drop + use<>, Error> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(rust_log.as_deref(), cfg.default_filter.as_deref());
    let filter = EnvFilter::try_new(&directives).map_err(|source| Error::Filter {
        directives: directives.clone(),
        source,
    })?;

    // Create a fixed offset time formatter based on the timezone at the
    // time this line of code runs.
    let timer = OffsetTime::new(
        UtcOffset::from_whole_seconds(chrono::Local::now().offset().local_minus_utc())?,
        Iso8601::DEFAULT,
    );

    let file_layer = match &cfg.file {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| Error::IoPath {
                path: path.display().to_string(),
                source,
            })?;
            Some(
                fmt::layer()
                    .with_timer(timer.clone())
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    let console_layer = if cfg.disable_console {
        None
    } else {
        Some(
            fmt::layer()
                .with_timer(timer)
                .with_writer(std::io::stderr)
                .with_ansi(!cfg!(windows))
                .with_target(false),
        )
    };

    let collector = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(filter);
    tracing::subscriber::set_global_default(collector)?;

    if let Some(path) = &cfg.file {
        log_started(Some(path), &directives);
    }
    if !cfg.disable_console {
        log_started(None, &directives);
    }

    Ok(Guard {})
}

fn log_started(path: Option<&Path>, directives: &str) {
    match path {
        Some(path) => tracing::debug!(
            "Logging initiated to file \"{}\" with filter \"{directives}\".",
            path.display()
        ),
        None => tracing::debug!("Logging initiated to console with filter \"{directives}\"."),
    }
}
