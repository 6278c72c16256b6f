//! Structured logging for reprise
//!
//! Every cache decision is logged with structured fields so that test logs
//! show why an invocation was replayed or executed.
//!
//! # Log Format Conventions
//!
//! - `service`: The component ("sandbox", "store", "graph")
//! - `operation`: The operation being performed (e.g., "save", "restore", "export")
//! - `status`: The result status ("hit", "miss", "success", "error")
//! - `label`: Cache namespace supplied by the caller
//! - `fingerprint`: Content digest (hex-encoded)
//!
//! # Examples
//!
//! ```rust
//! use reprise::logging::{operations, services, status};
//! use tracing::info;
//!
//! let fingerprint = "9f86d081884c7d65";
//! info!(
//!     service = services::SANDBOX,
//!     operation = operations::RUN,
//!     status = status::HIT,
//!     label = "diff",
//!     fingerprint,
//!     "replaying cached outputs"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Formatter that shows "reprise" instead of the full module path
struct RepriseFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for RepriseFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:5}(reprise)\x1b[0m: ", level_style, meta.level())?;
        } else {
            write!(writer, "{:5}(reprise): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored
    Pretty,
    /// Same layout without colors (CI)
    Compact,
    /// JSON lines for log aggregation
    Json,
}

impl LogFormat {
    /// Parse from `REPRISE_LOG_FORMAT`
    pub fn from_env() -> Self {
        Self::parse(
            std::env::var("REPRISE_LOG_FORMAT").ok().as_deref(),
            std::env::var("CI").is_ok(),
        )
    }

    fn parse(value: Option<&str>, ci: bool) -> Self {
        match value.unwrap_or_default().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ if ci => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "info", "warn")
/// - `REPRISE_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
///
/// Logs go to stderr so that a mocked executable's stdout stays untouched.
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match LogFormat::from_env() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(RepriseFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(RepriseFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}

/// Service names
pub mod services {
    pub const SANDBOX: &str = "sandbox";
    pub const STORE: &str = "store";
    pub const GRAPH: &str = "graph";
}

/// Operation names
pub mod operations {
    pub const FINGERPRINT: &str = "fingerprint";
    pub const SAVE: &str = "save";
    pub const RESTORE: &str = "restore";
    pub const REGENERATE: &str = "regenerate";
    pub const EXECUTE: &str = "execute";
    pub const RUN: &str = "run";
    pub const EXPORT: &str = "export";
    pub const LOAD: &str = "load";
    pub const REHASH: &str = "rehash";
}

/// Status values
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const ERROR: &str = "error";
}
