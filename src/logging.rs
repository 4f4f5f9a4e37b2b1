//! Logging setup and wire-message tracing.

use std::fmt;

use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::protocol::ClientId;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `filter`. Call once at startup; a second
/// call returns an error.
pub fn init_logging(filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::NONE)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging already initialised: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// Logs a wire line at debug level, truncated; the full line at trace level.
pub fn log_line(client: ClientId, direction: Direction, line: &str) {
    const PREVIEW: usize = 120;
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!(client, %direction, line, "message");
    } else {
        let end = line
            .char_indices()
            .nth(PREVIEW)
            .map_or(line.len(), |(i, _)| i);
        tracing::debug!(client, %direction, bytes = line.len(), preview = &line[..end], "message");
    }
}
