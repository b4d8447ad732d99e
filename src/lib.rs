//! Aggregation of media albums into single webhook deliveries.
//!
//! Messaging platforms deliver an album as a burst of independent media
//! messages. [`AlbumBuffer`] collects the messages that share an album id
//! and, once the album has been quiet for the configured wait, hands one
//! combined payload to an [`AlbumDelivery`] implementation such as
//! [`WebhookDelivery`].

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

pub mod album_buffer;
pub mod config;
pub mod delivery;
mod error;
pub mod key_extractor;
pub mod router;

pub use album_buffer::{
    AlbumBuffer, AlbumDelivery, AlbumMessage, AlbumMetadata, AlbumPayload, SessionContext,
};
pub use config::{AlbumBufferConfig, RelayConfig};
pub use delivery::{ChannelDelivery, Delivered, WebhookDelivery};
pub use error::{AlbumRelayError, Result};
pub use key_extractor::{MessageContext, parent_message_key};
pub use router::{Envelope, route};

const LOG_FILE_PREFIX: &str = "album-relay";

struct TracingState {
    installed: bool,
    guards: Vec<WorkerGuard>,
}

static TRACING: Mutex<TracingState> = Mutex::new(TracingState {
    installed: false,
    guards: Vec::new(),
});

/// Installs the global tracing subscriber: stdout plus a daily rolling
/// `album-relay.<date>.log` in `logs_dir`.
///
/// Calls after the first successful one return `Ok` without changing
/// anything.
///
/// # Errors
///
/// Returns [`AlbumRelayError::Filesystem`] if `logs_dir` cannot be created
/// and [`AlbumRelayError::LoggingSetup`] if the log file cannot be opened or
/// another subscriber is already installed.
pub fn init_tracing(logs_dir: &Path) -> Result<()> {
    let mut tracing_state = TRACING.lock().unwrap_or_else(PoisonError::into_inner);
    if tracing_state.installed {
        return Ok(());
    }

    std::fs::create_dir_all(logs_dir)?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(logs_dir)
        .map_err(|e| AlbumRelayError::LoggingSetup(e.to_string()))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(Layer::new().with_writer(stdout_writer).with_target(true))
        .with(
            Layer::new()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| AlbumRelayError::LoggingSetup(e.to_string()))?;

    tracing_state.installed = true;
    tracing_state.guards = vec![file_guard, stdout_guard];
    Ok(())
}

/// Flushes buffered log lines by dropping the background writer guards.
/// Logging stays installed but nothing is written after this.
pub fn flush_tracing() {
    TRACING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .guards
        .clear();
}
