//! Album Buffer Module
//!
//! Media sent as an album arrives as a burst of separate messages that share
//! a parent message key. The buffer collects them per album id and emits a
//! single aggregated payload once no new message has arrived for the
//! configured wait. Every new message restarts the wait, so an album flushes
//! after its *last* message, not its first.
//!
//! All mutations happen under one store-wide write lock. Payload building and
//! delivery happen after the lock is released.

mod dispatcher;
mod scheduler;
mod types;


pub use dispatcher::AlbumDelivery;
pub use types::{
    ALBUM_PAYLOAD_TYPE, AlbumMessage, AlbumMetadata, AlbumPayload, SessionContext,
};

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::config::AlbumBufferConfig;
use crate::error::{AlbumRelayError, Result};
use dispatcher::FlushDispatcher;
use scheduler::FlushTimer;
use types::PendingAlbum;

/// Buffer of albums that are still collecting messages.
///
/// Cloning is cheap and every clone refers to the same store, so one buffer
/// can be shared by all producers of a session. The buffer is created with
/// [`AlbumBuffer::init`] and torn down with [`AlbumBuffer::shutdown`].
#[derive(Clone)]
pub struct AlbumBuffer {
    inner: Arc<BufferInner>,
}

pub(crate) struct BufferInner {
    config: AlbumBufferConfig,
    state: RwLock<BufferState>,
    dispatcher: FlushDispatcher,
    runtime: Handle,

    /// Signalled whenever an album leaves the buffer for good
    settled: Notify,
}

#[derive(Default)]
struct BufferState {
    albums: HashMap<String, PendingAlbum>,

    /// Source of timer generations, unique across all albums for the
    /// lifetime of the buffer
    next_generation: u64,

    /// Albums taken out of the map whose delivery has not returned yet
    in_flight: usize,

    shut_down: bool,
}

/// Marks one album as in flight until dropped, including when the
/// delivering task is aborted.
struct InFlight<'a> {
    inner: &'a BufferInner,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.inner.write_state().in_flight -= 1;
        self.inner.settled.notify_waiters();
    }
}

impl std::fmt::Debug for AlbumBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlbumBuffer")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_count())
            .field("delivery", &"<REDACTED>")
            .finish()
    }
}

impl AlbumBuffer {
    /// Creates a buffer bound to the current tokio runtime.
    ///
    /// Flush timers are spawned on that runtime, so this must be called from
    /// within it.
    ///
    /// # Errors
    ///
    /// Returns [`AlbumRelayError::NoRuntime`] when called outside a runtime.
    pub fn init(config: AlbumBufferConfig, delivery: Arc<dyn AlbumDelivery>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| AlbumRelayError::NoRuntime)?;

        tracing::info!(
            target: "album_relay::album_buffer",
            "Album buffer initialized (wait: {:?}, enabled: {})",
            config.wait,
            config.enabled
        );

        Ok(Self {
            inner: Arc::new(BufferInner {
                config,
                state: RwLock::new(BufferState::default()),
                dispatcher: FlushDispatcher::new(delivery),
                runtime,
                settled: Notify::new(),
            }),
        })
    }

    /// Whether album grouping is enabled. Callers are expected to bypass the
    /// buffer entirely when it is not.
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// How long an album may stay idle before its timer flushes it
    pub fn wait(&self) -> Duration {
        self.inner.config.wait
    }

    /// Adds a message to the album `album_id`, opening the album if needed.
    ///
    /// Returns `true` when this message opened the album. Every call
    /// (re)arms the album's flush timer for the full wait.
    ///
    /// # Arguments
    ///
    /// * `album_id` - The album's parent message key
    /// * `message` - The media item to append
    /// * `metadata` - Seeds a new album; for an open album only its caption is used
    ///
    /// # Errors
    ///
    /// Returns [`AlbumRelayError::EmptyAlbumId`] for an empty album id and
    /// [`AlbumRelayError::BufferShutDown`] once the buffer has been shut down.
    pub fn add_message(
        &self,
        album_id: &str,
        message: AlbumMessage,
        metadata: AlbumMetadata,
    ) -> Result<bool> {
        if album_id.is_empty() {
            return Err(AlbumRelayError::EmptyAlbumId);
        }

        let mut state = self.inner.write_state();
        if state.shut_down {
            return Err(AlbumRelayError::BufferShutDown);
        }

        state.next_generation += 1;
        let generation = state.next_generation;

        let (album, is_first) = match state.albums.entry(album_id.to_owned()) {
            Entry::Occupied(entry) => {
                let album = entry.into_mut();
                album.merge_caption(&metadata.caption);
                (album, false)
            }
            Entry::Vacant(entry) => (entry.insert(PendingAlbum::new(album_id, metadata)), true),
        };

        let timer = FlushTimer::arm(
            &self.inner.runtime,
            Arc::downgrade(&self.inner),
            album_id.to_owned(),
            generation,
            self.inner.config.wait,
        );
        album.generation = generation;
        if let Some(previous) = album.timer.replace(timer) {
            previous.cancel();
        }

        if is_first {
            tracing::info!(
                target: "album_relay::album_buffer",
                "New album {} detected in chat {}, waiting {:?}",
                album_id,
                album.chat,
                self.inner.config.wait
            );
        }

        tracing::debug!(
            target: "album_relay::album_buffer",
            "Message {} added to album {}",
            message.id,
            album_id
        );
        album.messages.push(message);

        tracing::debug!(
            target: "album_relay::album_buffer",
            "Album {} now holds {} messages",
            album_id,
            album.messages.len()
        );

        Ok(is_first)
    }

    /// Flushes `album_id` immediately instead of waiting for its timer.
    ///
    /// Returns `true` if an album was open and has been handed to delivery,
    /// `false` if it was already flushed or cancelled.
    pub async fn flush(&self, album_id: &str) -> bool {
        let album = {
            let mut state = self.inner.write_state();
            let Some(mut album) = state.albums.remove(album_id) else {
                return false;
            };
            if let Some(timer) = album.timer.take() {
                timer.cancel();
            }
            state.in_flight += 1;
            album
        };
        let _in_flight = InFlight { inner: &self.inner };

        self.inner.dispatcher.dispatch(album).await;
        true
    }

    /// Discards `album_id` without delivering it.
    ///
    /// Returns `true` if an album was discarded. Cancelling an album that is
    /// not open is a no-op.
    pub fn cancel(&self, album_id: &str) -> bool {
        let mut state = self.inner.write_state();
        let Some(mut album) = state.albums.remove(album_id) else {
            return false;
        };
        if let Some(timer) = album.timer.take() {
            timer.cancel();
        }
        drop(state);
        self.inner.settled.notify_waiters();

        tracing::debug!(
            target: "album_relay::album_buffer",
            "Album {} cancelled, dropped {} messages",
            album_id,
            album.messages.len()
        );
        true
    }

    /// Number of albums still collecting messages
    pub fn pending_count(&self) -> usize {
        self.inner.read_state().albums.len()
    }

    /// Ids of the albums still collecting messages, in no particular order
    pub fn pending_album_ids(&self) -> Vec<String> {
        self.inner.read_state().albums.keys().cloned().collect()
    }

    /// Waits until no album is open and every flushed album has come back
    /// from delivery.
    ///
    /// Open albums are not flushed early; their timers still run for the
    /// full wait. Messages added while draining extend the wait.
    pub async fn drain(&self) {
        loop {
            let settled = self.inner.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            {
                let state = self.inner.read_state();
                if state.albums.is_empty() && state.in_flight == 0 {
                    return;
                }
            }

            settled.await;
        }
    }

    /// Cancels every open album without delivering it and rejects further
    /// messages. Returns the number of albums discarded.
    ///
    /// Deliveries already in flight are left to finish. Call
    /// [`AlbumBuffer::drain`] first to deliver what is still open.
    pub fn shutdown(&self) -> usize {
        let mut state = self.inner.write_state();
        state.shut_down = true;

        let discarded = state.albums.len();
        for (_, mut album) in state.albums.drain() {
            if let Some(timer) = album.timer.take() {
                timer.cancel();
            }
        }
        drop(state);
        self.inner.settled.notify_waiters();

        tracing::info!(
            target: "album_relay::album_buffer",
            "Album buffer shut down, discarded {} pending albums",
            discarded
        );
        discarded
    }
}

impl BufferInner {
    // The map is consistent at the end of every critical section, so a
    // poisoned lock is still safe to use.
    fn write_state(&self) -> RwLockWriteGuard<'_, BufferState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, BufferState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timer-driven flush. Only the timer armed for the album's current
    /// generation may flush it; older timers are no-ops.
    pub(crate) async fn flush_generation(&self, album_id: &str, generation: u64) -> bool {
        let album = {
            let mut state = self.write_state();
            match state.albums.get(album_id).map(|a| a.generation) {
                Some(current) if current == generation => {
                    state.in_flight += 1;
                    state.albums.remove(album_id)
                }
                Some(current) => {
                    tracing::trace!(
                        target: "album_relay::album_buffer",
                        "Ignoring stale timer for album {} (generation {}, current {})",
                        album_id,
                        generation,
                        current
                    );
                    None
                }
                None => None,
            }
        };

        let Some(mut album) = album else {
            return false;
        };
        let _in_flight = InFlight { inner: self };
        if let Some(timer) = album.timer.take() {
            timer.release();
        }

        self.dispatcher.dispatch(album).await;
        true
    }
}
