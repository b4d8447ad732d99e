use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::BufferInner;

/// The delayed flush armed for one generation of a pending album.
///
/// The task only holds a weak reference to the buffer, so timers left behind
/// by a dropped buffer expire without doing anything.
pub(crate) struct FlushTimer {
    handle: JoinHandle<()>,
}

impl FlushTimer {
    /// Arms a flush of `album_id` that fires `wait` from now, unless the album
    /// has been rescheduled to a newer generation by then.
    pub fn arm(
        runtime: &Handle,
        buffer: Weak<BufferInner>,
        album_id: String,
        generation: u64,
        wait: Duration,
    ) -> Self {
        // The deadline is taken at arm time, not when the task is first polled.
        let deadline = Instant::now() + wait;

        let handle = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let Some(buffer) = buffer.upgrade() else {
                tracing::trace!(
                    target: "album_relay::album_buffer::scheduler",
                    "Buffer dropped before album {} timer fired",
                    album_id
                );
                return;
            };

            buffer.flush_generation(&album_id, generation).await;
        });

        Self { handle }
    }

    /// Stops the timer. Best-effort: a task that already left its sleep
    /// finds a newer generation (or no album) and does nothing.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Lets go of the handle without aborting the task.
    ///
    /// Used by the timer's own flush, which must not cancel itself while the
    /// album is being delivered.
    pub fn release(self) {
        drop(self.handle);
    }
}
