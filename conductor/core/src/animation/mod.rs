//! Animation Loops
//!
//! Background tasks that keep replaying one robot animation: the "thinking"
//! loop while the provider works, and the "speaking" loop under the voice.
//!
//! # Design Philosophy
//!
//! - **Cooperative**: a loop checks its stop signal between iterations and
//!   never abandons an animation RPC halfway
//! - **Acknowledged**: [`AnimationLoop::stop`] resolves only once the task has
//!   exited, so the next command on the connection cannot race a straggler.
//!   A loop that cannot finish its RPC by the turn deadline is aborted
//! - **Self-limiting**: a failed RPC ends the loop instead of hammering a
//!   broken connection
//!
//! ```text
//! spawn ──▶ play ──▶ pause ──▶ play ──▶ ... ──▶ stop requested
//!             ▲                                   │
//!             └── in-flight RPC finishes first ◀──┘──▶ task exits ──▶ ack
//! ```

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::device::RpcGate;

/// A running animation loop
pub struct AnimationLoop {
    name: String,
    stop: CancellationToken,
    handle: JoinHandle<usize>,
}

impl AnimationLoop {
    /// Start replaying `name` through `gate`, pausing `interval` between plays
    pub fn spawn(gate: RpcGate, name: impl Into<String>, interval: Duration) -> Self {
        let name = name.into();
        let stop = CancellationToken::new();

        let task_stop = stop.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut iterations = 0usize;
            while !task_stop.is_cancelled() {
                if let Err(e) = gate.play_animation(&task_name, 1).await {
                    tracing::warn!(animation = %task_name, error = %e, "Animation loop stopped by RPC failure");
                    break;
                }
                iterations += 1;

                tokio::select! {
                    biased;
                    () = task_stop.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            tracing::trace!(animation = %task_name, iterations, "Animation loop exited");
            iterations
        });

        Self { name, stop, handle }
    }

    /// Animation this loop plays
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the loop and wait for it to exit
    ///
    /// Returns how many times the animation was played. A loop still stuck
    /// in an RPC at `deadline` is aborted, which drops the in-flight call,
    /// and counts as zero plays.
    pub async fn stop(mut self, deadline: Instant) -> usize {
        self.stop.cancel();
        let exited = tokio::time::timeout_at(deadline, &mut self.handle).await;
        match exited {
            Ok(Ok(iterations)) => iterations,
            Ok(Err(e)) => {
                tracing::warn!(animation = %self.name, error = %e, "Animation loop task failed");
                0
            }
            Err(_) => {
                tracing::warn!(animation = %self.name, "Animation loop did not stop in time, aborting");
                self.handle.abort();
                // Resolves once the aborted task has been dropped
                let _ = self.handle.await;
                0
            }
        }
    }
}
