//! Interrupt Watcher
//!
//! Watches a robot's sensor events while it speaks. The first touch or wake
//! word fires the turn's interrupt signal, a one-shot
//! [`CancellationToken`] the Conductor races every dispatch against.
//!
//! The watcher ends on the first qualifying event or when the turn stops it,
//! whichever comes first, and reports which one happened.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceEvent, RobotConnection};
use crate::messages::DeviceId;

/// Wait for an interrupting event or the stop signal
///
/// Returns `true` if an external interruption was observed, `false` if the
/// stop signal arrived first or the event stream ended.
pub async fn watch_for_interrupt(
    device: &DeviceId,
    mut events: mpsc::Receiver<DeviceEvent>,
    stop: CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => return false,
            event = events.recv() => match event {
                Some(event) if event.is_interrupt() => {
                    tracing::info!(device = %device, event = ?event, "Performance interrupted");
                    return true;
                }
                Some(event) => {
                    tracing::trace!(device = %device, event = ?event, "Ignoring device event");
                }
                None => {
                    tracing::debug!(device = %device, "Device event stream closed");
                    return false;
                }
            },
        }
    }
}

/// Background watcher bound to one turn
pub struct InterruptWatcher {
    stop: CancellationToken,
    handle: JoinHandle<bool>,
}

impl InterruptWatcher {
    /// Subscribe to the robot's events and start watching
    ///
    /// `interrupt` is cancelled when an interruption is observed. If the
    /// subscription fails, or is still pending at `deadline`, the turn
    /// simply cannot be interrupted.
    pub async fn start(
        connection: &dyn RobotConnection,
        interrupt: CancellationToken,
        deadline: Instant,
    ) -> Self {
        let device = connection.device().clone();
        let stop = CancellationToken::new();

        let subscribed = tokio::time::timeout_at(deadline, connection.subscribe_events())
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("no subscription before the turn deadline")));
        let handle = match subscribed {
            Ok(events) => {
                let stop = stop.clone();
                tokio::spawn(async move {
                    let observed = watch_for_interrupt(&device, events, stop).await;
                    if observed {
                        interrupt.cancel();
                    }
                    observed
                })
            }
            Err(e) => {
                tracing::warn!(device = %device, error = %e, "Event subscription failed; turn is not interruptible");
                let stop = stop.clone();
                tokio::spawn(async move {
                    stop.cancelled().await;
                    false
                })
            }
        };

        Self { stop, handle }
    }

    /// Stop watching and report whether an interruption was observed
    pub async fn stop(self) -> bool {
        self.stop.cancel();
        match self.handle.await {
            Ok(observed) => observed,
            Err(e) => {
                tracing::warn!(error = %e, "Interrupt watcher task failed");
                false
            }
        }
    }
}
