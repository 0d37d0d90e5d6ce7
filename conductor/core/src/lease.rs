//! Behavior Control Lease
//!
//! Exclusive ownership of a robot's actuators for the duration of a turn.
//!
//! # Protocol
//!
//! ```text
//! Conductor                          Robot
//!     │── Acquire(OverrideBehaviors) ──▶│
//!     │◀───────────── Granted ──────────│   lease held from here
//!     │            ... turn ...         │
//!     │── Release ─────────────────────▶│   best-effort, never awaited
//! ```
//!
//! Acquisition blocks until the robot grants control, refuses it, closes the
//! channel, or the timeout passes. Release is a non-blocking send that is
//! attempted exactly once per acquired lease: an explicit
//! [`ControlLease::release`] consumes the lease, and a lease dropped without
//! one releases itself. Release failures are logged and never escalated.
//!
//! A [`LeaseRegistry`] shared by every turn keeps at most one lease open per
//! device.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::device::{ControlPriority, ControlRequest, ControlResponse, RobotConnection};
use crate::error::AcquisitionError;
use crate::messages::DeviceId;

/// Lifecycle of a lease
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseState {
    /// Robot granted control
    Granted,
    /// Control handed back
    Released,
}

/// Devices with an open lease
#[derive(Debug, Default)]
pub struct LeaseRegistry {
    held: DashMap<DeviceId, ()>,
}

impl LeaseRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a lease is open for the device
    #[must_use]
    pub fn is_held(&self, device: &DeviceId) -> bool {
        self.held.contains_key(device)
    }

    /// Number of open leases
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Claim the device; false if already claimed
    fn claim(&self, device: &DeviceId) -> bool {
        match self.held.entry(device.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }

    fn unclaim(&self, device: &DeviceId) {
        self.held.remove(device);
    }
}

/// Pending claim, undone on drop unless kept
///
/// Covers an acquisition future dropped mid-handshake.
struct Claim<'a> {
    registry: &'a LeaseRegistry,
    device: &'a DeviceId,
    kept: bool,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.registry.unclaim(self.device);
        }
    }
}

/// Exclusive control of one robot
#[derive(Debug)]
pub struct ControlLease {
    device: DeviceId,
    requests: mpsc::Sender<ControlRequest>,
    // Held so the robot keeps the control stream open until release
    _responses: mpsc::Receiver<ControlResponse>,
    registry: Arc<LeaseRegistry>,
    state: LeaseState,
}

impl ControlLease {
    /// Request control and wait for the grant
    pub async fn acquire(
        connection: &dyn RobotConnection,
        registry: &Arc<LeaseRegistry>,
        timeout: Duration,
    ) -> Result<Self, AcquisitionError> {
        let device = connection.device().clone();
        if !registry.claim(&device) {
            return Err(AcquisitionError::AlreadyHeld { device });
        }
        let mut claim = Claim {
            registry,
            device: &device,
            kept: false,
        };

        match Self::handshake(connection, timeout).await {
            Ok((requests, responses)) => {
                claim.kept = true;
                drop(claim);
                tracing::debug!(device = %device, "Behavior control granted");
                Ok(Self {
                    device,
                    requests,
                    _responses: responses,
                    registry: Arc::clone(registry),
                    state: LeaseState::Granted,
                })
            }
            Err(e) => {
                drop(claim);
                tracing::warn!(device = %device, error = %e, "Behavior control not acquired");
                Err(e)
            }
        }
    }

    async fn handshake(
        connection: &dyn RobotConnection,
        timeout: Duration,
    ) -> Result<(mpsc::Sender<ControlRequest>, mpsc::Receiver<ControlResponse>), AcquisitionError>
    {
        // Opening the channel counts against the grant timeout too
        let exchange = async {
            let channel = connection
                .behavior_control()
                .await
                .map_err(|e| AcquisitionError::Connection(e.to_string()))?;
            let requests = channel.requests;
            let mut responses = channel.responses;

            requests
                .send(ControlRequest::Acquire(ControlPriority::OverrideBehaviors))
                .await
                .map_err(|_| AcquisitionError::ChannelClosed)?;

            match responses.recv().await {
                Some(ControlResponse::Granted) => Ok((requests, responses)),
                Some(ControlResponse::Lost) => Err(AcquisitionError::ControlLost),
                None => Err(AcquisitionError::ChannelClosed),
            }
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .unwrap_or(Err(AcquisitionError::Timeout(timeout)))
    }

    /// Device under control
    #[must_use]
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> LeaseState {
        self.state
    }

    /// Hand control back to the robot
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.state == LeaseState::Released {
            return;
        }
        self.state = LeaseState::Released;
        self.registry.unclaim(&self.device);

        match self.requests.try_send(ControlRequest::Release) {
            Ok(()) => tracing::debug!(device = %self.device, "Behavior control released"),
            Err(e) => tracing::warn!(
                device = %self.device,
                error = %e,
                "Failed to send behavior control release"
            ),
        }
    }
}

impl Drop for ControlLease {
    fn drop(&mut self) {
        if self.state != LeaseState::Released {
            tracing::warn!(device = %self.device, "Lease dropped without explicit release");
            self.release_once();
        }
    }
}
