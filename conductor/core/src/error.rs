//! Error taxonomy for conversational turns
//!
//! Collaborator traits return `anyhow::Result`; the Conductor folds those
//! into the typed errors below. Only failures that happen before the robot
//! grants control surface as [`TurnError`] to the caller. Everything after
//! that is absorbed into a [`crate::conductor::TurnOutcome`], because the
//! robot has to get its autonomy back no matter what went wrong.

use std::time::Duration;

use thiserror::Error;

use crate::messages::DeviceId;

/// Failure to obtain exclusive control of a robot's actuators
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Another lease is already open for this device
    #[error("behavior control for {device} is already held")]
    AlreadyHeld {
        /// Device that is busy
        device: DeviceId,
    },

    /// The control channel could not be opened
    #[error("failed to open behavior control channel: {0}")]
    Connection(String),

    /// The robot closed the control channel before granting control
    #[error("behavior control channel closed before control was granted")]
    ChannelClosed,

    /// The robot reported that control was lost while waiting for the grant
    #[error("behavior control lost while waiting for the grant")]
    ControlLost,

    /// No grant arrived in time
    #[error("no behavior control grant within {0:?}")]
    Timeout(Duration),
}

/// Errors that can end a turn
#[derive(Debug, Error)]
pub enum TurnError {
    /// The robot could not be reached or failed its liveness check
    #[error("device {device} unavailable: {reason}")]
    DeviceUnavailable {
        /// Device that failed
        device: DeviceId,
        /// What went wrong
        reason: String,
    },

    /// Behavior control could not be acquired
    #[error("behavior control acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// The language model request or stream failed
    #[error("provider error: {0}")]
    Provider(String),

    /// The language model answered with nothing speakable
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// An actuator RPC failed
    #[error("device RPC failed: {0}")]
    DeviceRpc(String),

    /// The performance was cut short by a touch or wake event
    #[error("turn interrupted")]
    Interrupted,

    /// The overall turn deadline passed
    #[error("turn exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// Speech-to-text failed or produced nothing
    #[error("transcription failed: {0}")]
    Transcription(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_converts() {
        let err: TurnError = AcquisitionError::ChannelClosed.into();
        assert!(matches!(err, TurnError::Acquisition(_)));
        assert!(err.to_string().contains("closed"));
    }
}
