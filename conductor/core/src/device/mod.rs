//! Robot Device Interface
//!
//! The robot's actuator, speech, and sensor surface as seen by the Conductor.
//! Every call is an RPC that can fail at the network level at any point.
//!
//! # Design Philosophy
//!
//! The Conductor never talks to a transport directly. It asks a
//! [`DeviceConnector`] for a [`RobotConnection`] and drives the turn through
//! that trait, so the same orchestration runs against a real robot or the
//! [`simulated::SimulatedRobot`] used by tests and the CLI.
//!
//! Outbound RPCs go through an [`RpcGate`]. With serialization enabled, an
//! animation loop and fragment dispatch can never have commands in flight on
//! the same connection at once.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::messages::DeviceId;

// ============================================================================
// Behavior Control Protocol
// ============================================================================

/// How strongly a control request overrides the robot's own behaviors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlPriority {
    /// Take over from every autonomous behavior
    OverrideBehaviors,
}

/// Messages sent to the robot on the behavior control channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlRequest {
    /// Ask for control at a priority
    Acquire(ControlPriority),
    /// Hand control back
    Release,
}

/// Messages the robot sends back on the behavior control channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlResponse {
    /// Control granted
    Granted,
    /// Control taken away (or refused)
    Lost,
}

/// Bidirectional behavior control channel
#[derive(Debug)]
pub struct ControlChannel {
    /// Outbound requests
    pub requests: mpsc::Sender<ControlRequest>,
    /// Inbound responses
    pub responses: mpsc::Receiver<ControlResponse>,
}

// ============================================================================
// Sensors
// ============================================================================

/// Events from the robot's sensors
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// Someone touched the robot's back sensor
    Touched,
    /// The wake word was heard
    WakeWord,
    /// The robot was lifted
    PickedUp,
    /// Anything else, by name
    Other(String),
}

impl DeviceEvent {
    /// Whether this event should cut a performance short
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Touched | Self::WakeWord)
    }
}

/// Battery report used as a liveness check
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Battery voltage
    pub volts: f32,
    /// Coarse level (0 = unknown, 1 = low, 2 = nominal, 3 = full)
    pub level: u8,
    /// Whether the robot is charging
    pub is_charging: bool,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// One connection to one robot
#[async_trait]
pub trait RobotConnection: Send + Sync {
    /// Robot this connection talks to
    fn device(&self) -> &DeviceId;

    /// Play a named animation `loops` times
    async fn play_animation(&self, name: &str, loops: u32) -> anyhow::Result<()>;

    /// Speak text; returns once the robot has finished saying it
    async fn say_text(
        &self,
        text: &str,
        use_robot_voice: bool,
        duration_scalar: f32,
    ) -> anyhow::Result<()>;

    /// Query the battery
    async fn battery_state(&self) -> anyhow::Result<BatteryState>;

    /// Open the behavior control channel
    async fn behavior_control(&self) -> anyhow::Result<ControlChannel>;

    /// Subscribe to sensor events
    async fn subscribe_events(&self) -> anyhow::Result<mpsc::Receiver<DeviceEvent>>;
}

/// Opens connections to robots by serial number
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Connect to a robot
    async fn connect(&self, device: &DeviceId) -> anyhow::Result<Arc<dyn RobotConnection>>;
}

// ============================================================================
// RPC Gate
// ============================================================================

/// Serializes outbound actuator RPCs on one connection
///
/// Cloning shares the same gate.
#[derive(Clone)]
pub struct RpcGate {
    connection: Arc<dyn RobotConnection>,
    lock: Option<Arc<Mutex<()>>>,
}

impl RpcGate {
    /// Wrap a connection; `serialize` enables mutual exclusion of RPCs
    #[must_use]
    pub fn new(connection: Arc<dyn RobotConnection>, serialize: bool) -> Self {
        Self {
            connection,
            lock: serialize.then(|| Arc::new(Mutex::new(()))),
        }
    }

    /// The underlying connection
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn RobotConnection> {
        &self.connection
    }

    /// Play an animation through the gate
    pub async fn play_animation(&self, name: &str, loops: u32) -> anyhow::Result<()> {
        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        self.connection.play_animation(name, loops).await
    }

    /// Speak text through the gate
    pub async fn say_text(
        &self,
        text: &str,
        use_robot_voice: bool,
        duration_scalar: f32,
    ) -> anyhow::Result<()> {
        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        self.connection
            .say_text(text, use_robot_voice, duration_scalar)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::{RobotCall, SimulatedRobot};
    use std::time::Duration;

    #[test]
    fn test_interrupt_events() {
        assert!(DeviceEvent::Touched.is_interrupt());
        assert!(DeviceEvent::WakeWord.is_interrupt());
        assert!(!DeviceEvent::PickedUp.is_interrupt());
        assert!(!DeviceEvent::Other("cliff".into()).is_interrupt());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_serializes_rpcs() {
        let robot = Arc::new(SimulatedRobot::new("gate"));
        robot.set_rpc_latency(Duration::from_millis(100));
        let gate = RpcGate::new(robot.clone(), true);

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            gate.play_animation("anim_tts_loop_02", 1),
            gate.say_text("Hello.", true, 1.0)
        );
        a.unwrap();
        b.unwrap();

        // Second call waited for the first
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(robot.journal().len(), 2);
        assert!(matches!(robot.journal()[0], RobotCall::PlayAnimation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ungated_rpcs_overlap() {
        let robot = Arc::new(SimulatedRobot::new("free"));
        robot.set_rpc_latency(Duration::from_millis(100));
        let gate = RpcGate::new(robot.clone(), false);

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            gate.play_animation("anim_tts_loop_02", 1),
            gate.play_animation("anim_getin_tts_01", 1)
        );
        a.unwrap();
        b.unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
