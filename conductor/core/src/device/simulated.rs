//! Simulated Robot
//!
//! An in-process robot that records every RPC in a journal. Tests use it to
//! check lease and dispatch guarantees; the CLI uses it to run turns without
//! hardware.
//!
//! Latencies are real `tokio::time` sleeps, so tests running on a paused
//! clock stay deterministic. Failure knobs can be flipped at any time through
//! a shared handle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    BatteryState, ControlChannel, ControlPriority, ControlRequest, ControlResponse, DeviceConnector,
    DeviceEvent, RobotConnection,
};
use crate::messages::DeviceId;

/// One recorded RPC
#[derive(Clone, Debug, PartialEq)]
pub enum RobotCall {
    /// `play_animation`
    PlayAnimation {
        /// Animation name
        name: String,
        /// Loop count
        loops: u32,
    },
    /// `say_text`, recorded when the RPC starts
    SayText {
        /// Spoken text
        text: String,
    },
    /// `battery_state`
    BatteryState,
    /// Control request seen on the behavior control channel
    ControlRequest(ControlPriority),
    /// Control release seen on the behavior control channel
    ControlRelease,
    /// `subscribe_events`
    SubscribeEvents,
}

/// Tunable behavior of a simulated robot
#[derive(Clone, Debug)]
struct Behavior {
    rpc_latency: Duration,
    say_latency: Duration,
    grant_delay: Duration,
    offline: bool,
    fail_battery: bool,
    fail_animations: bool,
    hang_animations: bool,
    fail_say_after: Option<usize>,
    deny_control: bool,
    never_grant: bool,
    interrupt_after_says: Option<usize>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            rpc_latency: Duration::from_millis(50),
            say_latency: Duration::from_millis(200),
            grant_delay: Duration::from_millis(20),
            offline: false,
            fail_battery: false,
            fail_animations: false,
            hang_animations: false,
            fail_say_after: None,
            deny_control: false,
            never_grant: false,
            interrupt_after_says: None,
        }
    }
}

/// Scripted in-process robot
#[derive(Debug)]
pub struct SimulatedRobot {
    device: DeviceId,
    behavior: Mutex<Behavior>,
    journal: Arc<Mutex<Vec<RobotCall>>>,
    subscribers: Mutex<Vec<mpsc::Sender<DeviceEvent>>>,
    pending_events: Mutex<VecDeque<DeviceEvent>>,
    says_started: Mutex<usize>,
}

impl SimulatedRobot {
    /// Create a robot with the given serial number
    pub fn new(device: impl Into<DeviceId>) -> Self {
        Self {
            device: device.into(),
            behavior: Mutex::new(Behavior::default()),
            journal: Arc::new(Mutex::new(Vec::new())),
            subscribers: Mutex::new(Vec::new()),
            pending_events: Mutex::new(VecDeque::new()),
            says_started: Mutex::new(0),
        }
    }

    // ------------------------------------------------------------------------
    // Knobs
    // ------------------------------------------------------------------------

    /// Latency of animation and battery RPCs
    pub fn set_rpc_latency(&self, latency: Duration) {
        self.behavior.lock().rpc_latency = latency;
    }

    /// Latency of each `say_text` call
    pub fn set_say_latency(&self, latency: Duration) {
        self.behavior.lock().say_latency = latency;
    }

    /// Refuse connections
    pub fn set_offline(&self, offline: bool) {
        self.behavior.lock().offline = offline;
    }

    /// Fail battery queries
    pub fn fail_battery(&self, fail: bool) {
        self.behavior.lock().fail_battery = fail;
    }

    /// Fail animation RPCs
    pub fn fail_animations(&self, fail: bool) {
        self.behavior.lock().fail_animations = fail;
    }

    /// Never answer animation RPCs
    pub fn hang_animations(&self, hang: bool) {
        self.behavior.lock().hang_animations = hang;
    }

    /// Fail every `say_text` after the first `n`
    pub fn fail_say_after(&self, n: usize) {
        self.behavior.lock().fail_say_after = Some(n);
    }

    /// Answer control requests with `Lost`
    pub fn deny_control(&self, deny: bool) {
        self.behavior.lock().deny_control = deny;
    }

    /// Never answer control requests
    pub fn never_grant(&self, never: bool) {
        self.behavior.lock().never_grant = never;
    }

    /// Emit a touch event when the `n`-th `say_text` starts
    pub fn interrupt_after_says(&self, n: usize) {
        self.behavior.lock().interrupt_after_says = Some(n);
    }

    /// Deliver a sensor event to every subscriber
    ///
    /// With no subscriber listening, the event waits for the next one.
    pub fn inject_event(&self, event: DeviceEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        if subscribers.is_empty() {
            self.pending_events.lock().push_back(event);
            return;
        }
        for tx in subscribers.iter() {
            if let Err(e) = tx.try_send(event.clone()) {
                tracing::warn!(device = %self.device, error = %e, "Dropped simulated event");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------------

    /// Every RPC so far, in order
    #[must_use]
    pub fn journal(&self) -> Vec<RobotCall> {
        self.journal.lock().clone()
    }

    /// Texts passed to `say_text`, in order
    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter_map(|call| match call {
                RobotCall::SayText { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Animation names played, in order
    #[must_use]
    pub fn animations(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter_map(|call| match call {
                RobotCall::PlayAnimation { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of control requests seen
    #[must_use]
    pub fn control_requests(&self) -> usize {
        self.count(|call| matches!(call, RobotCall::ControlRequest(_)))
    }

    /// Number of control releases seen
    #[must_use]
    pub fn releases(&self) -> usize {
        self.count(|call| matches!(call, RobotCall::ControlRelease))
    }

    /// Count journal entries matching a predicate
    pub fn count(&self, predicate: impl Fn(&RobotCall) -> bool) -> usize {
        self.journal.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: RobotCall) {
        self.journal.lock().push(call);
    }

    fn behavior(&self) -> Behavior {
        self.behavior.lock().clone()
    }
}

#[async_trait]
impl RobotConnection for SimulatedRobot {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    async fn play_animation(&self, name: &str, loops: u32) -> anyhow::Result<()> {
        let behavior = self.behavior();
        self.record(RobotCall::PlayAnimation {
            name: name.to_string(),
            loops,
        });
        if behavior.hang_animations {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(behavior.rpc_latency).await;
        if behavior.fail_animations {
            anyhow::bail!("animation {name} failed on {}", self.device);
        }
        Ok(())
    }

    async fn say_text(
        &self,
        text: &str,
        _use_robot_voice: bool,
        duration_scalar: f32,
    ) -> anyhow::Result<()> {
        let behavior = self.behavior();
        self.record(RobotCall::SayText {
            text: text.to_string(),
        });
        let n = {
            let mut started = self.says_started.lock();
            *started += 1;
            *started
        };
        tracing::info!(device = %self.device, text, "Robot says");

        if behavior.interrupt_after_says == Some(n) {
            self.inject_event(DeviceEvent::Touched);
        }
        if behavior.fail_say_after.is_some_and(|limit| n > limit) {
            anyhow::bail!("say_text failed on {}", self.device);
        }

        tokio::time::sleep(behavior.say_latency.mul_f32(duration_scalar.max(0.0))).await;
        Ok(())
    }

    async fn battery_state(&self) -> anyhow::Result<BatteryState> {
        let behavior = self.behavior();
        self.record(RobotCall::BatteryState);
        tokio::time::sleep(behavior.rpc_latency).await;
        if behavior.fail_battery {
            anyhow::bail!("battery query failed on {}", self.device);
        }
        Ok(BatteryState {
            volts: 3.9,
            level: 2,
            is_charging: false,
        })
    }

    async fn behavior_control(&self) -> anyhow::Result<ControlChannel> {
        let (request_tx, mut request_rx) = mpsc::channel::<ControlRequest>(8);
        let (response_tx, response_rx) = mpsc::channel::<ControlResponse>(8);
        let journal = Arc::clone(&self.journal);
        let behavior = self.behavior();

        tokio::spawn(async move {
            while let Some(request) = request_rx.recv().await {
                match request {
                    ControlRequest::Acquire(priority) => {
                        journal.lock().push(RobotCall::ControlRequest(priority));
                        if behavior.never_grant {
                            continue;
                        }
                        let response = if behavior.deny_control {
                            ControlResponse::Lost
                        } else {
                            tokio::time::sleep(behavior.grant_delay).await;
                            ControlResponse::Granted
                        };
                        if response_tx.send(response).await.is_err() {
                            break;
                        }
                    }
                    ControlRequest::Release => {
                        journal.lock().push(RobotCall::ControlRelease);
                    }
                }
            }
        });

        Ok(ControlChannel {
            requests: request_tx,
            responses: response_rx,
        })
    }

    async fn subscribe_events(&self) -> anyhow::Result<mpsc::Receiver<DeviceEvent>> {
        self.record(RobotCall::SubscribeEvents);
        let (tx, rx) = mpsc::channel(16);
        let pending: Vec<DeviceEvent> = self.pending_events.lock().drain(..).collect();
        for event in pending {
            // Fresh channel with room for the backlog
            let _ = tx.try_send(event);
        }
        self.subscribers.lock().push(tx);
        Ok(rx)
    }
}

/// A set of simulated robots, created on first use
#[derive(Debug, Default)]
pub struct SimulatedFleet {
    robots: DashMap<DeviceId, Arc<SimulatedRobot>>,
}

impl SimulatedFleet {
    /// Create an empty fleet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The robot with this serial number, created if needed
    pub fn robot(&self, device: &DeviceId) -> Arc<SimulatedRobot> {
        self.robots
            .entry(device.clone())
            .or_insert_with(|| Arc::new(SimulatedRobot::new(device.clone())))
            .clone()
    }
}

#[async_trait]
impl DeviceConnector for SimulatedFleet {
    async fn connect(&self, device: &DeviceId) -> anyhow::Result<Arc<dyn RobotConnection>> {
        let robot = self.robot(device);
        if robot.behavior().offline {
            anyhow::bail!("robot {device} is not reachable");
        }
        Ok(robot)
    }
}
