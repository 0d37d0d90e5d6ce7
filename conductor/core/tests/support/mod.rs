//! Shared harness for turn-level integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use robot_conductor::backend::{Script, ScriptedBackend};
use robot_conductor::device::simulated::{RobotCall, SimulatedFleet, SimulatedRobot};
use robot_conductor::stt::{AudioStream, SpeechToText};
use robot_conductor::{Conductor, ConductorConfig, DeviceId, TurnUpdate};

/// Serial number used by single-robot tests
pub const DEVICE: &str = "00e20100";

/// A conductor over a scripted provider and a simulated fleet
pub struct Harness {
    pub conductor: Conductor<ScriptedBackend>,
    pub fleet: Arc<SimulatedFleet>,
}

impl Harness {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self::with_config(scripts, ConductorConfig::default())
    }

    pub fn with_config(scripts: Vec<Script>, config: ConductorConfig) -> Self {
        let fleet = Arc::new(SimulatedFleet::new());
        let conductor = Conductor::new(
            ScriptedBackend::with_scripts(scripts),
            fleet.clone(),
            config,
        );
        Self { conductor, fleet }
    }

    /// Attach an update channel
    pub fn observed(mut self) -> (Self, mpsc::Receiver<TurnUpdate>) {
        let (tx, rx) = mpsc::channel(256);
        self.conductor = self.conductor.with_updates(tx);
        (self, rx)
    }

    pub fn robot(&self) -> Arc<SimulatedRobot> {
        self.fleet.robot(&DeviceId::from(DEVICE))
    }

    pub fn device(&self) -> DeviceId {
        DeviceId::from(DEVICE)
    }
}

/// Let the simulated control task journal a release
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// Index of the first journal entry matching `pred`
pub fn position(journal: &[RobotCall], pred: impl Fn(&RobotCall) -> bool) -> Option<usize> {
    journal.iter().position(pred)
}

/// Count of `SayText` entries
pub fn says(journal: &[RobotCall]) -> usize {
    journal
        .iter()
        .filter(|c| matches!(c, RobotCall::SayText { .. }))
        .count()
}

/// Speech-to-text stub returning a fixed transcript
pub struct FixedTranscript(pub Option<String>);

#[async_trait]
impl SpeechToText for FixedTranscript {
    async fn transcribe(&self, _device: &DeviceId, mut audio: AudioStream) -> anyhow::Result<String> {
        while audio.recv().await.is_some() {}
        match &self.0 {
            Some(text) => Ok(text.clone()),
            None => anyhow::bail!("recognizer unavailable"),
        }
    }
}
