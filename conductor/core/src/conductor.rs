//! Conductor - The Turn Orchestrator
//!
//! The Conductor runs one conversational turn at a time per robot. It:
//! - Checks the robot is alive and takes exclusive control of it
//! - Asks the language model for a reply
//! - Speaks the reply fragment by fragment, with animation around it
//! - Stops immediately when someone touches the robot or says the wake word
//! - Always hands control back, whatever happened
//!
//! # State Machine
//!
//! ```text
//! Idle ─▶ LeaseRequested ─▶ LeaseGranted ─▶ Responding ─▶ Speaking(0..n) ─▶ Releasing ─▶ Idle
//!                                              │               │                ▲
//!                                              │               └─▶ Interrupted ─┤
//!                                              └─ no reply ─▶ fallback apology ─┘
//! ```
//!
//! # Design Philosophy
//!
//! Everything after the grant is absorbed into a [`TurnOutcome`]: the caller
//! sees `Err` only when the robot was unreachable or refused control. Every
//! other failure still ends with the lease released exactly once, background
//! loops acknowledged as stopped (or aborted at the deadline) before that
//! release, and conversation memory untouched unless the turn completed.
//!
//! Every robot RPC a turn waits on races the turn deadline. The fallback
//! apology and [`Conductor::say`] get a deadline of their own, one
//! `turn_timeout` long.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::animation::AnimationLoop;
use crate::backend::LlmBackend;
use crate::device::{BatteryState, DeviceConnector, RobotConnection, RpcGate};
use crate::error::TurnError;
use crate::interrupt::InterruptWatcher;
use crate::lease::{ControlLease, LeaseRegistry};
use crate::memory::{ConversationHistory, ConversationMemory, DEFAULT_MAX_MESSAGES};
use crate::messages::{ChatMessage, DeviceId, TurnId, TurnState, TurnUpdate};
use crate::persona::{AnimationSet, Persona};
use crate::streaming::{FragmentStream, ResponseConsumer, ResponseSettings};
use crate::stt::{normalize_transcript, AudioStream, SpeechToText};
use crate::text::{sanitize, segment};

/// Conductor configuration
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Provider request parameters
    pub response: ResponseSettings,
    /// Whether turns read and extend conversation memory
    pub save_chat: bool,
    /// Messages remembered per robot
    pub max_history_messages: usize,
    /// Deadline for a whole turn
    pub turn_timeout: Duration,
    /// How long to wait for the robot to grant control
    pub lease_timeout: Duration,
    /// Pause between spoken fragments
    pub fragment_pause: Duration,
    /// Pause after the last fragment before control is released
    pub settle_pause: Duration,
    /// Pause between plays of the thinking animation
    pub idle_animation_interval: Duration,
    /// Loop an animation under the voice while speaking
    pub speaking_animation: bool,
    /// Never let two actuator RPCs overlap on one connection
    pub serialize_device_rpcs: bool,
    /// Spoken when the provider gives nothing usable
    pub fallback_text: String,
    /// Use the robot's own voice instead of the plain synthesizer
    pub use_robot_voice: bool,
    /// Speech speed multiplier
    pub duration_scalar: f32,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            response: ResponseSettings::default(),
            save_chat: true,
            max_history_messages: DEFAULT_MAX_MESSAGES,
            turn_timeout: Duration::from_secs(120),
            lease_timeout: Duration::from_secs(10),
            fragment_pause: Duration::from_millis(200),
            settle_pause: Duration::from_millis(100),
            idle_animation_interval: Duration::from_millis(333),
            speaking_animation: true,
            serialize_device_rpcs: true,
            fallback_text: "There was an error getting a response.".to_string(),
            use_robot_voice: true,
            duration_scalar: 1.0,
        }
    }
}

// ============================================================================
// Turn Types
// ============================================================================

/// Input to one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRequest {
    /// Robot to perform on
    pub device: DeviceId,
    /// What the user said
    pub text: String,
    /// Behavior profile
    pub persona: Persona,
}

impl TurnRequest {
    /// A default-persona turn
    pub fn new(device: impl Into<DeviceId>, text: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            text: text.into(),
            persona: Persona::Default,
        }
    }

    /// Switch the persona
    #[must_use]
    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }
}

/// How a turn ended once the robot had granted control
#[derive(Debug)]
pub enum TurnOutcome {
    /// Every fragment was spoken
    Completed,
    /// A touch or wake event cut the performance short
    Interrupted,
    /// The provider gave nothing usable; the fallback apology was spoken
    NoResponse {
        /// Why nothing usable arrived
        cause: TurnError,
    },
    /// The performance stopped partway
    Aborted {
        /// What stopped it
        cause: TurnError,
    },
}

impl TurnOutcome {
    /// Whether every fragment was spoken
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The error behind an unfinished turn, `None` if it completed
    #[must_use]
    pub fn into_error(self) -> Option<TurnError> {
        match self {
            Self::Completed => None,
            Self::Interrupted => Some(TurnError::Interrupted),
            Self::NoResponse { cause } | Self::Aborted { cause } => Some(cause),
        }
    }
}

impl std::fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::NoResponse { cause } => write!(f, "no response ({cause})"),
            Self::Aborted { cause } => write!(f, "aborted ({cause})"),
        }
    }
}

/// Summary of a finished turn
#[derive(Debug)]
pub struct TurnReport {
    /// Turn identifier used in logs and updates
    pub turn_id: TurnId,
    /// Robot the turn ran on
    pub device: DeviceId,
    /// How it ended
    pub outcome: TurnOutcome,
    /// Fragments handed to the synthesizer, in order
    pub spoken: Vec<String>,
    /// Battery reading taken at turn start
    pub battery: BatteryState,
    /// Wall time of the turn
    pub elapsed: Duration,
}

// ============================================================================
// Internals
// ============================================================================

/// Per-turn state shared by the dispatch helpers
struct TurnContext {
    turn_id: TurnId,
    device: DeviceId,
    gate: RpcGate,
    animations: AnimationSet,
    interrupt: CancellationToken,
}

/// Where fragments come from
enum Fragments<'a> {
    Live(&'a mut FragmentStream),
    Fixed(std::vec::IntoIter<String>),
}

impl Fragments<'_> {
    async fn next(&mut self) -> Option<String> {
        match self {
            Self::Live(stream) => stream.next().await,
            Self::Fixed(fragments) => fragments.next(),
        }
    }

    fn failure(&mut self) -> Option<TurnError> {
        match self {
            Self::Live(stream) => stream.take_failure(),
            Self::Fixed(_) => None,
        }
    }
}

/// How fragment dispatch ended
enum SpeechEnd {
    Exhausted,
    Interrupted,
    Failed(TurnError),
}

struct Speech {
    dispatched: Vec<String>,
    end: SpeechEnd,
}

impl Speech {
    fn was_interrupted(&self) -> bool {
        matches!(self.end, SpeechEnd::Interrupted)
    }
}

// ============================================================================
// Conductor
// ============================================================================

/// The Conductor - turn orchestration core
pub struct Conductor<B: LlmBackend> {
    /// Configuration
    config: ConductorConfig,
    /// LLM backend
    backend: Arc<B>,
    /// Request/response driver over the backend
    consumer: ResponseConsumer<B>,
    /// Opens robot connections
    connector: Arc<dyn DeviceConnector>,
    /// Per-robot conversation history
    memory: Arc<ConversationMemory>,
    /// Open leases, at most one per robot
    leases: Arc<LeaseRegistry>,
    /// Optional observer of turn progress
    updates: Option<mpsc::Sender<TurnUpdate>>,
}

impl<B: LlmBackend + 'static> Conductor<B> {
    /// Create a new Conductor with the given backend and robot connector
    pub fn new(backend: B, connector: Arc<dyn DeviceConnector>, config: ConductorConfig) -> Self {
        let backend = Arc::new(backend);
        let consumer = ResponseConsumer::new(Arc::clone(&backend), config.response.clone());
        let memory = Arc::new(ConversationMemory::new(config.max_history_messages));

        Self {
            config,
            backend,
            consumer,
            connector,
            memory,
            leases: Arc::new(LeaseRegistry::new()),
            updates: None,
        }
    }

    /// Publish turn updates on a channel
    #[must_use]
    pub fn with_updates(mut self, tx: mpsc::Sender<TurnUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    /// Get configuration
    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    /// Get the backend
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Get conversation memory
    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    /// Get the lease registry
    pub fn leases(&self) -> &Arc<LeaseRegistry> {
        &self.leases
    }

    /// Transcribe an utterance and run a turn with it
    pub async fn run_utterance(
        &self,
        stt: &dyn SpeechToText,
        device: DeviceId,
        audio: AudioStream,
        persona: Persona,
    ) -> Result<TurnReport, TurnError> {
        let transcript = stt
            .transcribe(&device, audio)
            .await
            .map_err(|e| TurnError::Transcription(e.to_string()))?;
        let Some(text) = normalize_transcript(&transcript) else {
            return Err(TurnError::Transcription("nothing was said".to_string()));
        };
        tracing::info!(device = %device, text = %text, "Transcribed utterance");

        self.run_turn(TurnRequest {
            device,
            text,
            persona,
        })
        .await
    }

    /// Run one conversational turn
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnReport, TurnError> {
        let started = Instant::now();
        let deadline = started + self.config.turn_timeout;
        let turn_id = TurnId::new();
        let TurnRequest {
            device,
            text,
            persona,
        } = request;
        tracing::info!(turn = %turn_id, device = %device, persona = %persona, "Turn started");

        let (connection, battery) = self.open_device(&device, deadline).await?;
        let (ctx, lease) = self.take_control(turn_id, connection, persona).await?;

        let thinking = ctx.animations.thinking.map(|name| {
            AnimationLoop::spawn(ctx.gate.clone(), name, self.config.idle_animation_interval)
        });

        self.emit_state(&ctx.turn_id, TurnState::Responding);
        let history = if self.config.save_chat {
            self.memory.get(&device)
        } else {
            ConversationHistory::new()
        };
        let mut stream = self.consumer.request(&history, persona, &text);

        let waited = tokio::select! {
            biased;
            () = tokio::time::sleep_until(deadline) => Err(TurnError::Timeout(self.config.turn_timeout)),
            fragment = stream.next() => Ok(fragment),
        };
        let first = match waited {
            Ok(Some(fragment)) => Ok(fragment),
            Ok(None) => Err(stream.take_failure().unwrap_or(TurnError::EmptyResponse)),
            Err(e) => Err(e),
        };

        // The apology gets a fresh deadline of its own
        let speech_deadline = match &first {
            Ok(_) => deadline,
            Err(_) => Instant::now() + self.config.turn_timeout,
        };
        if let Some(thinking) = thinking {
            thinking.stop(speech_deadline).await;
        }

        let (outcome, spoken, interrupted) = match first {
            Ok(first) => {
                let mut fragments = Fragments::Live(&mut stream);
                let speech = self
                    .speak(&ctx, first, &mut fragments, speech_deadline)
                    .await;
                let outcome = match speech.end {
                    SpeechEnd::Exhausted => TurnOutcome::Completed,
                    SpeechEnd::Interrupted => TurnOutcome::Interrupted,
                    SpeechEnd::Failed(cause) => {
                        tracing::warn!(turn = %ctx.turn_id, error = %cause, "Performance aborted");
                        TurnOutcome::Aborted { cause }
                    }
                };
                let interrupted = matches!(outcome, TurnOutcome::Interrupted);
                (outcome, speech.dispatched, interrupted)
            }
            Err(cause) => {
                tracing::warn!(turn = %ctx.turn_id, error = %cause, "No usable response, speaking fallback");
                let speech = self
                    .speak_text(&ctx, &self.config.fallback_text, speech_deadline)
                    .await;
                let interrupted = speech.was_interrupted();
                if let SpeechEnd::Failed(e) = &speech.end {
                    tracing::warn!(turn = %ctx.turn_id, error = %e, "Fallback apology cut short");
                }
                (TurnOutcome::NoResponse { cause }, speech.dispatched, interrupted)
            }
        };
        drop(stream);

        self.hand_back(&ctx, lease, interrupted).await;

        if outcome.is_completed() && self.config.save_chat {
            self.memory.append(
                &device,
                ChatMessage::user(text),
                ChatMessage::assistant(spoken.join(" ")),
            );
        }

        let elapsed = started.elapsed();
        tracing::info!(
            turn = %ctx.turn_id,
            device = %device,
            outcome = %outcome,
            fragments = spoken.len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Turn finished"
        );

        Ok(TurnReport {
            turn_id: ctx.turn_id,
            device,
            outcome,
            spoken,
            battery,
            elapsed,
        })
    }

    /// Speak fixed text on a robot under its own lease
    ///
    /// Nothing is requested from the provider and memory is not touched.
    pub async fn say(&self, device: DeviceId, text: &str) -> Result<TurnReport, TurnError> {
        let started = Instant::now();
        let deadline = started + self.config.turn_timeout;
        let turn_id = TurnId::new();
        tracing::info!(turn = %turn_id, device = %device, "Say started");

        let (connection, battery) = self.open_device(&device, deadline).await?;
        let (ctx, lease) = self
            .take_control(turn_id, connection, Persona::Default)
            .await?;

        let speech = self.speak_text(&ctx, text, deadline).await;
        self.hand_back(&ctx, lease, speech.was_interrupted()).await;
        let outcome = match speech.end {
            SpeechEnd::Exhausted => TurnOutcome::Completed,
            SpeechEnd::Interrupted => TurnOutcome::Interrupted,
            SpeechEnd::Failed(cause) => TurnOutcome::Aborted { cause },
        };

        Ok(TurnReport {
            turn_id: ctx.turn_id,
            device,
            outcome,
            spoken: speech.dispatched,
            battery,
            elapsed: started.elapsed(),
        })
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    /// Connect and run the battery liveness check before `deadline`
    async fn open_device(
        &self,
        device: &DeviceId,
        deadline: Instant,
    ) -> Result<(Arc<dyn RobotConnection>, BatteryState), TurnError> {
        let unavailable = |reason: String| TurnError::DeviceUnavailable {
            device: device.clone(),
            reason,
        };

        let opened = async {
            let connection = self
                .connector
                .connect(device)
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            let battery = connection
                .battery_state()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            Ok::<_, TurnError>((connection, battery))
        };
        let (connection, battery) = tokio::time::timeout_at(deadline, opened)
            .await
            .unwrap_or_else(|_| {
                Err(unavailable(format!(
                    "no answer within {:?}",
                    self.config.turn_timeout
                )))
            })?;
        tracing::info!(
            device = %device,
            volts = battery.volts,
            level = battery.level,
            charging = battery.is_charging,
            "Battery checked"
        );
        Ok((connection, battery))
    }

    /// Acquire the lease and set up the turn context
    async fn take_control(
        &self,
        turn_id: TurnId,
        connection: Arc<dyn RobotConnection>,
        persona: Persona,
    ) -> Result<(TurnContext, ControlLease), TurnError> {
        self.emit_state(&turn_id, TurnState::LeaseRequested);
        let lease = match ControlLease::acquire(
            connection.as_ref(),
            &self.leases,
            self.config.lease_timeout,
        )
        .await
        {
            Ok(lease) => lease,
            Err(e) => {
                self.emit_state(&turn_id, TurnState::Idle);
                return Err(e.into());
            }
        };
        self.emit_state(&turn_id, TurnState::LeaseGranted);

        let ctx = TurnContext {
            turn_id,
            device: connection.device().clone(),
            gate: RpcGate::new(connection, self.config.serialize_device_rpcs),
            animations: persona.animations(),
            interrupt: CancellationToken::new(),
        };
        Ok((ctx, lease))
    }

    /// Release the lease once every background loop has stopped
    async fn hand_back(&self, ctx: &TurnContext, lease: ControlLease, interrupted: bool) {
        if interrupted {
            self.emit_state(&ctx.turn_id, TurnState::Interrupted);
        } else {
            tokio::time::sleep(self.config.settle_pause).await;
        }
        self.emit_state(&ctx.turn_id, TurnState::Releasing);
        lease.release();
        self.emit_state(&ctx.turn_id, TurnState::Idle);
    }

    /// Speak fixed text through the regular dispatch path
    async fn speak_text(&self, ctx: &TurnContext, text: &str, deadline: Instant) -> Speech {
        let mut fragments = segment(&sanitize(text)).into_iter();
        let Some(first) = fragments.next() else {
            return Speech {
                dispatched: Vec::new(),
                end: SpeechEnd::Exhausted,
            };
        };
        self.speak(ctx, first, &mut Fragments::Fixed(fragments), deadline)
            .await
    }

    /// Watch for interrupts, play the get-in, and dispatch every fragment
    async fn speak(
        &self,
        ctx: &TurnContext,
        first: String,
        fragments: &mut Fragments<'_>,
        deadline: Instant,
    ) -> Speech {
        let watcher = InterruptWatcher::start(
            ctx.gate.connection().as_ref(),
            ctx.interrupt.clone(),
            deadline,
        )
        .await;
        let mut dispatched = Vec::new();

        let end = match self.play_get_in(ctx, deadline).await {
            Some(end) => end,
            None => {
                let speaking = self.config.speaking_animation.then(|| {
                    AnimationLoop::spawn(ctx.gate.clone(), ctx.animations.speaking, Duration::ZERO)
                });
                let end = self
                    .dispatch(ctx, first, fragments, deadline, &mut dispatched)
                    .await;
                if let Some(speaking) = speaking {
                    speaking.stop(deadline).await;
                }
                end
            }
        };

        let observed = watcher.stop().await;
        tracing::debug!(turn = %ctx.turn_id, interrupted = observed, "Interrupt watcher stopped");
        Speech { dispatched, end }
    }

    /// Play the get-in animation once
    ///
    /// Returns how speech ended if an interrupt or the deadline came first.
    async fn play_get_in(&self, ctx: &TurnContext, deadline: Instant) -> Option<SpeechEnd> {
        tokio::select! {
            biased;
            () = ctx.interrupt.cancelled() => Some(SpeechEnd::Interrupted),
            () = tokio::time::sleep_until(deadline) => Some(self.timed_out()),
            result = ctx.gate.play_animation(ctx.animations.get_in, 1) => {
                if let Err(e) = result {
                    tracing::warn!(device = %ctx.device, error = %e, "Get-in animation failed");
                }
                None
            }
        }
    }

    fn timed_out(&self) -> SpeechEnd {
        SpeechEnd::Failed(TurnError::Timeout(self.config.turn_timeout))
    }

    /// Dispatch fragments strictly in order, one RPC at a time
    async fn dispatch(
        &self,
        ctx: &TurnContext,
        first: String,
        fragments: &mut Fragments<'_>,
        deadline: Instant,
        dispatched: &mut Vec<String>,
    ) -> SpeechEnd {
        let mut next = Some(first);
        let mut index = 0usize;

        while let Some(fragment) = next.take() {
            if index > 0 {
                tokio::select! {
                    biased;
                    () = ctx.interrupt.cancelled() => return SpeechEnd::Interrupted,
                    () = tokio::time::sleep_until(deadline) => return self.timed_out(),
                    () = tokio::time::sleep(self.config.fragment_pause) => {}
                }
            }

            self.emit_state(&ctx.turn_id, TurnState::Speaking(index));
            dispatched.push(fragment.clone());
            self.emit(TurnUpdate::FragmentSpoken {
                turn_id: ctx.turn_id.clone(),
                index,
                text: fragment.clone(),
            });

            let result = tokio::select! {
                biased;
                () = ctx.interrupt.cancelled() => return SpeechEnd::Interrupted,
                () = tokio::time::sleep_until(deadline) => return self.timed_out(),
                result = ctx.gate.say_text(
                    &fragment,
                    self.config.use_robot_voice,
                    self.config.duration_scalar,
                ) => result,
            };
            if let Err(e) = result {
                tracing::warn!(device = %ctx.device, fragment = index, error = %e, "say_text failed");
                return SpeechEnd::Failed(TurnError::DeviceRpc(e.to_string()));
            }
            index += 1;

            next = tokio::select! {
                biased;
                () = ctx.interrupt.cancelled() => return SpeechEnd::Interrupted,
                () = tokio::time::sleep_until(deadline) => return self.timed_out(),
                fragment = fragments.next() => fragment,
            };
        }

        match fragments.failure() {
            Some(cause) => SpeechEnd::Failed(cause),
            None => SpeechEnd::Exhausted,
        }
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    fn emit(&self, update: TurnUpdate) {
        if let Some(tx) = &self.updates {
            if tx.try_send(update).is_err() {
                tracing::trace!("Turn update dropped, observer lagging or gone");
            }
        }
    }

    fn emit_state(&self, turn_id: &TurnId, state: TurnState) {
        tracing::debug!(turn = %turn_id, state = %state, "Turn state");
        self.emit(TurnUpdate::State {
            turn_id: turn_id.clone(),
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Script, ScriptedBackend, StreamTail};
    use crate::device::simulated::{RobotCall, SimulatedFleet};
    use crate::device::ControlPriority;
    use crate::error::AcquisitionError;
    use pretty_assertions::assert_eq;

    const DEVICE: &str = "00e20100";

    fn conductor(
        scripts: Vec<Script>,
        config: ConductorConfig,
    ) -> (Conductor<ScriptedBackend>, Arc<SimulatedFleet>) {
        let fleet = Arc::new(SimulatedFleet::new());
        let conductor = Conductor::new(
            ScriptedBackend::with_scripts(scripts),
            fleet.clone(),
            config,
        );
        (conductor, fleet)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[test]
    fn test_outcome_into_error() {
        assert!(TurnOutcome::Completed.into_error().is_none());
        assert!(matches!(
            TurnOutcome::Interrupted.into_error(),
            Some(TurnError::Interrupted)
        ));
        assert!(matches!(
            TurnOutcome::NoResponse {
                cause: TurnError::EmptyResponse
            }
            .into_error(),
            Some(TurnError::EmptyResponse)
        ));
        let aborted = TurnOutcome::Aborted {
            cause: TurnError::DeviceRpc("say_text failed".into()),
        };
        assert_eq!(
            aborted.into_error().map(|e| e.to_string()),
            Some("device RPC failed: say_text failed".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_turn_speaks_in_order_and_remembers() {
        let (conductor, fleet) = conductor(
            vec![Script::stream(
                ["Hello there. ", "How are you? ", "Fine..."],
                Duration::from_millis(30),
            )],
            ConductorConfig::default(),
        );

        let report = conductor
            .run_turn(TurnRequest::new(DEVICE, "hi robot"))
            .await
            .unwrap();
        settle().await;

        assert!(report.outcome.is_completed());
        let robot = fleet.robot(&DeviceId::from(DEVICE));
        assert_eq!(robot.spoken(), vec!["Hello there.", "How are you?", "Fine..."]);
        assert_eq!(robot.control_requests(), 1);
        assert_eq!(robot.releases(), 1);

        let history = conductor.memory().get(&DeviceId::from(DEVICE));
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].content, "hi robot");
        assert_eq!(
            history.messages()[1].content,
            "Hello there. How are you? Fine..."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_precedes_every_actuator_rpc() {
        let (conductor, fleet) = conductor(
            vec![Script::reply("One. Two.")],
            ConductorConfig::default(),
        );
        conductor
            .run_turn(TurnRequest::new(DEVICE, "q").with_persona(Persona::Knowledge))
            .await
            .unwrap();
        settle().await;

        let journal = fleet.robot(&DeviceId::from(DEVICE)).journal();
        let grant = journal
            .iter()
            .position(|c| *c == RobotCall::ControlRequest(ControlPriority::OverrideBehaviors))
            .unwrap();
        let first_actuator = journal
            .iter()
            .position(|c| matches!(c, RobotCall::PlayAnimation { .. } | RobotCall::SayText { .. }))
            .unwrap();
        assert!(grant < first_actuator);
        assert_eq!(journal.last(), Some(&RobotCall::ControlRelease));
    }

    #[tokio::test(start_paused = true)]
    async fn test_knowledge_persona_thinks_then_answers() {
        let (conductor, fleet) = conductor(
            vec![Script::Reply {
                text: "Paris is the capital.".to_string(),
                delay: Duration::from_secs(2),
            }],
            ConductorConfig::default(),
        );
        conductor
            .run_turn(TurnRequest::new(DEVICE, "capital of france").with_persona(Persona::Knowledge))
            .await
            .unwrap();

        let animations = fleet.robot(&DeviceId::from(DEVICE)).animations();
        let thinking = animations
            .iter()
            .filter(|a| *a == "anim_knowledgegraph_searching_01")
            .count();
        assert!(thinking >= 2);
        let get_in = animations
            .iter()
            .position(|a| a == "anim_knowledgegraph_searching_getout_01")
            .unwrap();
        // No thinking animation after the get-in
        assert!(animations[get_in..]
            .iter()
            .all(|a| a != "anim_knowledgegraph_searching_01"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaking_animation_can_be_disabled() {
        let (conductor, fleet) = conductor(
            vec![Script::reply("Just this.")],
            ConductorConfig {
                speaking_animation: false,
                ..Default::default()
            },
        );
        conductor
            .run_turn(TurnRequest::new(DEVICE, "q"))
            .await
            .unwrap();

        assert_eq!(
            fleet.robot(&DeviceId::from(DEVICE)).animations(),
            vec!["anim_getin_tts_01"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_speaks_apology() {
        let (conductor, fleet) = conductor(
            vec![Script::Fail("503 Service Unavailable".into())],
            ConductorConfig::default(),
        );
        let report = conductor
            .run_turn(TurnRequest::new(DEVICE, "q"))
            .await
            .unwrap();
        settle().await;

        assert!(matches!(
            report.outcome,
            TurnOutcome::NoResponse {
                cause: TurnError::Provider(_)
            }
        ));
        let robot = fleet.robot(&DeviceId::from(DEVICE));
        assert_eq!(robot.spoken(), vec!["There was an error getting a response."]);
        assert_eq!(robot.releases(), 1);
        assert!(conductor.memory().get(&DeviceId::from(DEVICE)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_before_content_is_no_response() {
        let (conductor, fleet) = conductor(
            vec![Script::Stream {
                deltas: vec![],
                delay: Duration::ZERO,
                tail: StreamTail::Hang,
            }],
            ConductorConfig {
                turn_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let report = conductor
            .run_turn(TurnRequest::new(DEVICE, "q"))
            .await
            .unwrap();
        settle().await;

        assert!(matches!(
            report.outcome,
            TurnOutcome::NoResponse {
                cause: TurnError::Timeout(_)
            }
        ));
        let robot = fleet.robot(&DeviceId::from(DEVICE));
        assert_eq!(robot.spoken().len(), 1);
        assert_eq!(robot.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_say_rpc_failure_aborts_and_releases() {
        let (conductor, fleet) = conductor(
            vec![Script::reply("One. Two. Three.")],
            ConductorConfig::default(),
        );
        let device = DeviceId::from(DEVICE);
        fleet.robot(&device).fail_say_after(1);

        let report = conductor
            .run_turn(TurnRequest::new(DEVICE, "q"))
            .await
            .unwrap();
        settle().await;

        assert!(matches!(
            report.outcome,
            TurnOutcome::Aborted {
                cause: TurnError::DeviceRpc(_)
            }
        ));
        let robot = fleet.robot(&device);
        assert_eq!(robot.spoken(), vec!["One.", "Two."]);
        assert_eq!(robot.releases(), 1);
        assert!(conductor.memory().get(&device).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_failure_is_device_unavailable() {
        let (conductor, fleet) = conductor(vec![], ConductorConfig::default());
        let device = DeviceId::from(DEVICE);
        fleet.robot(&device).fail_battery(true);

        let result = conductor.run_turn(TurnRequest::new(DEVICE, "q")).await;
        assert!(matches!(result, Err(TurnError::DeviceUnavailable { .. })));
        assert_eq!(fleet.robot(&device).control_requests(), 0);
        assert!(conductor.backend().requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_control_skips_speech() {
        let (conductor, fleet) = conductor(vec![], ConductorConfig::default());
        let device = DeviceId::from(DEVICE);
        fleet.robot(&device).deny_control(true);

        let result = conductor.run_turn(TurnRequest::new(DEVICE, "q")).await;
        assert!(matches!(
            result,
            Err(TurnError::Acquisition(AcquisitionError::ControlLost))
        ));
        assert!(fleet.robot(&device).spoken().is_empty());
        assert!(conductor.backend().requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_say_uses_own_lease() {
        let (conductor, fleet) = conductor(vec![], ConductorConfig::default());
        let report = conductor
            .say(DeviceId::from(DEVICE), "Good morning. Time to charge.")
            .await
            .unwrap();
        settle().await;

        assert!(report.outcome.is_completed());
        let robot = fleet.robot(&DeviceId::from(DEVICE));
        assert_eq!(robot.spoken(), vec!["Good morning.", "Time to charge."]);
        assert_eq!(robot.releases(), 1);
        assert!(conductor.backend().requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_follow_state_machine() {
        let (tx, mut rx) = mpsc::channel(64);
        let (conductor, _fleet) = conductor(
            vec![Script::reply("One. Two.")],
            ConductorConfig::default(),
        );
        let conductor = conductor.with_updates(tx);
        conductor
            .run_turn(TurnRequest::new(DEVICE, "q"))
            .await
            .unwrap();

        let mut states = Vec::new();
        let mut spoken = Vec::new();
        while let Ok(update) = rx.try_recv() {
            match update {
                TurnUpdate::State { state, .. } => states.push(state),
                TurnUpdate::FragmentSpoken { text, .. } => spoken.push(text),
            }
        }
        assert_eq!(
            states,
            vec![
                TurnState::LeaseRequested,
                TurnState::LeaseGranted,
                TurnState::Responding,
                TurnState::Speaking(0),
                TurnState::Speaking(1),
                TurnState::Releasing,
                TurnState::Idle,
            ]
        );
        assert_eq!(spoken, vec!["One.", "Two."]);
    }
}
