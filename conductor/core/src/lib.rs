//! Robot Conductor Core - Conversational Turn Orchestration for Desk Robots
//!
//! This crate runs the conversation loop of a small desk robot: it takes
//! what a user said, asks a language model for a reply, and performs that
//! reply on the robot as speech plus animation. It owns no transport of its
//! own; robots and providers are reached through collaborator traits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    CLI / Voice front end                         │
//! │            TurnRequest (down)      TurnUpdate (up)               │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼──────────────────────────────────────┐
//! │                    CONDUCTOR CORE                                │
//! │  ┌────────────────────────┴────────────────────────────────────┐ │
//! │  │                      Conductor                              │ │
//! │  │  ┌──────────┐  ┌──────────┐  ┌───────────┐  ┌────────────┐  │ │
//! │  │  │  Lease   │  │Interrupt │  │ Response  │  │Conversation│  │ │
//! │  │  │          │  │ Watcher  │  │ Consumer  │  │  Memory    │  │ │
//! │  │  └────┬─────┘  └────┬─────┘  └─────┬─────┘  └────────────┘  │ │
//! │  └───────┼─────────────┼──────────────┼────────────────────────┘ │
//! └──────────┼─────────────┼──────────────┼──────────────────────────┘
//!            │             │              │
//!     RobotConnection (actuators, events) LlmBackend (chat completions)
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: runs one turn at a time per robot
//! - [`TurnRequest`] / [`TurnReport`]: input and summary of a turn
//! - [`ConversationMemory`]: bounded per-robot chat history
//! - [`ControlLease`]: exclusive behavior control, released exactly once
//! - [`FragmentStream`]: ordered speakable fragments with an explicit end
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use robot_conductor::{
//!     backend::ScriptedBackend, device::simulated::SimulatedFleet, Conductor, ConductorConfig,
//!     TurnRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let fleet = Arc::new(SimulatedFleet::new());
//!     let conductor = Conductor::new(ScriptedBackend::new(), fleet, ConductorConfig::default());
//!
//!     let report = conductor
//!         .run_turn(TurnRequest::new("00e20100", "hello robot"))
//!         .await
//!         .unwrap();
//!     println!("{}: {:?}", report.outcome, report.spoken);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`animation`]: cancellable animation loops
//! - [`backend`]: language model abstraction (OpenAI-compatible, scripted)
//! - [`conductor`]: the turn state machine
//! - [`config`]: layered TOML / environment / CLI configuration
//! - [`device`]: robot collaborator traits, RPC gate, simulated robot
//! - [`error`]: turn and acquisition errors
//! - [`interrupt`]: touch and wake-word watcher
//! - [`lease`]: behavior control lease
//! - [`memory`]: conversation memory
//! - [`messages`]: identifiers, chat messages, turn updates
//! - [`persona`]: prompt and animation profiles
//! - [`streaming`]: response consumer and fragment stream
//! - [`stt`]: speech-to-text boundary
//! - [`text`]: segmentation and sanitization

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod animation;
pub mod backend;
pub mod conductor;
pub mod config;
pub mod device;
pub mod error;
pub mod interrupt;
pub mod lease;
pub mod memory;
pub mod messages;
pub mod persona;
pub mod streaming;
pub mod stt;
pub mod text;

// Re-exports for convenience
pub use backend::{
    BackendConfig, LlmBackend, LlmRequest, LlmResponse, OpenAiBackend, Provider, ScriptedBackend,
    StreamingToken,
};
pub use conductor::{Conductor, ConductorConfig, TurnOutcome, TurnReport, TurnRequest};
pub use device::{DeviceConnector, DeviceEvent, RobotConnection};
pub use error::{AcquisitionError, TurnError};
pub use lease::{ControlLease, LeaseRegistry};
pub use memory::{ConversationHistory, ConversationMemory};
pub use messages::{ChatMessage, DeviceId, MessageRole, TurnId, TurnState, TurnUpdate};
pub use persona::Persona;
pub use streaming::{FragmentStream, ResponseConsumer, ResponseMode, ResponseSettings};
pub use stt::SpeechToText;

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConductorConfigFile, ConductorToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
