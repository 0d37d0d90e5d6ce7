//! Shared Conductor Types
//!
//! Identifiers, chat messages, and the turn updates the Conductor publishes
//! while it works through a turn.
//!
//! # Design Philosophy
//!
//! Every component receives typed values instead of opaque payloads. A turn
//! is described by a [`crate::conductor::TurnRequest`], its text travels as
//! [`ChatMessage`]s, and observers learn about progress through
//! [`TurnUpdate`]s. Nothing here owns behavior; these are the nouns the other
//! modules share.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one physical robot (its serial number)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Create a device ID from a serial number
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// Borrow the serial number
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(serial: &str) -> Self {
        Self(serial.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(serial: String) -> Self {
        Self(serial)
    }
}

/// Identifier of one conversational turn, used to correlate logs and updates
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Generate a new unique turn ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("turn_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt
    System,
    /// The person talking to the robot
    User,
    /// The language model speaking through the robot
    Assistant,
}

impl MessageRole {
    /// Role name as chat-completion providers spell it
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A role-tagged message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was recorded
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new message stamped with the current time
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Orchestrator state within a single turn
///
/// ```text
/// Idle → LeaseRequested → LeaseGranted → Responding → Speaking(i) → Releasing → Idle
///                                            └────────────┴──→ Interrupted ──┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    /// No turn in progress
    Idle,
    /// Waiting for the robot to grant behavior control
    LeaseRequested,
    /// Control granted, nothing requested from the provider yet
    LeaseGranted,
    /// Waiting for the first speakable fragment
    Responding,
    /// Dispatching the fragment with this index
    Speaking(usize),
    /// An external touch or wake event cut the performance short
    Interrupted,
    /// Stopping background loops and handing control back
    Releasing,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::LeaseRequested => f.write_str("lease_requested"),
            Self::LeaseGranted => f.write_str("lease_granted"),
            Self::Responding => f.write_str("responding"),
            Self::Speaking(index) => write!(f, "speaking({index})"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Releasing => f.write_str("releasing"),
        }
    }
}

/// Progress notifications published by the Conductor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TurnUpdate {
    /// The turn moved to a new state
    State {
        /// Turn this update belongs to
        turn_id: TurnId,
        /// The new state
        state: TurnState,
    },
    /// A fragment was handed to the robot's speech synthesizer
    FragmentSpoken {
        /// Turn this update belongs to
        turn_id: TurnId,
        /// Position of the fragment in generation order
        index: usize,
        /// The fragment text
        text: String,
    },
}
