//! Conversation Memory
//!
//! Bounded per-device chat history used to build model context.
//!
//! # Design Philosophy
//!
//! Each robot keeps its own sliding window of user/assistant pairs. The
//! window never exceeds its capacity: when appending a pair would overflow
//! it, the two oldest messages are dropped first, so user and assistant
//! messages keep alternating and the conversation never resets wholesale.
//!
//! The store is an explicit object the Conductor owns and hands out by
//! reference. Storage is keyed per device, so turns for different robots
//! can read and append in parallel without interfering.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::messages::{ChatMessage, DeviceId};

/// Default capacity of a device's history, in messages
pub const DEFAULT_MAX_MESSAGES: usize = 16;

/// Ordered chat history for one device
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in insertion order
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of stored messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a user/assistant pair, evicting the oldest pairs to stay
    /// within `capacity`
    pub fn push_pair(&mut self, user: ChatMessage, assistant: ChatMessage, capacity: usize) {
        while !self.messages.is_empty() && self.messages.len() + 2 > capacity {
            let evict = self.messages.len().min(2);
            self.messages.drain(..evict);
        }
        self.messages.push(user);
        self.messages.push(assistant);
    }
}

impl IntoIterator for ConversationHistory {
    type Item = ChatMessage;
    type IntoIter = std::vec::IntoIter<ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

/// Process-wide store of per-device conversation histories
#[derive(Debug)]
pub struct ConversationMemory {
    histories: DashMap<DeviceId, ConversationHistory>,
    max_messages: usize,
}

impl ConversationMemory {
    /// Create a store holding at most `max_messages` per device
    ///
    /// Capacities below one pair are raised to one pair.
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            histories: DashMap::new(),
            max_messages: max_messages.max(2),
        }
    }

    /// Capacity of each device's history
    #[must_use]
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Snapshot of a device's history, or an empty one if it has none yet
    #[must_use]
    pub fn get(&self, device: &DeviceId) -> ConversationHistory {
        self.histories
            .get(device)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Record a completed exchange for a device
    pub fn append(&self, device: &DeviceId, user: ChatMessage, assistant: ChatMessage) {
        let mut history = self.histories.entry(device.clone()).or_default();
        history.push_pair(user, assistant, self.max_messages);
        tracing::debug!(
            device = %device,
            messages = history.len(),
            "Conversation memory updated"
        );
    }

    /// Forget everything remembered for a device
    pub fn clear(&self, device: &DeviceId) {
        self.histories.remove(device);
    }

    /// Number of devices with remembered history
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.histories.len()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}
