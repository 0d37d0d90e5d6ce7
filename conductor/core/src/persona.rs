//! Personas
//!
//! A persona selects the prompt guidance and the animation set a turn uses.
//! The default persona chats; the knowledge persona looks something up and
//! plays a "searching" loop while the provider thinks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// System prompt used when none is configured
pub const DEFAULT_PROMPT: &str =
    "You are a helpful, animated robot called Vector. Keep the response concise yet informative.";

/// Animations that frame one spoken response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationSet {
    /// Looped while waiting for the first fragment, if any
    pub thinking: Option<&'static str>,
    /// Played once right before the first fragment
    pub get_in: &'static str,
    /// Looped while fragments are spoken
    pub speaking: &'static str,
}

/// Behavior profile for a turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    /// Casual conversation
    #[default]
    Default,
    /// Knowledge lookup ("I have a question")
    Knowledge,
}

impl Persona {
    /// Animation set for this persona
    #[must_use]
    pub fn animations(self) -> AnimationSet {
        match self {
            Self::Default => AnimationSet {
                thinking: None,
                get_in: "anim_getin_tts_01",
                speaking: "anim_tts_loop_02",
            },
            Self::Knowledge => AnimationSet {
                thinking: Some("anim_knowledgegraph_searching_01"),
                get_in: "anim_knowledgegraph_searching_getout_01",
                speaking: "anim_knowledgegraph_answer_01",
            },
        }
    }

    /// System prompt for this persona, built on a base prompt
    #[must_use]
    pub fn system_prompt(self, base: &str) -> String {
        let base = if base.trim().is_empty() {
            DEFAULT_PROMPT
        } else {
            base.trim()
        };
        match self {
            Self::Default => base.to_string(),
            Self::Knowledge => format!(
                "{base} The user is asking you to look something up. \
                 Answer factually in a few short sentences, without lists or markdown."
            ),
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Knowledge => f.write_str("knowledge"),
        }
    }
}
