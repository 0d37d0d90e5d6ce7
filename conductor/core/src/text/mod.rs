//! Text handling between the language model and the speech synthesizer
//!
//! - [`segment`]: split response text into speakable fragments, either in
//!   one pass or incrementally as deltas arrive
//! - [`sanitize`]: normalize characters the robot's voice cannot say

pub mod sanitize;
pub mod segment;

pub use sanitize::sanitize;
pub use segment::{segment, Segmenter};
