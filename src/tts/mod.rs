//! Text-to-speech module using the macOS `say` command.
//!
//! Provides sentence segmentation, the synthesizer capability with its `say`
//! implementation, and the installed voice catalog.

mod segmenter;
mod synthesizer;
mod voices;

pub use segmenter::SentenceSegmenter;
pub use synthesizer::{KILL_GRACE, SaySynthesizer, SynthesisError, Synthesizer};
pub use voices::{SayVoiceCatalog, VoiceCatalog, VoiceDescriptor, resolve_voice};
