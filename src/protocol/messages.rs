//! Typed bodies of the events exchanged with clients.

use serde::{Deserialize, Serialize};

use super::Message;
use crate::audio::AudioFormat;

/// Request for service information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Describe {}

impl Message for Describe {
    const EVENT_TYPE: &'static str = "describe";
}

/// Attribution of a program or voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

/// A voice offered by a text-to-speech program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsVoice {
    pub name: String,
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    pub version: Option<String>,
    pub languages: Vec<String>,
}

/// A text-to-speech program offered by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsProgram {
    pub name: String,
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    pub version: Option<String>,
    pub voices: Vec<TtsVoice>,
    #[serde(default)]
    pub supports_synthesize_streaming: bool,
}

/// Answer to [`Describe`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub asr: Vec<serde_json::Value>,
    #[serde(default)]
    pub tts: Vec<TtsProgram>,
    #[serde(default)]
    pub handle: Vec<serde_json::Value>,
    #[serde(default)]
    pub intent: Vec<serde_json::Value>,
    #[serde(default)]
    pub wake: Vec<serde_json::Value>,
}

impl Message for Info {
    const EVENT_TYPE: &'static str = "info";
}

/// Voice selection attached to a synthesis request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeVoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Complete synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesize {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<SynthesizeVoice>,
}

impl Message for Synthesize {
    const EVENT_TYPE: &'static str = "synthesize";
}

/// Opens a streamed synthesis request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeStart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<SynthesizeVoice>,
}

impl Message for SynthesizeStart {
    const EVENT_TYPE: &'static str = "synthesize-start";
}

/// One text fragment of a streamed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeChunk {
    pub text: String,
}

impl Message for SynthesizeChunk {
    const EVENT_TYPE: &'static str = "synthesize-chunk";
}

/// Ends a streamed request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeStop {}

impl Message for SynthesizeStop {
    const EVENT_TYPE: &'static str = "synthesize-stop";
}

/// Acknowledges that a streamed request has been fully answered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeStopped {}

impl Message for SynthesizeStopped {
    const EVENT_TYPE: &'static str = "synthesize-stopped";
}

/// Announces the format of the audio that follows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStart {
    pub rate: u32,
    pub width: u16,
    pub channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl AudioStart {
    pub fn new(format: AudioFormat) -> Self {
        Self { rate: format.rate, width: format.width, channels: format.channels, timestamp: Some(0) }
    }
}

impl Message for AudioStart {
    const EVENT_TYPE: &'static str = "audio-start";
}

/// Data of an audio frame event; the PCM bytes travel as the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub rate: u32,
    pub width: u16,
    pub channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl AudioChunk {
    pub fn new(format: AudioFormat, timestamp: u64) -> Self {
        Self { rate: format.rate, width: format.width, channels: format.channels, timestamp: Some(timestamp) }
    }
}

impl Message for AudioChunk {
    const EVENT_TYPE: &'static str = "audio-chunk";
}

/// Ends an audio stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStop {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Message for AudioStop {
    const EVENT_TYPE: &'static str = "audio-stop";
}

/// Human-readable failure report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorMessage {
    pub fn new(text: impl Into<String>, code: &str) -> Self {
        Self { text: text.into(), code: Some(code.to_string()) }
    }
}

impl Message for ErrorMessage {
    const EVENT_TYPE: &'static str = "error";
}
