//! Application configuration and CLI argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::server::{ServerUri, SessionConfig};

/// Wyoming text-to-speech server configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "wyoming-macos-tts")]
#[command(author, version, about = "Wyoming text-to-speech server for macOS", long_about = None)]
pub struct AppConfig {
    /// Address to listen on: unix://PATH, tcp://HOST:PORT or stdio://
    #[arg(long, env = "WYOMING_URI", default_value = "stdio://")]
    pub uri: ServerUri,

    /// Default voice to use (e.g., Daniel)
    #[arg(long, env = "TTS_VOICE")]
    pub voice: Option<String>,

    /// Name that will be sent in the info event
    #[arg(long, default_value = "macos-tts")]
    pub service_name: String,

    /// Characters that end a sentence when splitting text for synthesis (empty disables splitting).
    /// Text without a final sentence ending is synthesized as is; nothing is appended.
    #[arg(long, default_value = ".?!")]
    pub auto_punctuation: String,

    /// Number of audio samples sent in each audio chunk
    #[arg(long, default_value = "1024")]
    pub samples_per_chunk: usize,

    /// Enable audio streaming on sentence boundaries
    #[arg(long)]
    pub streaming: bool,

    /// Speech synthesizer executable
    #[arg(long, env = "SAY_PROGRAM", default_value = "say")]
    pub say_program: PathBuf,

    /// Seconds after which a synthesis call is killed (no limit if omitted)
    #[arg(long, value_parser = parse_timeout)]
    pub synthesis_timeout: Option<f64>,

    /// Maximum concurrent synthesizer processes across all clients (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_concurrent_synthesis: usize,

    /// List all installed voices and exit
    #[arg(long)]
    pub list_voices: bool,

    /// Show information about a specific voice and exit
    #[arg(long)]
    pub voice_info: Option<String>,

    /// Log DEBUG messages
    #[arg(long)]
    pub debug: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Get the synthesis timeout, if any.
    pub fn synthesis_timeout(&self) -> Option<Duration> {
        self.synthesis_timeout.map(Duration::from_secs_f64)
    }

    /// Settings shared by every client session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            service_name: self.service_name.clone(),
            default_voice: self.voice.clone().filter(|v| !v.trim().is_empty()),
            punctuation: self.auto_punctuation.clone(),
            samples_per_chunk: self.samples_per_chunk,
            streaming: self.streaming,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_chunk == 0 {
            anyhow::bail!("Samples per chunk must be at least 1");
        }

        if let Some(c) = self.auto_punctuation.chars().find(|c| c.is_whitespace() || c.is_alphanumeric()) {
            anyhow::bail!("Punctuation set must not contain letters, digits or whitespace (found {:?})", c);
        }

        if self.say_program.as_os_str().is_empty() {
            anyhow::bail!("Synthesizer program must not be empty");
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  URI: {}", self.uri);
        info!("  Service name: {}", self.service_name);
        info!("  Default voice: {}", self.voice.as_deref().unwrap_or("system default"));
        info!("  Punctuation: {:?}", self.auto_punctuation);
        info!("  Samples per chunk: {}", self.samples_per_chunk);
        info!("  Streaming: {}", self.streaming);
        info!("  Synthesizer: {}", self.say_program.display());
        match self.synthesis_timeout() {
            Some(timeout) => info!("  Synthesis timeout: {:?}", timeout),
            None => info!("  Synthesis timeout: none"),
        }
        if self.max_concurrent_synthesis > 0 {
            info!("  Max concurrent synthesis: {}", self.max_concurrent_synthesis);
        }
    }
}

/// Parse and validate a timeout in seconds (must be positive).
fn parse_timeout(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("timeout must be positive, got {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        AppConfig::try_parse_from(std::iter::once("wyoming-macos-tts").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.uri, ServerUri::Stdio);
        assert_eq!(config.service_name, "macos-tts");
        assert_eq!(config.auto_punctuation, ".?!");
        assert_eq!(config.samples_per_chunk, 1024);
        assert!(!config.streaming);
        assert_eq!(config.synthesis_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config() {
        let config = parse(&["--voice", "Daniel", "--streaming", "--auto-punctuation", "", "--samples-per-chunk", "512"]);
        let session = config.session_config();
        assert_eq!(session.default_voice.as_deref(), Some("Daniel"));
        assert_eq!(session.punctuation, "");
        assert_eq!(session.samples_per_chunk, 512);
        assert!(session.streaming);
    }

    #[test]
    fn test_timeout_parsing() {
        assert_eq!(parse(&["--synthesis-timeout", "1.5"]).synthesis_timeout(), Some(Duration::from_millis(1500)));
        assert!(AppConfig::try_parse_from(["x", "--synthesis-timeout", "0"]).is_err());
        assert!(AppConfig::try_parse_from(["x", "--synthesis-timeout", "soon"]).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(parse(&["--samples-per-chunk", "0"]).validate().is_err());
        assert!(parse(&["--auto-punctuation", ". "]).validate().is_err());
        assert!(parse(&["--auto-punctuation", "a"]).validate().is_err());
    }
}
