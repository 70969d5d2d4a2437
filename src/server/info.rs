//! Service description sent in answer to `describe`.

use super::SessionConfig;
use crate::protocol::{Attribution, Info, TtsProgram, TtsVoice};
use crate::tts::VoiceDescriptor;

fn apple() -> Attribution {
    Attribution { name: "Apple".to_string(), url: "https://apple.com".to_string() }
}

/// Build the info message for the given installed voices.
///
/// Voices are listed by name, each with its single language.
pub fn service_info(config: &SessionConfig, voices: &[VoiceDescriptor]) -> Info {
    let mut voices: Vec<TtsVoice> = voices
        .iter()
        .map(|voice| TtsVoice {
            name: voice.name.clone(),
            description: None,
            attribution: apple(),
            installed: voice.installed,
            version: None,
            languages: vec![voice.language.clone()],
        })
        .collect();
    voices.sort_by(|a, b| a.name.cmp(&b.name));

    let program = TtsProgram {
        name: config.service_name.clone(),
        description: Some("macos-tts".to_string()),
        attribution: apple(),
        installed: true,
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        voices,
        supports_synthesize_streaming: config.streaming,
    };

    Info { tts: vec![program], ..Default::default() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(streaming: bool) -> SessionConfig {
        SessionConfig { service_name: "bedroom-tts".into(), default_voice: None, punctuation: ".?!".into(), samples_per_chunk: 1024, streaming }
    }

    fn voice(name: &str, language: &str) -> VoiceDescriptor {
        VoiceDescriptor { name: name.into(), language: language.into(), installed: true }
    }

    #[test]
    fn test_single_program_with_sorted_voices() {
        let info = service_info(&config(true), &[voice("Samantha", "en_US"), voice("Alice", "it_IT"), voice("Daniel", "en_GB")]);

        assert_eq!(info.tts.len(), 1);
        assert!(info.asr.is_empty() && info.wake.is_empty());

        let program = &info.tts[0];
        assert_eq!(program.name, "bedroom-tts");
        assert!(program.installed);
        assert!(program.supports_synthesize_streaming);
        assert_eq!(program.attribution.name, "Apple");

        let names: Vec<&str> = program.voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Daniel", "Samantha"]);
        assert_eq!(program.voices[1].languages, vec!["en_GB"]);
    }

    #[test]
    fn test_streaming_flag_follows_config() {
        let info = service_info(&config(false), &[]);
        assert!(!info.tts[0].supports_synthesize_streaming);
        assert!(info.tts[0].voices.is_empty());
    }
}
