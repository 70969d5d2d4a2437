//! Console output for the installed voice catalog.

use std::collections::BTreeMap;

use crate::tts::VoiceDescriptor;

/// Group voices by language, each group sorted by voice name.
fn by_language(voices: &[VoiceDescriptor]) -> BTreeMap<&str, Vec<&VoiceDescriptor>> {
    let mut groups: BTreeMap<&str, Vec<&VoiceDescriptor>> = BTreeMap::new();
    for voice in voices {
        groups.entry(voice.language.as_str()).or_default().push(voice);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups
}

/// Print all installed voices grouped by language.
pub fn print_voices(voices: &[VoiceDescriptor]) {
    let groups = by_language(voices);

    println!("═══════════════════════════════════════════════════════════════════");
    println!("  macOS say - {} Voices Across {} Languages", voices.len(), groups.len());
    println!("═══════════════════════════════════════════════════════════════════");

    for (language, group) in &groups {
        println!("\n── {} ({} voices) ──", language, group.len());
        for voice in group {
            println!("  {}", voice.name);
        }
    }

    println!("\n{}\n", "─".repeat(70));
    println!("Usage:");
    println!("  ./wyoming-macos-tts --voice <NAME> --uri tcp://0.0.0.0:10200");
}

/// Print detailed information about a specific voice.
pub fn print_voice_info(voices: &[VoiceDescriptor], name: &str) -> anyhow::Result<()> {
    let voice = voices
        .iter()
        .find(|v| v.name == name)
        .ok_or_else(|| anyhow::anyhow!("Voice '{}' not found. Run with --list-voices to see available voices", name))?;

    println!();
    println!("Voice: {}", voice.name);
    println!("{}", "─".repeat(40));
    println!("Language:      {}", voice.language);
    println!("Installed:     {}", if voice.installed { "yes" } else { "no" });
    println!();
    println!("Usage:");
    println!("  ./wyoming-macos-tts --voice '{}'", voice.name);
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, language: &str) -> VoiceDescriptor {
        VoiceDescriptor { name: name.into(), language: language.into(), installed: true }
    }

    #[test]
    fn test_groups_sorted_by_language_and_name() {
        let voices = [voice("Zoe", "en_US"), voice("Alice", "it_IT"), voice("Albert", "en_US")];
        let groups = by_language(&voices);
        let names: Vec<(&str, Vec<&str>)> = groups.iter().map(|(l, g)| (*l, g.iter().map(|v| v.name.as_str()).collect())).collect();
        assert_eq!(names, vec![("en_US", vec!["Albert", "Zoe"]), ("it_IT", vec!["Alice"])]);
    }

    #[test]
    fn test_voice_info_for_unknown_voice() {
        assert!(print_voice_info(&[voice("Alice", "it_IT")], "Nobody").is_err());
        assert!(print_voice_info(&[voice("Alice", "it_IT")], "Alice").is_ok());
    }
}
