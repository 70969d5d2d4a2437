//! Installed voice catalog of the macOS `say` command.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::AppConfig;

/// Matches `Name   xx_YY    # sample sentence` lines of `say -v ?`.
static VOICE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^(.*?)\s+([a-z]{2}_[A-Z]{2})").expect("voice line pattern is valid"));

/// A voice the synthesizer can speak with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDescriptor {
    pub name: String,     // Voice name accepted by `say -v`
    pub language: String, // Locale tag, e.g. en_GB
    pub installed: bool,  // Whether the voice can be used right away
}

/// Source of the installed voice list.
pub trait VoiceCatalog: Send + Sync + 'static {
    /// Query the installed voices.
    fn voices(&self) -> impl Future<Output = Result<Vec<VoiceDescriptor>>> + Send;
}

/// Catalog backed by `say -v ?`.
pub struct SayVoiceCatalog {
    program: PathBuf, // Path or name of the `say` executable
}

impl SayVoiceCatalog {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_program(&config.say_program)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl VoiceCatalog for SayVoiceCatalog {
    async fn voices(&self) -> Result<Vec<VoiceDescriptor>> {
        let output = Command::new(&self.program)
            .arg("-v")
            .arg("?")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{}", stderr.trim());
            anyhow::bail!("Failed to get voices list. Return code {}", output.status);
        }

        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        debug!("Found {} installed voices", voices.len());
        Ok(voices)
    }
}

/// Parse the output of `say -v ?` into voice descriptors.
pub fn parse_voice_list(text: &str) -> Vec<VoiceDescriptor> {
    VOICE_LINE
        .captures_iter(text)
        .map(|caps| VoiceDescriptor { name: caps[1].trim().to_string(), language: caps[2].to_string(), installed: true })
        .filter(|voice| !voice.name.is_empty())
        .collect()
}

/// Pick the voice for a request.
///
/// An explicit name wins, then the first voice speaking the requested
/// language, then the configured default. A name that is missing from a
/// non-empty catalog is rejected.
///
/// # Arguments
/// * `voices` - Installed voices (empty when the catalog is unavailable)
/// * `name` - Voice name requested by the client
/// * `language` - Language requested by the client
/// * `default` - Configured default voice
///
/// # Returns
/// The voice to pass to the synthesizer (`None` for the system default).
///
/// # Errors
/// Returns the rejected voice name.
pub fn resolve_voice(voices: &[VoiceDescriptor], name: Option<&str>, language: Option<&str>, default: Option<&str>) -> Result<Option<String>, String> {
    let by_language = || {
        let language = language?.replace('-', "_");
        voices.iter().find(|v| v.language.eq_ignore_ascii_case(&language)).map(|v| v.name.as_str())
    };

    let Some(chosen) = name.or_else(by_language).or(default) else {
        return Ok(None);
    };

    if voices.is_empty() || voices.iter().any(|v| v.name == chosen) {
        Ok(Some(chosen.to_string()))
    } else {
        Err(chosen.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAY_OUTPUT: &str = "\
Albert              en_US    # Hello! My name is Albert.
Alice               it_IT    # Ciao! Mi chiamo Alice.
Eddy (English (UK)) en_GB    # Hello! My name is Eddy.
Daniel              en_GB    # Hello! My name is Daniel.
";

    fn catalog() -> Vec<VoiceDescriptor> {
        parse_voice_list(SAY_OUTPUT)
    }

    #[test]
    fn test_parse_voice_list() {
        let voices = catalog();
        let pairs: Vec<(&str, &str)> = voices.iter().map(|v| (v.name.as_str(), v.language.as_str())).collect();
        assert_eq!(pairs, vec![("Albert", "en_US"), ("Alice", "it_IT"), ("Eddy (English (UK))", "en_GB"), ("Daniel", "en_GB")]);
        assert!(voices.iter().all(|v| v.installed));
    }

    #[test]
    fn test_parse_ignores_unrelated_lines() {
        assert!(parse_voice_list("no voices here\n\n").is_empty());
    }

    #[test]
    fn test_explicit_name_wins() {
        assert_eq!(resolve_voice(&catalog(), Some("Alice"), Some("en_GB"), Some("Daniel")), Ok(Some("Alice".into())));
    }

    #[test]
    fn test_language_selects_first_matching_voice() {
        assert_eq!(resolve_voice(&catalog(), None, Some("en-gb"), Some("Albert")), Ok(Some("Eddy (English (UK))".into())));
    }

    #[test]
    fn test_unknown_language_falls_back_to_default() {
        assert_eq!(resolve_voice(&catalog(), None, Some("fr_FR"), Some("Daniel")), Ok(Some("Daniel".into())));
        assert_eq!(resolve_voice(&catalog(), None, None, None), Ok(None));
    }

    #[test]
    fn test_unknown_voice_is_rejected() {
        assert_eq!(resolve_voice(&catalog(), Some("Nobody"), None, None), Err("Nobody".into()));
        assert_eq!(resolve_voice(&catalog(), None, None, Some("Nobody")), Err("Nobody".into()));
    }

    #[test]
    fn test_empty_catalog_passes_names_through() {
        assert_eq!(resolve_voice(&[], Some("Anyone"), None, None), Ok(Some("Anyone".into())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_say_catalog_runs_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("say");
        std::fs::write(&script, format!("#!/bin/sh\n[ \"$1 $2\" = \"-v ?\" ] || exit 2\ncat <<'EOF'\n{}EOF\n", SAY_OUTPUT)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let voices = SayVoiceCatalog::with_program(&script).voices().await.unwrap();
        assert_eq!(voices, catalog());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_say_catalog_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("say");
        std::fs::write(&script, "#!/bin/sh\necho broken >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = SayVoiceCatalog::with_program(&script).voices().await.unwrap_err();
        assert!(err.to_string().contains("Failed to get voices list"), "{}", err);
    }
}
