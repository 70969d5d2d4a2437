//! Speech synthesis through the macOS `say` command.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::AudioFormat;
use crate::audio::util::pcm_from_wav;
use crate::config::AppConfig;

/// Audio format requested from `say` (16-bit little-endian mono PCM).
pub const SAY_FORMAT: AudioFormat = AudioFormat::new(22050, 2, 1);

/// Time a killed synthesizer process gets to exit before it is abandoned.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Failure of a single synthesis call.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesizer exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("synthesizer produced no usable audio: {0}")]
    InvalidOutput(String),

    #[error("synthesizer did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("failed to run synthesizer: {0}")]
    Io(#[from] io::Error),

    #[error("synthesis cancelled")]
    Cancelled,
}

/// Capability to turn one segment of text into PCM audio.
pub trait Synthesizer: Send + Sync + 'static {
    /// Format of every buffer returned by [`Synthesizer::synthesize`].
    fn format(&self) -> AudioFormat;

    /// Synthesize `text` with the given voice (or the system default).
    ///
    /// Cancelling `cancel` aborts the call, which then resolves to
    /// [`SynthesisError::Cancelled`] once any external resources are released.
    fn synthesize(&self, text: &str, voice: Option<&str>, cancel: CancellationToken) -> impl Future<Output = Result<Bytes, SynthesisError>> + Send;
}

/// How a synthesizer process run ended.
enum Outcome {
    Exited(io::Result<(ExitStatus, Vec<u8>)>),
    Cancelled,
    TimedOut,
}

/// Synthesizer that runs one `say` process per segment.
pub struct SaySynthesizer {
    program: PathBuf,                 // Path or name of the `say` executable
    timeout: Option<Duration>,        // Per-call time limit
    limiter: Option<Arc<Semaphore>>,  // Global cap on concurrent processes
}

impl SaySynthesizer {
    /// Create a new synthesizer.
    ///
    /// # Arguments
    /// * `config` - Application configuration
    ///
    /// # Returns
    /// A new `SaySynthesizer` instance.
    pub fn new(config: &AppConfig) -> Self {
        let synthesizer = Self::with_program(&config.say_program)
            .with_timeout(config.synthesis_timeout())
            .with_concurrency_limit(config.max_concurrent_synthesis);

        info!("Synthesizer: {} ({})", config.say_program.display(), SAY_FORMAT);
        synthesizer
    }

    /// Create a synthesizer for the given executable with no limits.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), timeout: None, limiter: None }
    }

    /// Kill calls that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow at most `limit` concurrent processes (0 = unlimited).
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.limiter = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    /// Build the `say` invocation writing a WAV file to `output`.
    fn command(&self, voice: Option<&str>, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(voice) = voice {
            command.arg("-v").arg(voice);
        }
        command
            .arg("--file-format=WAVE")
            .arg(format!("--data-format=LEI{}@{}", SAY_FORMAT.width * 8, SAY_FORMAT.rate))
            .arg("-o")
            .arg(output)
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Synthesizer for SaySynthesizer {
    fn format(&self) -> AudioFormat {
        SAY_FORMAT
    }

    async fn synthesize(&self, text: &str, voice: Option<&str>, cancel: CancellationToken) -> Result<Bytes, SynthesisError> {
        let _permit = match &self.limiter {
            Some(limiter) => tokio::select! {
                permit = Arc::clone(limiter).acquire_owned() => Some(permit.map_err(|_| SynthesisError::Cancelled)?),
                _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
            },
            None => None,
        };

        let workdir = tempfile::tempdir()?;
        let output = workdir.path().join("segment.wav");

        debug!("Synthesizing segment: \"{}\" (voice: {})", text, voice.unwrap_or("default"));
        let mut child = self.command(voice, &output).spawn()?;
        debug!("Started synthesizer process {:?}", child.id());

        let outcome = {
            let stdin = child.stdin.take();
            let stderr = child.stderr.take();

            let feed = async move {
                if let Some(mut stdin) = stdin {
                    // Closing stdin marks the end of the text
                    match stdin.write_all(text.as_bytes()).await {
                        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
                        _ => {}
                    }
                }
                Ok(())
            };
            let drain = async move {
                let mut diagnostics = Vec::new();
                if let Some(mut stderr) = stderr {
                    stderr.read_to_end(&mut diagnostics).await?;
                }
                Ok::<_, io::Error>(diagnostics)
            };
            let run = async {
                let (fed, diagnostics, status) = tokio::join!(feed, drain, child.wait());
                fed?;
                Ok::<_, io::Error>((status?, diagnostics?))
            };

            tokio::select! {
                result = run => Outcome::Exited(result),
                _ = cancel.cancelled() => Outcome::Cancelled,
                _ = deadline(self.timeout) => Outcome::TimedOut,
            }
        };

        let (status, diagnostics) = match outcome {
            Outcome::Exited(result) => result?,
            Outcome::Cancelled => {
                terminate(&mut child).await;
                return Err(SynthesisError::Cancelled);
            }
            Outcome::TimedOut => {
                terminate(&mut child).await;
                return Err(SynthesisError::TimedOut(self.timeout.unwrap_or_default()));
            }
        };

        if !status.success() {
            return Err(SynthesisError::Failed { status, stderr: String::from_utf8_lossy(&diagnostics).trim().to_string() });
        }

        let wav = tokio::fs::read(&output).await.map_err(|e| SynthesisError::InvalidOutput(format!("{}: {}", output.display(), e)))?;
        let (format, pcm) = pcm_from_wav(&wav).map_err(|e| SynthesisError::InvalidOutput(e.to_string()))?;
        if format != SAY_FORMAT {
            return Err(SynthesisError::InvalidOutput(format!("expected {}, got {}", SAY_FORMAT, format)));
        }

        debug!("🎵 Generated speech ({} samples)", SAY_FORMAT.samples_in(pcm.len()));
        Ok(pcm)
    }
}

/// Resolve after `timeout`, or never when there is no timeout.
async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Kill a synthesizer process and reap it within [`KILL_GRACE`].
async fn terminate(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.start_kill() {
        debug!("Synthesizer process {:?} already gone: {}", pid, e);
    }
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(_) => debug!("Synthesizer process {:?} terminated", pid),
        Err(_) => warn!("Synthesizer process {:?} did not exit within {:?}", pid, KILL_GRACE),
    }
}
