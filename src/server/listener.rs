//! Listening endpoints and per-connection session tasks.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::{Session, SessionConfig};
use crate::tts::{KILL_GRACE, Synthesizer, VoiceCatalog};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Address the server listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerUri {
    /// `tcp://HOST:PORT`
    Tcp(String),
    /// `unix://PATH`
    Unix(PathBuf),
    /// `stdio://`, a single session over stdin/stdout
    Stdio,
}

/// Invalid listen address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("unsupported URI '{0}' (expected tcp://HOST:PORT, unix://PATH or stdio://)")]
    UnsupportedScheme(String),

    #[error("URI '{0}' is missing an address")]
    MissingAddress(String),

    #[error("URI '{0}' is missing a port")]
    MissingPort(String),
}

impl FromStr for ServerUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "stdio://" {
            return Ok(ServerUri::Stdio);
        }

        if let Some(address) = s.strip_prefix("tcp://") {
            let Some((host, port)) = address.rsplit_once(':') else {
                return Err(UriError::MissingPort(s.to_string()));
            };
            if host.is_empty() {
                return Err(UriError::MissingAddress(s.to_string()));
            }
            if port.parse::<u16>().is_err() {
                return Err(UriError::MissingPort(s.to_string()));
            }
            return Ok(ServerUri::Tcp(address.to_string()));
        }

        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(UriError::MissingAddress(s.to_string()));
            }
            return Ok(ServerUri::Unix(PathBuf::from(path)));
        }

        Err(UriError::UnsupportedScheme(s.to_string()))
    }
}

impl fmt::Display for ServerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerUri::Tcp(address) => write!(f, "tcp://{}", address),
            ServerUri::Unix(path) => write!(f, "unix://{}", path.display()),
            ServerUri::Stdio => write!(f, "stdio://"),
        }
    }
}

/// Wyoming server running one [`Session`] per client.
pub struct Server<S, C> {
    config: Arc<SessionConfig>,  // Settings shared by all sessions
    synthesizer: Arc<S>,         // Speech backend
    catalog: Arc<C>,             // Installed voice source
    shutdown: CancellationToken, // Cancelled on SIGINT/SIGTERM
}

impl<S: Synthesizer, C: VoiceCatalog> Server<S, C> {
    /// Create a new server.
    ///
    /// # Arguments
    /// * `config` - Session settings
    /// * `synthesizer` - Speech backend shared by all sessions
    /// * `catalog` - Installed voice source
    /// * `shutdown` - Token that stops the server and all sessions
    pub fn new(config: SessionConfig, synthesizer: S, catalog: C, shutdown: CancellationToken) -> Self {
        Self { config: Arc::new(config), synthesizer: Arc::new(synthesizer), catalog: Arc::new(catalog), shutdown }
    }

    /// Serve clients on `uri` until shutdown (or, for stdio, until the session ends).
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn run(&self, uri: &ServerUri) -> Result<()> {
        match uri {
            ServerUri::Stdio => {
                info!("✅ Ready, serving a single session on stdin/stdout");
                let mut session = self.session(tokio::io::stdin(), tokio::io::stdout());
                if let Err(e) = session.run().await {
                    warn!("Session closed: {}", e);
                }
                Ok(())
            }
            ServerUri::Tcp(address) => {
                let listener = TcpListener::bind(address).await.with_context(|| format!("Failed to bind {}", uri))?;
                info!("✅ Ready, listening on {}", uri);

                let listener = &listener;
                self.accept_loop(move || async move {
                    let (stream, peer) = listener.accept().await?;
                    let (reader, writer) = stream.into_split();
                    Ok((reader, writer, peer.to_string()))
                })
                .await;
                Ok(())
            }
            ServerUri::Unix(path) => self.run_unix(uri, path).await,
        }
    }

    #[cfg(unix)]
    async fn run_unix(&self, uri: &ServerUri, path: &std::path::Path) -> Result<()> {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::net::UnixListener;

        if path.exists() {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }

        let listener = UnixListener::bind(path).with_context(|| format!("Failed to bind {}", uri))?;
        info!("✅ Ready, listening on {}", uri);

        let listener = &listener;
        let connections = AtomicUsize::new(0);
        let connections = &connections;
        self.accept_loop(move || async move {
            let (stream, _) = listener.accept().await?;
            let (reader, writer) = stream.into_split();
            let id = connections.fetch_add(1, Ordering::Relaxed) + 1;
            Ok((reader, writer, format!("unix#{}", id)))
        })
        .await;

        if let Err(e) = std::fs::remove_file(path) {
            debug!("Failed to remove socket {}: {}", path.display(), e);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn run_unix(&self, uri: &ServerUri, _path: &std::path::Path) -> Result<()> {
        anyhow::bail!("{} requires a unix platform", uri)
    }

    /// Accept connections until shutdown, then wait for the sessions to end.
    async fn accept_loop<A, F, R, W>(&self, mut accept: A)
    where
        A: FnMut() -> F,
        F: Future<Output = io::Result<(R, W, String)>>,
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = accept() => match accepted {
                    Ok((reader, writer, peer)) => {
                        info!("Client connected: {}", peer);
                        let mut session = self.session(reader, writer);
                        sessions.spawn(
                            async move {
                                match session.run().await {
                                    Ok(()) => info!("Client disconnected"),
                                    Err(e) => warn!("Session closed: {}", e),
                                }
                                debug!("Session ended in state {:?}", session.state());
                            }
                            .instrument(info_span!("session", peer = %peer)),
                        );
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Session task failed: {}", e);
                    }
                }
            }
        }

        drain(sessions).await;
    }

    fn session<R, W>(&self, reader: R, writer: W) -> Session<S, C, R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        Session::new(
            Arc::clone(&self.config),
            Arc::clone(&self.synthesizer),
            Arc::clone(&self.catalog),
            reader,
            writer,
            self.shutdown.child_token(),
        )
    }
}

/// Wait for cancelled sessions to finish, aborting any that outlive the grace period.
async fn drain(mut sessions: JoinSet<()>) {
    if sessions.is_empty() {
        return;
    }

    info!("Waiting for {} session(s) to finish", sessions.len());
    let finished = tokio::time::timeout(KILL_GRACE + Duration::from_secs(1), async {
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                warn!("Session task failed: {}", e);
            }
        }
    })
    .await;

    if finished.is_err() {
        warn!("Aborting {} session(s) after grace period", sessions.len());
        sessions.shutdown().await;
    }
}
