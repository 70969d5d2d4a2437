//! Per-connection synthesis session.
//!
//! A session reads events from one client, splits request text into
//! sentences, synthesizes them one at a time and streams the audio back. While
//! a synthesizer call is running the session keeps reading the transport so
//! that a disconnect cancels the call at once; events that arrive meanwhile are
//! queued and handled afterwards, in order.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::info::service_info;
use crate::audio::{AudioFormat, frame_audio};
use crate::protocol::{
    AudioChunk, AudioStart, AudioStop, Describe, ErrorMessage, Event, EventCodec, Message, ProtocolError, Synthesize, SynthesizeChunk, SynthesizeStart,
    SynthesizeStop, SynthesizeStopped, SynthesizeVoice,
};
use crate::tts::{SentenceSegmenter, SynthesisError, Synthesizer, VoiceCatalog, VoiceDescriptor, resolve_voice};

/// Settings shared by every session of a server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub service_name: String,          // Program name reported by `info`
    pub default_voice: Option<String>, // Voice used when a request names none
    pub punctuation: String,           // Sentence-ending characters
    pub samples_per_chunk: usize,      // Samples per audio-chunk event
    pub streaming: bool,               // Split text and accept streamed requests
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No request in progress
    Idle,
    /// Streamed request open, waiting for more text
    AwaitingText,
    /// Synthesizer call outstanding
    Synthesizing,
    /// Delivering a segment's audio
    Emitting,
    /// Session finished
    Closed,
}

/// Fatal session failure.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Reason a single request was aborted.
#[derive(Debug, Error)]
enum RequestError {
    #[error("voice '{0}' is not installed")]
    UnsupportedVoice(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ProtocolError> for RequestError {
    fn from(e: ProtocolError) -> Self {
        RequestError::Session(e.into())
    }
}

/// Request currently being answered.
#[derive(Debug)]
struct ActiveRequest {
    voice: Option<String>,         // Resolved voice for every segment
    streamed: bool,                // Opened by synthesize-start
    segmenter: SentenceSegmenter,  // Pending text of a streamed request
    audio_started: bool,           // audio-start already sent
    samples_sent: usize,           // Samples delivered so far (for timestamps)
    failed: bool,                  // Aborted; remaining text is discarded
}

impl ActiveRequest {
    fn new(voice: Option<String>, streamed: bool, punctuation: &str) -> Self {
        Self { voice, streamed, segmenter: SentenceSegmenter::new(punctuation), audio_started: false, samples_sent: 0, failed: false }
    }
}

/// Synthesis session bound to one client connection.
pub struct Session<S, C, R, W> {
    config: Arc<SessionConfig>,          // Shared server settings
    synthesizer: Arc<S>,                 // Speech backend
    catalog: Arc<C>,                     // Installed voice source
    format: AudioFormat,                 // Sample format fixed for the session
    reader: FramedRead<R, EventCodec>,   // Inbound events
    writer: FramedWrite<W, EventCodec>,  // Outbound events
    cancel: CancellationToken,           // Cancelled on disconnect or shutdown
    state: SessionState,                 // Current lifecycle state
    voices: Option<Vec<VoiceDescriptor>>, // Catalog fetched for this session
    request: Option<ActiveRequest>,      // Request in progress
    backlog: VecDeque<Event>,            // Events read while synthesizing
    violation: Option<ProtocolError>,    // Decode failure seen while synthesizing
}

impl<S, C, R, W> Session<S, C, R, W>
where
    S: Synthesizer,
    C: VoiceCatalog,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a session over a split transport.
    ///
    /// # Arguments
    /// * `config` - Shared session settings
    /// * `synthesizer` - Speech backend
    /// * `catalog` - Installed voice source
    /// * `reader` - Transport read half
    /// * `writer` - Transport write half
    /// * `cancel` - Token that ends the session (e.g. server shutdown)
    pub fn new(config: Arc<SessionConfig>, synthesizer: Arc<S>, catalog: Arc<C>, reader: R, writer: W, cancel: CancellationToken) -> Self {
        let format = synthesizer.format();
        Self {
            config,
            synthesizer,
            catalog,
            format,
            reader: FramedRead::new(reader, EventCodec::new()),
            writer: FramedWrite::new(writer, EventCodec::new()),
            cancel,
            state: SessionState::Idle,
            voices: None,
            request: None,
            backlog: VecDeque::new(),
            violation: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the client until it disconnects, the session is cancelled or a
    /// protocol violation occurs.
    ///
    /// # Errors
    /// Returns an error on protocol violations and transport failures.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let result = self.event_loop().await;
        self.state = SessionState::Closed;
        self.cancel.cancel();
        result
    }

    async fn event_loop(&mut self) -> Result<(), SessionError> {
        while let Some(event) = self.next_event().await? {
            self.handle_event(event).await?;
        }
        Ok(())
    }

    /// Next event to handle, or `None` once the session is over.
    async fn next_event(&mut self) -> Result<Option<Event>, SessionError> {
        if let Some(e) = self.violation.take() {
            return Err(self.malformed(e).await);
        }
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(event) = self.backlog.pop_front() {
            return Ok(Some(event));
        }

        let next = tokio::select! {
            _ = self.cancel.cancelled() => None,
            event = self.reader.next() => event,
        };

        match next {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => Err(self.malformed(e).await),
            None => Ok(None),
        }
    }

    async fn handle_event(&mut self, event: Event) -> Result<(), SessionError> {
        debug!("Received {} event", event.event_type);

        if event.is::<Describe>() {
            self.describe().await
        } else if event.is::<Synthesize>() {
            let request = self.parse::<Synthesize>(&event).await?;
            self.synthesize(request).await
        } else if event.is::<SynthesizeStart>() {
            let start = self.parse::<SynthesizeStart>(&event).await?;
            self.start_stream(start).await
        } else if event.is::<SynthesizeChunk>() {
            let chunk = self.parse::<SynthesizeChunk>(&event).await?;
            self.continue_stream(chunk).await
        } else if event.is::<SynthesizeStop>() {
            self.finish_stream().await
        } else {
            debug!("Ignoring unexpected {} event", event.event_type);
            Ok(())
        }
    }

    /// Answer a describe event with the service information.
    async fn describe(&mut self) -> Result<(), SessionError> {
        let voices = self.voices().await.to_vec();
        let info = service_info(&self.config, &voices);
        self.send(info.to_event()?).await
    }

    /// Handle a complete (non-streamed) request.
    async fn synthesize(&mut self, request: Synthesize) -> Result<(), SessionError> {
        if self.request.as_ref().is_some_and(|r| r.streamed) {
            debug!("Ignoring synthesize event sent alongside a streamed request");
            return Ok(());
        }

        let voice = match self.resolve(request.voice.as_ref()).await {
            Ok(voice) => voice,
            Err(e) => return self.abort_request(e).await,
        };

        let segments = if self.config.streaming {
            SentenceSegmenter::new(self.config.punctuation.as_str()).segment_all(&request.text)
        } else {
            let text = request.text.trim();
            if text.is_empty() { Vec::new() } else { vec![text.to_string()] }
        };

        info!("🗣️ Synthesize request: {} segment(s), voice {}", segments.len(), voice.as_deref().unwrap_or("default"));
        self.request = Some(ActiveRequest::new(voice, false, &self.config.punctuation));

        for segment in segments {
            if let Err(e) = self.speak(&segment).await {
                return self.abort_request(e).await;
            }
        }

        self.finish_audio().await?;
        self.request = None;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Open a streamed request.
    async fn start_stream(&mut self, start: SynthesizeStart) -> Result<(), SessionError> {
        if !self.config.streaming {
            debug!("Streaming disabled, ignoring synthesize-start");
            return Ok(());
        }
        if self.request.is_some() {
            return Err(self.violation("synthesize-start received while a streamed request is open").await);
        }

        let resolved = self.resolve(start.voice.as_ref()).await;
        let voice = resolved.as_ref().ok().cloned().flatten();
        info!("🗣️ Streamed request started, voice {}", voice.as_deref().unwrap_or("default"));

        self.request = Some(ActiveRequest::new(voice, true, &self.config.punctuation));
        self.state = SessionState::AwaitingText;

        if let Err(e) = resolved {
            self.abort_request(e).await?;
        }
        Ok(())
    }

    /// Add text to the open streamed request and speak completed sentences.
    async fn continue_stream(&mut self, chunk: SynthesizeChunk) -> Result<(), SessionError> {
        if !self.config.streaming {
            debug!("Streaming disabled, ignoring synthesize-chunk");
            return Ok(());
        }

        let segments = match self.request.as_mut() {
            Some(request) if request.streamed => {
                if request.failed {
                    debug!("Discarding text of aborted request");
                    return Ok(());
                }
                request.segmenter.push(&chunk.text)
            }
            _ => return Err(self.violation("synthesize-chunk received without synthesize-start").await),
        };

        let mut pending: VecDeque<String> = segments.into();
        while let Some(segment) = pending.pop_front() {
            if let Err(e) = self.speak(&segment).await {
                return self.abort_request(e).await;
            }
        }

        if let Some(request) = &self.request {
            debug!("Pending text: {:?}", request.segmenter.residual());
        }
        self.state = SessionState::AwaitingText;
        Ok(())
    }

    /// Close the open streamed request: speak the remaining text and end the audio.
    async fn finish_stream(&mut self) -> Result<(), SessionError> {
        if !self.config.streaming {
            debug!("Streaming disabled, ignoring synthesize-stop");
            return Ok(());
        }

        let residual = match self.request.as_mut() {
            Some(request) if request.streamed => (!request.failed).then(|| request.segmenter.flush()).flatten(),
            _ => return Err(self.violation("synthesize-stop received without synthesize-start").await),
        };

        let failed = self.request.as_ref().is_some_and(|r| r.failed);
        if !failed {
            let result = match residual {
                Some(segment) => self.speak(&segment).await,
                None => Ok(()),
            };
            match result {
                Ok(()) => self.finish_audio().await?,
                Err(e) => self.abort_request(e).await?,
            }
        }

        // The session may have been cancelled while speaking the residual
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        self.send(SynthesizeStopped {}.to_event()?).await?;
        info!("Streamed request finished");
        self.request = None;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Synthesize one segment and deliver its audio.
    async fn speak(&mut self, text: &str) -> Result<(), RequestError> {
        let voice = self.request.as_ref().and_then(|r| r.voice.clone());

        self.state = SessionState::Synthesizing;
        debug!("Synthesizing segment: \"{}\"", text);
        let audio = self.synthesize_segment(text, voice.as_deref()).await?;

        self.state = SessionState::Emitting;
        let frames = frame_audio(audio, self.config.samples_per_chunk, self.format);
        debug!("Sending {} audio chunk(s)", frames.len());

        for frame in frames {
            self.start_audio().await?;
            let Some(request) = self.request.as_mut() else { break };
            let timestamp = self.format.millis_for(request.samples_sent);
            request.samples_sent += frame.samples();

            let event = AudioChunk::new(frame.format, timestamp).to_event()?.with_payload(frame.data);
            self.writer.feed(event).await?;
        }
        self.writer.flush().await?;

        Ok(())
    }

    /// Run one synthesizer call while watching the transport for disconnects.
    async fn synthesize_segment(&mut self, text: &str, voice: Option<&str>) -> Result<Bytes, SynthesisError> {
        let synthesizer = Arc::clone(&self.synthesizer);
        let call = synthesizer.synthesize(text, voice, self.cancel.child_token());
        tokio::pin!(call);

        let mut reading = !self.cancel.is_cancelled();
        loop {
            tokio::select! {
                result = &mut call => return result,
                event = self.reader.next(), if reading => match event {
                    Some(Ok(event)) => self.backlog.push_back(event),
                    Some(Err(e)) => {
                        warn!("Malformed event during synthesis: {}", e);
                        self.violation = Some(e);
                        reading = false;
                        self.cancel.cancel();
                    }
                    None => {
                        info!("Client disconnected during synthesis, cancelling");
                        reading = false;
                        self.cancel.cancel();
                    }
                },
            }
        }
    }

    /// Send audio-start once per request.
    async fn start_audio(&mut self) -> Result<(), SessionError> {
        match self.request.as_mut() {
            Some(request) if !request.audio_started => request.audio_started = true,
            _ => return Ok(()),
        }
        self.writer.feed(AudioStart::new(self.format).to_event()?).await?;
        Ok(())
    }

    /// Send audio-stop for the current request (after audio-start if no audio was produced).
    async fn finish_audio(&mut self) -> Result<(), SessionError> {
        self.start_audio().await?;
        let samples = self.request.as_ref().map_or(0, |r| r.samples_sent);
        let stop = AudioStop { timestamp: Some(self.format.millis_for(samples)) };
        self.send(stop.to_event()?).await?;
        debug!("Audio finished ({} samples)", samples);
        Ok(())
    }

    /// Abort the current request after a failure.
    ///
    /// Reports the failure to the client unless the session is being torn
    /// down. A streamed request stays open (marked failed) until its
    /// synthesize-stop arrives.
    async fn abort_request(&mut self, error: RequestError) -> Result<(), SessionError> {
        let code = match error {
            RequestError::Session(e) => return Err(e),
            RequestError::Synthesis(SynthesisError::Cancelled) => {
                debug!("Synthesis cancelled");
                self.request = None;
                return Ok(());
            }
            RequestError::UnsupportedVoice(_) => "unsupported-voice",
            RequestError::Synthesis(_) => "synthesis-failed",
        };

        match self.request.as_mut() {
            Some(request) if request.streamed => {
                request.failed = true;
                self.state = SessionState::AwaitingText;
            }
            _ => {
                self.request = None;
                self.state = SessionState::Idle;
            }
        }

        self.send_error(error.to_string(), code).await
    }

    /// Pick the voice for a request from its voice selection.
    async fn resolve(&mut self, selection: Option<&SynthesizeVoice>) -> Result<Option<String>, RequestError> {
        let name = selection.and_then(|v| v.name.as_deref()).filter(|n| !n.trim().is_empty());
        let language = selection.and_then(|v| v.language.as_deref());
        let default = self.config.default_voice.clone();
        if name.is_none() && language.is_none() && default.is_none() {
            return Ok(None);
        }

        let voices = self.voices().await;
        resolve_voice(voices, name, language, default.as_deref()).map_err(RequestError::UnsupportedVoice)
    }

    /// Installed voices, fetched once per session (empty if unavailable or cancelled).
    async fn voices(&mut self) -> &[VoiceDescriptor] {
        if self.voices.is_none() {
            let listed = tokio::select! {
                _ = self.cancel.cancelled() => return &[],
                listed = self.catalog.voices() => listed,
            };
            match listed {
                Ok(voices) => self.voices = Some(voices),
                Err(e) => warn!("Failed to list voices: {:#}", e),
            }
        }
        self.voices.as_deref().unwrap_or_default()
    }

    /// Decode the data of an event, treating bad data as a protocol violation.
    async fn parse<M: Message>(&mut self, event: &Event) -> Result<M, SessionError> {
        match event.to_message::<M>() {
            Ok(message) => Ok(message),
            Err(e) => Err(self.violation(&e.to_string()).await),
        }
    }

    /// Report a protocol violation and produce the error that closes the session.
    async fn violation(&mut self, reason: &str) -> SessionError {
        if let Err(e) = self.send_error(reason.to_string(), "protocol-violation").await {
            debug!("Failed to report protocol violation: {}", e);
        }
        SessionError::ProtocolViolation(reason.to_string())
    }

    /// Report an undecodable event and produce the error that closes the session.
    async fn malformed(&mut self, error: ProtocolError) -> SessionError {
        if !matches!(error, ProtocolError::Io(_))
            && let Err(e) = self.send_error(error.to_string(), "protocol-violation").await
        {
            debug!("Failed to report malformed event: {}", e);
        }
        SessionError::Protocol(error)
    }

    async fn send_error(&mut self, text: String, code: &str) -> Result<(), SessionError> {
        warn!("❌ {}", text);
        self.send(ErrorMessage::new(text, code).to_event()?).await
    }

    async fn send(&mut self, event: Event) -> Result<(), SessionError> {
        self.writer.send(event).await?;
        Ok(())
    }
}
