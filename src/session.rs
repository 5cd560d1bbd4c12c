//! One player: a loaded document, its transport and the voice pool playing it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, VoicePool};
use crate::coordinator::SessionId;
use crate::loader::{DocumentLoader, Fetcher};
use crate::midi::Document;
use crate::timing::{DEFAULT_LEAD_IN, MIN_LEAD_IN, PlaybackScheduler, SharedTransport, Transport};
use crate::{Error, ErrorKind, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Error { kind: ErrorKind, message: String },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Error { .. } => "error",
        }
    }

    /// Whether `play` would do anything in this state.
    pub fn can_play(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error { message, .. } => write!(f, "error: {}", message),
            other => f.write_str(other.label()),
        }
    }
}

/// Identifies one `load` call. A result is only accepted while its ticket is
/// still the session's latest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    session: SessionId,
    url: String,
}

impl LoadTicket {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub struct PlaybackSession {
    id: SessionId,
    url: Option<String>,
    state: SessionState,
    document: Option<Document>,
    transport: SharedTransport,
    scheduler: PlaybackScheduler,
    pool: Option<Box<dyn VoicePool>>,
    backend: Arc<dyn AudioBackend>,
    lead_in: f64,
    /// Seconds of sound after the last note ends
    release_tail: f64,
    /// Transport time after which playback counts as finished
    finish_at: Option<f64>,
}

impl PlaybackSession {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            id: SessionId::next(),
            url: None,
            state: SessionState::Idle,
            document: None,
            transport: Transport::shared(),
            scheduler: PlaybackScheduler::new(),
            pool: None,
            backend,
            lead_in: DEFAULT_LEAD_IN,
            release_tail: 0.0,
            finish_at: None,
        }
    }

    /// Delay between `play` and the first note; never below [`MIN_LEAD_IN`].
    pub fn with_lead_in(mut self, seconds: f64) -> Self {
        self.lead_in = seconds.max(MIN_LEAD_IN);
        self
    }

    pub fn with_release_tail(mut self, seconds: f64) -> Self {
        self.release_tail = seconds.max(0.0);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub fn lead_in(&self) -> f64 {
        self.lead_in
    }

    pub fn has_voice_pool(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pending_events(&self) -> usize {
        self.transport.lock().pending_count()
    }

    /// Cleans up whatever is playing and enters `Loading` for `url`.
    pub fn begin_load(&mut self, url: impl Into<String>) -> LoadTicket {
        let url = url.into();
        self.cleanup();
        self.document = None;
        self.url = Some(url.clone());
        self.set_state(SessionState::Loading);

        LoadTicket {
            session: self.id,
            url,
        }
    }

    /// Applies the outcome of a load. Returns false, leaving the session
    /// untouched, if a newer `begin_load` has superseded `ticket`.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<Document>) -> bool {
        let current = ticket.session == self.id
            && self.state == SessionState::Loading
            && self.url.as_deref() == Some(ticket.url.as_str());
        if !current {
            info!(session = %self.id, url = ticket.url, "discarding stale load result");
            return false;
        }

        match result {
            Ok(document) => {
                self.document = Some(document);
                self.set_state(SessionState::Ready);
            }
            Err(e) => {
                warn!(session = %self.id, url = ticket.url, "load failed: {}", e);
                self.fail(&e);
            }
        }
        true
    }

    /// Fetches and decodes `url` in place. Callers that must keep handling
    /// other work while the fetch runs use `begin_load`/`finish_load` instead.
    pub async fn load<F: Fetcher>(&mut self, loader: &DocumentLoader<F>, url: &str) {
        let ticket = self.begin_load(url);
        let result = loader.load(url).await;
        self.finish_load(ticket, result);
    }

    /// Starts from `Ready` or resumes from `Paused`; ignored in any other state.
    pub fn play(&mut self) {
        match self.state {
            SessionState::Ready => self.start(),
            SessionState::Paused => self.resume(),
            _ => debug!(session = %self.id, state = self.state.label(), "play ignored"),
        }
    }

    fn start(&mut self) {
        if self.pool.is_none() {
            match self.backend.create_voice_pool(self.transport.clone()) {
                Ok(pool) => {
                    self.pool = Some(pool);
                    if let Err(e) = self.schedule_document() {
                        warn!(session = %self.id, "scheduling failed: {}", e);
                        self.cleanup();
                        self.fail(&e);
                        return;
                    }
                }
                Err(e) => {
                    warn!(session = %self.id, "could not create voice pool: {}", e);
                    self.fail(&e);
                    return;
                }
            }
        }

        self.transport.lock().start();
        self.set_state(SessionState::Playing);
    }

    fn schedule_document(&mut self) -> Result<()> {
        let (Some(document), Some(url)) = (self.document.as_ref(), self.url.as_deref()) else {
            return Err(Error::SchedulingConflict("no document loaded".to_string()));
        };

        let mut transport = self.transport.lock();
        let t0 = transport.now() + self.lead_in;
        let handles = self.scheduler.schedule(url, document, t0, &mut transport)?;
        info!(session = %self.id, notes = handles.len(), t0, "playback scheduled");

        self.finish_at = Some(t0 + document.duration() + self.release_tail);
        Ok(())
    }

    /// Pauses the transport. Scheduled notes stay registered.
    pub fn pause(&mut self) {
        if self.state != SessionState::Playing {
            return;
        }
        self.transport.lock().pause();
        if let Some(pool) = self.pool.as_mut() {
            pool.release_all();
        }
        self.set_state(SessionState::Paused);
    }

    pub fn resume(&mut self) {
        if self.state != SessionState::Paused {
            return;
        }
        self.transport.lock().start();
        self.set_state(SessionState::Playing);
    }

    /// Play/Pause button semantics.
    pub fn toggle(&mut self) {
        if self.state == SessionState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Full cleanup, then back to `Ready` so the document can be replayed.
    pub fn stop(&mut self) {
        self.cleanup();
        if matches!(self.state, SessionState::Playing | SessionState::Paused) {
            self.set_state(SessionState::Ready);
        }
    }

    /// Cancels every scheduled note, rewinds the transport and disposes the
    /// voice pool. Does not change the state.
    pub fn cleanup(&mut self) {
        let cancelled = match self.url.as_deref() {
            Some(url) => {
                let mut transport = self.transport.lock();
                let cancelled = self.scheduler.cancel_all(url, &mut transport);
                transport.stop();
                cancelled
            }
            None => 0,
        };
        self.finish_at = None;

        if let Some(pool) = self.pool.take() {
            pool.dispose();
            debug!(session = %self.id, cancelled, "session cleaned up");
        }
    }

    /// Returns to `Ready` once every note has fired and faded out.
    /// True if this call ended playback.
    pub fn poll_finished(&mut self) -> bool {
        if self.state != SessionState::Playing {
            return false;
        }
        let done = {
            let transport = self.transport.lock();
            transport.pending_count() == 0
                && self.finish_at.is_some_and(|end| transport.now() >= end)
        };
        if done {
            info!(session = %self.id, "playback finished");
            self.stop();
        }
        done
    }

    fn fail(&mut self, error: &Error) {
        self.set_state(SessionState::Error {
            kind: error.kind(),
            message: error.user_message(),
        });
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(
                session = %self.id,
                from = self.state.label(),
                to = state.label(),
                "session state"
            );
            self.state = state;
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("has_voice_pool", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}
