use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::api::{MelodyApi, MelodyRef, ModelInfo};
use crate::audio::{AudioBackend, CpalBackend};
use crate::config::Settings;
use crate::coordinator::{Coordinator, SessionId};
use crate::loader::{DocumentLoader, Fetcher, UrlFetcher};
use crate::midi::Document;
use crate::session::{LoadTicket, PlaybackSession, SessionState};
use crate::ui::PianoRoll;
use crate::{Error, Result};

/// How often playing sessions are checked for having run out of notes.
const FINISH_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub enum EngineCommand {
    AddMelody { name: String, url: String },
    Load { session: SessionId, url: String },
    TogglePlayback(SessionId),
    Play(SessionId),
    Pause(SessionId),
    Stop(SessionId),
    Remove(SessionId),
    ListModels,
    Generate { model_id: String },
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    MelodyAdded {
        session: SessionId,
        name: String,
        url: String,
    },
    SessionState {
        session: SessionId,
        state: SessionState,
        /// Seconds, once a document is loaded
        duration: Option<f64>,
    },
    Visualization {
        session: SessionId,
        image: image::RgbaImage,
    },
    Removed(SessionId),
    Models(Vec<ModelInfo>),
    Generating(bool),
    Error {
        message: String,
    },
}

/// Results of work the engine spawned, delivered back onto its loop.
#[derive(Debug)]
pub enum EngineEvent {
    Loaded {
        ticket: LoadTicket,
        result: Result<Document>,
    },
    Models(Result<Vec<ModelInfo>>),
    Generated(Result<MelodyRef>),
}

pub struct EngineHandle {
    pub command_tx: UnboundedSender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("engine is no longer running");
        }
    }
}

/// Starts the engine thread with the default output device and URL fetcher.
pub fn spawn_engine(settings: Settings) -> Result<EngineHandle> {
    let fetcher = UrlFetcher::new(settings.fetch_timeout())?;
    let backend: Arc<dyn AudioBackend> = Arc::new(CpalBackend::new(settings.synth.clone()));
    let api = MelodyApi::new(settings.api_url.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to create engine runtime: {}", e)))?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    std::thread::Builder::new()
        .name("melodeck-engine".into())
        .spawn(move || {
            runtime.block_on(async move {
                let (engine, events) =
                    Engine::new(&settings, backend, DocumentLoader::new(fetcher), api, update_tx);
                engine.run(command_rx, events).await;
            });
            info!("engine stopped");
        })
        .map_err(|e| Error::Config(format!("failed to spawn engine thread: {}", e)))?;

    Ok(EngineHandle {
        command_tx,
        update_rx,
    })
}

/// Owns every session and the single audible slot. All session state is
/// mutated here, on one thread.
pub struct Engine<F> {
    sessions: Vec<PlaybackSession>,
    coordinator: Coordinator,
    backend: Arc<dyn AudioBackend>,
    loader: Arc<DocumentLoader<F>>,
    api: MelodyApi,
    roll: PianoRoll,
    lead_in: f64,
    release_tail: f64,
    updates: Sender<EngineUpdate>,
    events: UnboundedSender<EngineEvent>,
}

impl<F: Fetcher> Engine<F> {
    pub fn new(
        settings: &Settings,
        backend: Arc<dyn AudioBackend>,
        loader: DocumentLoader<F>,
        api: MelodyApi,
        updates: Sender<EngineUpdate>,
    ) -> (Self, UnboundedReceiver<EngineEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let engine = Self {
            sessions: Vec::new(),
            coordinator: Coordinator::new(),
            backend,
            loader: Arc::new(loader),
            api,
            roll: settings.roll.clone(),
            lead_in: settings.lead_in(),
            release_tail: settings.synth.envelope.release as f64,
            updates,
            events,
        };
        (engine, events_rx)
    }

    pub async fn run(
        mut self,
        mut commands: UnboundedReceiver<EngineCommand>,
        mut events: UnboundedReceiver<EngineEvent>,
    ) {
        let mut poll = tokio::time::interval(FINISH_POLL);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = poll.tick() => self.poll_finished(),
            }
        }

        info!(sessions = self.sessions.len(), "engine shutting down");
    }

    pub fn sessions(&self) -> &[PlaybackSession] {
        &self.sessions
    }

    pub fn session(&self, id: SessionId) -> Option<&PlaybackSession> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Returns false once the engine should stop.
    pub fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "engine command");
        match command {
            EngineCommand::AddMelody { name, url } => {
                self.add_melody(name, url);
            }
            EngineCommand::Load { session, url } => self.load(session, url),
            EngineCommand::TogglePlayback(id) => {
                let playing = self
                    .session(id)
                    .is_some_and(|s| *s.state() == SessionState::Playing);
                if playing {
                    self.pause(id);
                } else {
                    self.play(id);
                }
            }
            EngineCommand::Play(id) => self.play(id),
            EngineCommand::Pause(id) => self.pause(id),
            EngineCommand::Stop(id) => self.stop(id),
            EngineCommand::Remove(id) => self.remove(id),
            EngineCommand::ListModels => {
                let api = self.api.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let _ = events.send(EngineEvent::Models(api.models().await));
                });
            }
            EngineCommand::Generate { model_id } => {
                self.publish(EngineUpdate::Generating(true));
                let api = self.api.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let _ = events.send(EngineEvent::Generated(api.generate(&model_id).await));
                });
            }
            EngineCommand::Shutdown => return false,
        }
        true
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Loaded { ticket, result } => {
                let id = ticket.session();
                let Some(session) = self.session_mut(id) else {
                    debug!(session = %id, "load finished for removed session");
                    return;
                };
                if session.finish_load(ticket, result) {
                    self.publish_state(id);
                    self.publish_visualization(id);
                }
            }
            EngineEvent::Models(Ok(models)) => {
                info!(count = models.len(), "models listed");
                self.publish(EngineUpdate::Models(models));
            }
            EngineEvent::Generated(Ok(melody)) => {
                self.publish(EngineUpdate::Generating(false));
                self.add_melody(melody.name, melody.url);
            }
            EngineEvent::Models(Err(e)) => {
                error!("failed to list models: {}", e);
                self.publish_error(&e);
            }
            EngineEvent::Generated(Err(e)) => {
                error!("failed to generate melody: {}", e);
                self.publish(EngineUpdate::Generating(false));
                self.publish_error(&e);
            }
        }
    }

    /// Creates a session for `url` and starts loading it.
    pub fn add_melody(&mut self, name: String, url: String) -> SessionId {
        let session = PlaybackSession::new(self.backend.clone())
            .with_lead_in(self.lead_in)
            .with_release_tail(self.release_tail);
        let id = session.id();
        self.sessions.push(session);

        info!(session = %id, name, url, "melody added");
        self.publish(EngineUpdate::MelodyAdded {
            session: id,
            name,
            url: url.clone(),
        });
        self.load(id, url);
        id
    }

    fn load(&mut self, id: SessionId, url: String) {
        let Some(session) = self.session_mut(id) else {
            return;
        };
        let ticket = session.begin_load(url.clone());
        self.coordinator.release(id);
        self.publish_state(id);

        let loader = self.loader.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = loader.load(&url).await;
            let _ = events.send(EngineEvent::Loaded { ticket, result });
        });
    }

    fn play(&mut self, id: SessionId) {
        let can_play = self.session(id).is_some_and(|s| s.state().can_play());
        if !can_play {
            return;
        }

        if let Some(previous) = self.coordinator.request_active(id).filter(|p| *p != id) {
            if let Some(other) = self.session_mut(previous) {
                info!(session = %previous, by = %id, "stopping previously active session");
                other.stop();
                self.publish_state(previous);
            }
        }

        let Some(session) = self.session_mut(id) else {
            return;
        };
        session.play();
        if *session.state() != SessionState::Playing {
            self.coordinator.release(id);
        }
        self.publish_state(id);
    }

    fn pause(&mut self, id: SessionId) {
        if let Some(session) = self.session_mut(id) {
            session.pause();
            self.publish_state(id);
        }
    }

    fn stop(&mut self, id: SessionId) {
        if let Some(session) = self.session_mut(id) {
            session.stop();
            self.coordinator.release(id);
            self.publish_state(id);
        }
    }

    fn remove(&mut self, id: SessionId) {
        let Some(idx) = self.sessions.iter().position(|s| s.id() == id) else {
            return;
        };
        drop(self.sessions.remove(idx));
        self.coordinator.release(id);
        info!(session = %id, "melody removed");
        self.publish(EngineUpdate::Removed(id));
    }

    pub fn poll_finished(&mut self) {
        let finished: Vec<SessionId> = self
            .sessions
            .iter_mut()
            .filter_map(|s| s.poll_finished().then(|| s.id()))
            .collect();

        for id in finished {
            self.coordinator.release(id);
            self.publish_state(id);
        }
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut PlaybackSession> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    fn publish_state(&self, id: SessionId) {
        if let Some(session) = self.session(id) {
            self.publish(EngineUpdate::SessionState {
                session: id,
                state: session.state().clone(),
                duration: session.document().map(Document::duration),
            });
        }
    }

    fn publish_visualization(&self, id: SessionId) {
        if let Some(document) = self.session(id).and_then(PlaybackSession::document) {
            self.publish(EngineUpdate::Visualization {
                session: id,
                image: self.roll.render_image(document),
            });
        }
    }

    fn publish_error(&self, e: &Error) {
        self.publish(EngineUpdate::Error {
            message: e.user_message(),
        });
    }

    fn publish(&self, update: EngineUpdate) {
        let _ = self.updates.send(update);
    }
}
