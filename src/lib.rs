pub mod api;
pub mod audio;
pub mod config;
pub mod coordinator;
pub mod engine;
mod error;
pub mod events;
pub mod loader;
pub mod midi;
pub mod session;
pub mod timing;
pub mod ui;

pub use api::{MelodyApi, MelodyRef, ModelInfo};
pub use audio::{AudioBackend, CpalBackend, Patch, VoicePool};
pub use config::Settings;
pub use coordinator::{Coordinator, SessionId};
pub use engine::{Engine, EngineCommand, EngineEvent, EngineHandle, EngineUpdate, spawn_engine};
pub use error::{Error, ErrorKind, Result};
pub use loader::{DocumentLoader, Fetcher, UrlFetcher};
pub use midi::{Document, NoteEvent, Track};
pub use session::{LoadTicket, PlaybackSession, SessionState};
pub use timing::{PlaybackScheduler, ScheduledHandle, Transport};
pub use ui::{MelodeckApp, PianoRoll};
