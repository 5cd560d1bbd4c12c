mod document;
mod parse;

pub use document::{DEFAULT_TEMPO, Document, NoteEvent, TempoChange, TempoMap, Timebase, Track};
pub use parse::parse;
