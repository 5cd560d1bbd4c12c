#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use melodeck::timing::SharedTransport;
use melodeck::{AudioBackend, Error, Fetcher, Result, VoicePool};
use midly::num::{u4, u7, u15, u28};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};

/// Serves fixed bytes per URL; anything else is a 404.
#[derive(Default)]
pub struct StubFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl StubFetcher {
    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }
}

impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.files.get(url).cloned().ok_or_else(|| Error::Fetch {
            url: url.to_string(),
            reason: "HTTP 404 Not Found".to_string(),
        })
    }
}

#[derive(Default)]
pub struct PoolCounts {
    created: AtomicUsize,
    disposed: AtomicUsize,
}

impl PoolCounts {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.created() - self.disposed()
    }
}

/// Hands out pools that only count what happens to them.
#[derive(Default)]
pub struct RecordingBackend {
    pub counts: Arc<PoolCounts>,
}

struct RecordingPool(Arc<PoolCounts>);

impl VoicePool for RecordingPool {
    fn trigger(&mut self, _pitch: u8, _velocity: f32, _when: f64, _duration: f64) {}

    fn release_all(&mut self) {}

    fn dispose(self: Box<Self>) {
        self.0.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioBackend for RecordingBackend {
    fn create_voice_pool(&self, _transport: SharedTransport) -> Result<Box<dyn VoicePool>> {
        self.counts.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingPool(self.counts.clone())))
    }
}

fn note_event(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
    let message = if vel > 0 {
        MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(vel),
        }
    } else {
        MidiMessage::NoteOff {
            key: u7::new(key),
            vel: u7::new(0),
        }
    };
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        },
    }
}

/// A standard MIDI file at 480 ticks per quarter and the default 120 BPM.
/// Each note is `(pitch, start_tick, duration_ticks)` and must not overlap
/// the previous one.
pub fn midi_file(notes: &[(u8, u32, u32)]) -> Vec<u8> {
    let mut events = Vec::new();
    let mut cursor = 0;
    for &(pitch, start, length) in notes {
        events.push(note_event(start - cursor, pitch, 102));
        events.push(note_event(length, pitch, 0));
        cursor = start + length;
    }
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))),
        tracks: vec![events],
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    bytes
}

/// One middle C lasting a second.
pub fn single_note() -> Vec<u8> {
    midi_file(&[(60, 0, 960)])
}
