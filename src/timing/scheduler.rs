use std::collections::HashMap;

use tracing::debug;

use super::{ScheduledHandle, Transport};
use crate::events::Instruction;
use crate::midi::Document;
use crate::{Error, Result};

/// Smallest delay allowed before the first note, in seconds.
pub const MIN_LEAD_IN: f64 = 0.3;
pub const DEFAULT_LEAD_IN: f64 = 0.5;

/// Registers a whole document with a transport up front and remembers the
/// handles per source URL so they can be cancelled together.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    handles: HashMap<String, Vec<ScheduledHandle>>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one note instruction per `NoteEvent` at `t0 + note.start_time`.
    ///
    /// Fails without registering anything if `key` still holds handles from an
    /// earlier call that was never cancelled.
    pub fn schedule(
        &mut self,
        key: &str,
        document: &Document,
        t0: f64,
        transport: &mut Transport,
    ) -> Result<&[ScheduledHandle]> {
        if self.handles.get(key).is_some_and(|h| !h.is_empty()) {
            return Err(Error::SchedulingConflict(key.to_string()));
        }

        let handles = transport.schedule_all(document.notes().map(|note| {
            let instruction = Instruction::Note {
                pitch: note.pitch,
                velocity: note.velocity,
                duration: note.duration,
            };
            (instruction, t0 + note.start_time)
        }));

        debug!(key, notes = handles.len(), t0, "scheduled document");

        let slot = self.handles.entry(key.to_string()).or_default();
        *slot = handles;
        Ok(slot.as_slice())
    }

    /// Cancels every registration made for `key`. Safe to call repeatedly.
    pub fn cancel_all(&mut self, key: &str, transport: &mut Transport) -> usize {
        let Some(handles) = self.handles.remove(key) else {
            return 0;
        };

        let cancelled = transport.cancel_all(&handles);
        debug!(key, cancelled, "cancelled scheduled notes");
        cancelled
    }

    pub fn handles(&self, key: &str) -> &[ScheduledHandle] {
        self.handles.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.handles.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{NoteEvent, TempoMap, Track};

    fn note(pitch: u8, start_time: f64) -> NoteEvent {
        NoteEvent {
            pitch,
            velocity: 0.8,
            start_time,
            duration: 0.5,
            start_tick: (start_time * 960.0) as u64,
            duration_ticks: 480,
        }
    }

    fn document() -> Document {
        Document::new(
            vec![
                Track::new(vec![note(60, 0.0), note(62, 0.5)]),
                Track::new(vec![note(48, 0.0)]),
            ],
            TempoMap::default(),
        )
    }

    #[test]
    fn one_handle_per_note_offset_by_t0() {
        let mut transport = Transport::new();
        let mut scheduler = PlaybackScheduler::new();

        let count = scheduler
            .schedule("a.mid", &document(), 0.5, &mut transport)
            .unwrap()
            .len();

        assert_eq!(count, 3);
        let times: Vec<f64> = transport.pending().iter().map(|e| e.at).collect();
        assert_eq!(times, vec![0.5, 0.5, 1.0]);
    }

    #[test]
    fn rescheduling_without_cancel_conflicts() {
        let mut transport = Transport::new();
        let mut scheduler = PlaybackScheduler::new();
        scheduler
            .schedule("a.mid", &document(), 0.5, &mut transport)
            .unwrap();

        let err = scheduler
            .schedule("a.mid", &document(), 0.5, &mut transport)
            .unwrap_err();
        assert!(matches!(err, Error::SchedulingConflict(_)));
        assert_eq!(transport.pending_count(), 3);
    }

    #[test]
    fn cancel_all_is_idempotent() {
        let mut transport = Transport::new();
        let mut scheduler = PlaybackScheduler::new();
        scheduler
            .schedule("a.mid", &document(), 0.5, &mut transport)
            .unwrap();

        assert_eq!(scheduler.cancel_all("a.mid", &mut transport), 3);
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(scheduler.cancel_all("a.mid", &mut transport), 0);
        assert_eq!(transport.pending_count(), 0);
        assert!(scheduler.is_empty());
        assert!(scheduler.handles("a.mid").is_empty());
    }

    #[test]
    fn cancel_after_partial_playback_skips_fired_handles() {
        let mut transport = Transport::new();
        let mut scheduler = PlaybackScheduler::new();
        scheduler
            .schedule("a.mid", &document(), 0.5, &mut transport)
            .unwrap();

        transport.start();
        assert_eq!(transport.advance(0.6).len(), 2);
        assert_eq!(scheduler.cancel_all("a.mid", &mut transport), 1);
        assert_eq!(transport.pending_count(), 0);
    }
}
