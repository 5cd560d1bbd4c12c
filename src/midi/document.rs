use serde::Serialize;

/// Microseconds per quarter note when a file carries no tempo event (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEvent {
    /// Piano key number, 0-127
    pub pitch: u8,
    /// 0.0 -> 1.0
    pub velocity: f32,
    /// Seconds
    pub start_time: f64,
    /// Seconds
    pub duration: f64,
    pub start_tick: u64,
    pub duration_ticks: u64,
}

impl NoteEvent {
    pub fn end_tick(&self) -> u64 {
        self.start_tick + self.duration_ticks
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Scientific pitch name, e.g. `C4` for 60.
    pub fn name(&self) -> String {
        let octave = (self.pitch / 12) as i32 - 1;
        format!("{}{}", NOTE_NAMES[(self.pitch % 12) as usize], octave)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Track {
    pub name: Option<String>,
    pub notes: Vec<NoteEvent>,
}

impl Track {
    pub fn new(notes: Vec<NoteEvent>) -> Self {
        Self { name: None, notes }
    }

    pub fn named(name: impl Into<String>, notes: Vec<NoteEvent>) -> Self {
        Self {
            name: Some(name.into()),
            notes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempoChange {
    pub tick: u64,
    pub microseconds_per_beat: u32,
}

impl TempoChange {
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.microseconds_per_beat as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Timebase {
    /// Ticks per quarter note
    Metrical { ppq: u16 },
    /// SMPTE timing, fixed ticks per second regardless of tempo
    Timecode { ticks_per_second: f64 },
}

/// Converts tick positions to seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempoMap {
    timebase: Timebase,
    changes: Vec<TempoChange>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::metrical(480, Vec::new())
    }
}

impl TempoMap {
    pub fn metrical(ppq: u16, mut changes: Vec<TempoChange>) -> Self {
        changes.sort_by_key(|c| c.tick);
        Self {
            timebase: Timebase::Metrical { ppq },
            changes,
        }
    }

    pub fn timecode(ticks_per_second: f64) -> Self {
        Self {
            timebase: Timebase::Timecode { ticks_per_second },
            changes: Vec::new(),
        }
    }

    pub fn timebase(&self) -> Timebase {
        self.timebase
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    /// Tempo in force at `tick`, in microseconds per quarter note.
    pub fn tempo_at(&self, tick: u64) -> u32 {
        self.changes
            .iter()
            .rev()
            .find(|c| c.tick <= tick)
            .map(|c| c.microseconds_per_beat)
            .unwrap_or(DEFAULT_TEMPO)
    }

    pub fn ticks_per_second_at(&self, tick: u64) -> f64 {
        match self.timebase {
            Timebase::Metrical { ppq } => ppq as f64 * 1_000_000.0 / self.tempo_at(tick) as f64,
            Timebase::Timecode { ticks_per_second } => ticks_per_second,
        }
    }

    pub fn ticks_to_seconds(&self, tick: u64) -> f64 {
        let ppq = match self.timebase {
            Timebase::Timecode { ticks_per_second } => return tick as f64 / ticks_per_second,
            Timebase::Metrical { ppq } => ppq as f64,
        };

        let mut seconds = 0.0;
        let mut last_tick = 0u64;
        let mut tempo = DEFAULT_TEMPO;

        for change in &self.changes {
            if change.tick >= tick {
                break;
            }
            seconds += (change.tick - last_tick) as f64 * tempo as f64 / (ppq * 1_000_000.0);
            last_tick = change.tick;
            tempo = change.microseconds_per_beat;
        }

        seconds + (tick - last_tick) as f64 * tempo as f64 / (ppq * 1_000_000.0)
    }
}

/// A parsed note-event document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    tracks: Vec<Track>,
    duration_ticks: u64,
    tempo: TempoMap,
}

impl Document {
    pub fn new(tracks: Vec<Track>, tempo: TempoMap) -> Self {
        let duration_ticks = tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(NoteEvent::end_tick)
            .max()
            .unwrap_or(0);

        Self {
            tracks,
            duration_ticks,
            tempo,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// All notes, track by track, in document order.
    pub fn notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.tracks.iter().flat_map(|t| t.notes.iter())
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.note_count() == 0
    }

    pub fn duration_ticks(&self) -> u64 {
        self.duration_ticks
    }

    /// Seconds until the last note ends.
    pub fn duration(&self) -> f64 {
        self.notes().map(NoteEvent::end_time).fold(0.0, f64::max)
    }

    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn ticks_per_second(&self) -> f64 {
        self.tempo.ticks_per_second_at(0)
    }

    pub fn pitch_range(&self) -> Option<(u8, u8)> {
        let min = self.notes().map(|n| n.pitch).min()?;
        let max = self.notes().map(|n| n.pitch).max()?;
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, start_tick: u64, duration_ticks: u64) -> NoteEvent {
        NoteEvent {
            pitch,
            velocity: 0.8,
            start_time: start_tick as f64 / 960.0,
            duration: duration_ticks as f64 / 960.0,
            start_tick,
            duration_ticks,
        }
    }

    #[test]
    fn duration_covers_every_note_end() {
        let doc = Document::new(
            vec![
                Track::new(vec![note(60, 0, 480), note(62, 480, 960)]),
                Track::new(vec![note(48, 0, 1920)]),
            ],
            TempoMap::default(),
        );

        assert_eq!(doc.duration_ticks(), 1920);
        assert_eq!(doc.note_count(), 3);
        assert_eq!(doc.pitch_range(), Some((48, 62)));
        for n in doc.notes() {
            assert!(doc.duration_ticks() >= n.end_tick());
        }
    }

    #[test]
    fn empty_document_has_zero_duration() {
        let doc = Document::new(vec![Track::default()], TempoMap::default());
        assert_eq!(doc.duration_ticks(), 0);
        assert_eq!(doc.duration(), 0.0);
        assert!(doc.is_empty());
        assert_eq!(doc.pitch_range(), None);
    }

    #[test]
    fn ticks_to_seconds_follows_tempo_changes() {
        let map = TempoMap::metrical(
            480,
            vec![TempoChange {
                tick: 960,
                microseconds_per_beat: 250_000,
            }],
        );

        assert_eq!(map.ticks_to_seconds(480), 0.5);
        assert_eq!(map.ticks_to_seconds(960), 1.0);
        assert_eq!(map.ticks_to_seconds(1440), 1.25);
        assert_eq!(map.ticks_per_second_at(0), 960.0);
        assert_eq!(map.ticks_per_second_at(960), 1920.0);
    }

    #[test]
    fn timecode_ignores_tempo() {
        let map = TempoMap::timecode(1000.0);
        assert_eq!(map.ticks_to_seconds(2500), 2.5);
        assert_eq!(map.ticks_per_second_at(0), 1000.0);
    }

    #[test]
    fn note_names() {
        assert_eq!(note(60, 0, 1).name(), "C4");
        assert_eq!(note(69, 0, 1).name(), "A4");
        assert_eq!(note(21, 0, 1).name(), "A0");
        assert_eq!(note(61, 0, 1).name(), "C#4");
    }
}
