//! Standard MIDI File decoding into a [`Document`].
//!
//! Tempo events from every track form one tempo map; notes are paired per
//! track by (channel, pitch) in first-on/first-off order.

use std::collections::{HashMap, VecDeque};

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use tracing::debug;

use super::{Document, NoteEvent, TempoChange, TempoMap, Track};
use crate::{Error, Result};

struct OpenNote {
    pitch: u8,
    velocity: u8,
    start_tick: u64,
    end_tick: Option<u64>,
}

pub fn parse(bytes: &[u8]) -> Result<Document> {
    let smf = Smf::parse(bytes)?;

    if smf.tracks.is_empty() {
        return Err(Error::Parse("document contains no tracks".into()));
    }

    let tempo = match smf.header.timing {
        Timing::Metrical(ppq) if ppq.as_int() == 0 => {
            return Err(Error::Parse("header declares zero ticks per quarter note".into()));
        }
        Timing::Metrical(ppq) => TempoMap::metrical(ppq.as_int(), collect_tempo_changes(&smf)),
        Timing::Timecode(_, 0) => {
            return Err(Error::Parse("header declares zero ticks per frame".into()));
        }
        Timing::Timecode(fps, ticks_per_frame) => {
            TempoMap::timecode(fps.as_f32() as f64 * ticks_per_frame as f64)
        }
    };

    let tracks: Vec<Track> = smf
        .tracks
        .iter()
        .map(|events| decode_track(events, &tempo))
        .collect();

    let document = Document::new(tracks, tempo);
    debug!(
        tracks = document.tracks().len(),
        notes = document.note_count(),
        duration_ticks = document.duration_ticks(),
        "parsed MIDI document"
    );

    Ok(document)
}

fn collect_tempo_changes(smf: &Smf) -> Vec<TempoChange> {
    let mut changes = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                changes.push(TempoChange {
                    tick,
                    microseconds_per_beat: tempo.as_int(),
                });
            }
        }
    }
    changes
}

fn decode_track(events: &[TrackEvent], tempo: &TempoMap) -> Track {
    let mut name = None;
    let mut open: Vec<OpenNote> = Vec::new();
    let mut pending: HashMap<(u8, u8), VecDeque<usize>> = HashMap::new();
    let mut tick = 0u64;

    for event in events {
        tick += event.delta.as_int() as u64;

        match event.kind {
            TrackEventKind::Meta(MetaMessage::TrackName(raw)) if name.is_none() => {
                name = Some(String::from_utf8_lossy(raw).into_owned());
            }
            TrackEventKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        pending
                            .entry((channel, key.as_int()))
                            .or_default()
                            .push_back(open.len());
                        open.push(OpenNote {
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                            start_tick: tick,
                            end_tick: None,
                        });
                    }
                    // Note On with velocity 0 is Note Off
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        if let Some(idx) = pending
                            .get_mut(&(channel, key.as_int()))
                            .and_then(VecDeque::pop_front)
                        {
                            open[idx].end_tick = Some(tick);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    let track_end = tick;
    let notes = open
        .into_iter()
        .map(|note| {
            let end_tick = note.end_tick.unwrap_or(track_end);
            let start_time = tempo.ticks_to_seconds(note.start_tick);
            NoteEvent {
                pitch: note.pitch,
                velocity: note.velocity as f32 / 127.0,
                start_time,
                duration: tempo.ticks_to_seconds(end_tick) - start_time,
                start_tick: note.start_tick,
                duration_ticks: end_tick - note.start_tick,
            }
        })
        .collect();

    Track { name, notes }
}
