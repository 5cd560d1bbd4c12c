use crate::events::{Instruction, ScheduledEvent, VoiceCommand};
use crate::timing::SharedTransport;

use super::{Patch, Voice};

/// Upper bound on simultaneously sounding voices; the oldest is dropped beyond it.
pub const MAX_VOICES: usize = 32;

#[derive(Debug, Clone, Copy)]
struct QueuedNote {
    pitch: u8,
    velocity: f32,
    start: f64,
    duration: f64,
}

/// Polyphonic renderer with its own sample clock, one voice per sounding pitch.
pub struct Voices {
    patch: Patch,
    sample_rate: f32,
    /// Seconds rendered so far
    clock: f64,
    queued: Vec<QueuedNote>,
    active: Vec<Voice>,
}

impl Voices {
    pub fn new(patch: Patch, sample_rate: f32) -> Self {
        Self {
            patch,
            sample_rate,
            clock: 0.0,
            queued: Vec::new(),
            active: Vec::with_capacity(MAX_VOICES),
        }
    }

    pub fn now(&self) -> f64 {
        self.clock
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Attack `pitch` at pool time `when`, release `duration` seconds later.
    pub fn trigger(&mut self, pitch: u8, velocity: f32, when: f64, duration: f64) {
        self.queued.push(QueuedNote {
            pitch,
            velocity: velocity.clamp(0.0, 1.0),
            start: when.max(self.clock),
            duration: duration.max(0.0),
        });
    }

    /// Moves every sounding voice into its release stage and drops queued attacks.
    pub fn release_all(&mut self) {
        self.queued.clear();
        for voice in &mut self.active {
            voice.release();
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn is_silent(&self) -> bool {
        self.active.is_empty() && self.queued.is_empty()
    }

    /// Fills an interleaved buffer, writing the same signal to every channel.
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let dt = 1.0 / self.sample_rate as f64;

        for frame in output.chunks_mut(channels) {
            self.start_due_notes();

            let mut sample = 0.0;
            for voice in &mut self.active {
                if self.clock >= voice.release_at {
                    voice.release();
                }
                sample += voice.next_sample(&self.patch, self.sample_rate);
            }
            frame.fill(sample * self.patch.volume);

            self.active.retain(|v| !v.is_done());
            self.clock += dt;
        }
    }

    fn start_due_notes(&mut self) {
        let clock = self.clock;
        let mut idx = 0;
        while idx < self.queued.len() {
            if self.queued[idx].start > clock {
                idx += 1;
                continue;
            }
            let note = self.queued.swap_remove(idx);
            let release_at = clock + note.duration;

            match self.active.iter_mut().find(|v| v.pitch == note.pitch) {
                Some(voice) => voice.retrigger(note.velocity, release_at),
                None => {
                    if self.active.len() >= MAX_VOICES {
                        self.active.remove(0);
                    }
                    self.active.push(Voice::new(
                        note.pitch,
                        note.velocity,
                        release_at,
                        self.patch.oscillators.len(),
                    ));
                }
            }
        }
    }
}

/// Audio-thread side of a voice pool: pulls due events from the transport and
/// main-thread commands, then renders one block.
pub struct PoolRenderer {
    voices: Voices,
    transport: SharedTransport,
    commands: ringbuf::HeapCons<VoiceCommand>,
    fired: Vec<ScheduledEvent>,
    /// Time not yet applied to the transport because its lock was contended
    owed: f64,
    channels: usize,
}

impl PoolRenderer {
    pub fn new(
        voices: Voices,
        transport: SharedTransport,
        commands: ringbuf::HeapCons<VoiceCommand>,
        channels: usize,
    ) -> Self {
        Self {
            voices,
            transport,
            commands,
            fired: Vec::with_capacity(256),
            owed: 0.0,
            channels: channels.max(1),
        }
    }

    pub fn voices(&self) -> &Voices {
        &self.voices
    }

    pub fn render(&mut self, output: &mut [f32]) {
        use ringbuf::traits::Consumer;

        let frames = output.len() / self.channels;
        self.owed += frames as f64 / self.voices.sample_rate() as f64;

        // Transport position at the start of this block, if we got the lock
        let mut block_start = None;
        if let Some(mut transport) = self.transport.try_lock() {
            block_start = Some(transport.now());
            transport.advance_into(self.owed, &mut self.fired);
            self.owed = 0.0;
        }

        while let Some(command) = self.commands.try_pop() {
            match command {
                VoiceCommand::Trigger {
                    pitch,
                    velocity,
                    when,
                    duration,
                } => {
                    let offset = block_start.map_or(0.0, |start| (when - start).max(0.0));
                    let at = self.voices.now() + offset;
                    self.voices.trigger(pitch, velocity, at, duration);
                }
                VoiceCommand::ReleaseAll => self.voices.release_all(),
            }
        }

        let start = block_start.unwrap_or_default();
        for event in self.fired.drain(..) {
            let Instruction::Note {
                pitch,
                velocity,
                duration,
            } = event.instruction;
            let at = self.voices.now() + (event.at - start).max(0.0);
            self.voices.trigger(pitch, velocity, at, duration);
        }

        self.voices.render(output, self.channels);
    }
}
