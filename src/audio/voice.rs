use serde::{Deserialize, Serialize};

use super::{Patch, midi_to_freq};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 0.1,
            sustain: 0.3,
            release: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeStage {
    Attack { time: f32 },
    Decay { time: f32 },
    Sustain,
    Release { time: f32, from: f32 },
    Done,
}

/// One sounding pitch.
#[derive(Debug, Clone)]
pub struct Voice {
    pub pitch: u8,
    pub velocity: f32,
    pub stage: EnvelopeStage,
    pub level: f32,
    /// Pool-clock seconds at which the release stage begins
    pub release_at: f64,
    phases: Vec<f32>,
}

impl Voice {
    pub fn new(pitch: u8, velocity: f32, release_at: f64, num_oscillators: usize) -> Self {
        Self {
            pitch,
            velocity,
            stage: EnvelopeStage::Attack { time: 0.0 },
            level: 0.0,
            release_at,
            phases: vec![0.0; num_oscillators],
        }
    }

    /// Restarts the envelope for a repeated attack on the same pitch.
    pub fn retrigger(&mut self, velocity: f32, release_at: f64) {
        self.velocity = velocity;
        self.release_at = release_at;
        self.stage = EnvelopeStage::Attack { time: 0.0 };
    }

    pub fn release(&mut self) {
        if !matches!(
            self.stage,
            EnvelopeStage::Release { .. } | EnvelopeStage::Done
        ) {
            self.stage = EnvelopeStage::Release {
                time: 0.0,
                from: self.level,
            };
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == EnvelopeStage::Done
    }

    pub fn is_releasing(&self) -> bool {
        matches!(self.stage, EnvelopeStage::Release { .. })
    }

    /// Renders one sample and advances oscillators and envelope by `dt` seconds.
    pub fn next_sample(&mut self, patch: &Patch, sample_rate: f32) -> f32 {
        let dt = 1.0 / sample_rate;
        let mut out = 0.0;

        for (osc, phase) in patch.oscillators.iter().zip(self.phases.iter_mut()) {
            let freq = midi_to_freq((self.pitch as i16 + osc.semitone as i16).clamp(0, 127) as u8);
            out += osc.wave.sample(*phase) * osc.gain;

            *phase += freq / sample_rate;
            if *phase >= 1.0 {
                *phase -= 1.0;
            }
        }

        let sample = out * self.level * self.velocity;
        self.advance_envelope(&patch.envelope, dt);
        sample
    }

    fn advance_envelope(&mut self, env: &Envelope, dt: f32) {
        match &mut self.stage {
            EnvelopeStage::Attack { time } => {
                *time += dt;
                if *time >= env.attack {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay { time: 0.0 };
                } else {
                    self.level = *time / env.attack;
                }
            }
            EnvelopeStage::Decay { time } => {
                *time += dt;
                if *time >= env.decay {
                    self.level = env.sustain;
                    self.stage = EnvelopeStage::Sustain;
                } else {
                    self.level = 1.0 - (1.0 - env.sustain) * (*time / env.decay);
                }
            }
            EnvelopeStage::Sustain => {
                self.level = env.sustain;
            }
            EnvelopeStage::Release { time, from } => {
                *time += dt;
                if *time >= env.release {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Done;
                } else {
                    self.level = *from * (1.0 - *time / env.release);
                }
            }
            EnvelopeStage::Done => {
                self.level = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_runs_to_completion_after_release() {
        let patch = Patch {
            envelope: Envelope {
                attack: 0.01,
                decay: 0.01,
                sustain: 0.5,
                release: 0.01,
            },
            ..Patch::default()
        };
        let mut voice = Voice::new(69, 1.0, 0.0, patch.oscillators.len());

        for _ in 0..100 {
            voice.next_sample(&patch, 1000.0);
        }
        assert_eq!(voice.stage, EnvelopeStage::Sustain);
        assert_eq!(voice.level, 0.5);

        voice.release();
        assert!(voice.is_releasing());
        for _ in 0..20 {
            voice.next_sample(&patch, 1000.0);
        }
        assert!(voice.is_done());
        assert_eq!(voice.level, 0.0);
    }
}
