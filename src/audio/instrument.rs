use serde::{Deserialize, Serialize};

use super::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Wave {
    Sine,
    Square,
    Saw,
    Triangle,
}

impl Wave {
    /// One sample at `phase` in [0, 1).
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Wave::Sine => (phase * 2.0 * std::f32::consts::PI).sin(),
            Wave::Square => {
                if phase < 0.5 {
                    -1.0
                } else {
                    1.0
                }
            }
            Wave::Saw => phase * 2.0 - 1.0,
            Wave::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscConfig {
    pub wave: Wave,
    pub gain: f32,
    pub semitone: i8,
}

/// Synth voice settings shared by every voice in a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    pub oscillators: Vec<OscConfig>,
    pub envelope: Envelope,
    /// Master gain applied after mixing voices
    pub volume: f32,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            oscillators: vec![OscConfig {
                wave: Wave::Triangle,
                gain: 1.0,
                semitone: 0,
            }],
            envelope: Envelope::default(),
            volume: 0.25,
        }
    }
}
