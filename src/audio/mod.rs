mod cpal_backend;
mod instrument;
mod pool;
mod voice;

pub use cpal_backend::{CpalBackend, CpalVoicePool};
pub use instrument::{OscConfig, Patch, Wave};
pub use pool::{MAX_VOICES, PoolRenderer, Voices};
pub use voice::{Envelope, EnvelopeStage, Voice};

use crate::Result;
use crate::timing::SharedTransport;

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

/// A live set of synth voices following one transport.
///
/// `dispose` consumes the pool, so it runs exactly once and nothing can touch
/// the pool afterwards.
pub trait VoicePool {
    /// Attack at transport time `when`, release `duration` seconds later.
    ///
    /// For ad-hoc notes outside the transport's schedule. Scheduled document
    /// notes reach the voices directly from the transport inside the audio
    /// callback and never pass through here.
    fn trigger(&mut self, pitch: u8, velocity: f32, when: f64, duration: f64);

    fn release_all(&mut self);

    fn dispose(self: Box<Self>);
}

/// Produces voice pools. Each pool is driven by the transport it is given:
/// whatever the transport fires is attacked on that pool.
pub trait AudioBackend: Send + Sync {
    fn create_voice_pool(&self, transport: SharedTransport) -> Result<Box<dyn VoicePool>>;
}
