use crate::timing::ScheduledHandle;

/// What the transport asks the voice pool to do when an event fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Note {
        pitch: u8,
        velocity: f32,
        /// Seconds between attack and release
        duration: f64,
    },
}

/// An instruction registered with the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub handle: ScheduledHandle,
    /// Transport seconds
    pub at: f64,
    pub instruction: Instruction,
}

/// Messages from the engine thread to the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceCommand {
    Trigger {
        pitch: u8,
        velocity: f32,
        /// Transport seconds
        when: f64,
        duration: f64,
    },
    ReleaseAll,
}
