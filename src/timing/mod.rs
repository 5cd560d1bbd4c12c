mod scheduler;
mod transport;

pub use scheduler::{DEFAULT_LEAD_IN, MIN_LEAD_IN, PlaybackScheduler};
pub use transport::{ScheduledHandle, SharedTransport, Transport, TransportState};
