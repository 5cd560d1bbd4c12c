use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        let raw = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Holds the one session allowed to be audible. Zero means none.
#[derive(Debug, Default)]
pub struct Coordinator {
    active: AtomicU64,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` active and returns whoever held the slot before.
    /// The caller stops that session.
    pub fn request_active(&self, id: SessionId) -> Option<SessionId> {
        SessionId::from_raw(self.active.swap(id.get(), Ordering::AcqRel))
    }

    /// Clears the slot only if `id` still holds it.
    pub fn release(&self, id: SessionId) -> bool {
        self.active
            .compare_exchange(id.get(), 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn active(&self) -> Option<SessionId> {
        SessionId::from_raw(self.active.load(Ordering::Acquire))
    }

    pub fn is_active(&self, id: SessionId) -> bool {
        self.active() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_returns_previous_holder() {
        let slot = Coordinator::new();
        let a = SessionId::next();
        let b = SessionId::next();

        assert_eq!(slot.request_active(a), None);
        assert_eq!(slot.request_active(b), Some(a));
        assert_eq!(slot.active(), Some(b));
    }

    #[test]
    fn stale_release_keeps_newer_holder() {
        let slot = Coordinator::new();
        let a = SessionId::next();
        let b = SessionId::next();
        slot.request_active(a);
        slot.request_active(b);

        assert!(!slot.release(a));
        assert_eq!(slot.active(), Some(b));
        assert!(slot.release(b));
        assert_eq!(slot.active(), None);
    }

    #[test]
    fn ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert_eq!(SessionId::from_raw(0), None);
    }
}
