use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{Instruction, ScheduledEvent};

/// Opaque token for one registration with a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduledHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Started,
    Paused,
}

/// Transport shared between a session and the audio callback driving it.
pub type SharedTransport = Arc<Mutex<Transport>>;

/// Real-time clock holding the pending instruction timeline.
///
/// The position only moves while started, and only through [`Transport::advance`],
/// which the audio callback calls with the duration of each rendered block.
/// Fired events are removed, so every handle fires at most once.
#[derive(Debug)]
pub struct Transport {
    state: TransportState,
    position: f64,
    next_handle: u64,
    /// Sorted by time, then by registration order
    pending: Vec<ScheduledEvent>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: TransportState::Stopped,
            position: 0.0,
            next_handle: 0,
            pending: Vec::new(),
        }
    }

    pub fn shared() -> SharedTransport {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn schedule(&mut self, instruction: Instruction, at: f64) -> ScheduledHandle {
        let handle = ScheduledHandle(self.next_handle);
        self.next_handle += 1;

        let idx = self.pending.partition_point(|e| e.at <= at);
        self.pending.insert(
            idx,
            ScheduledEvent {
                handle,
                at,
                instruction,
            },
        );
        handle
    }

    /// Registers many instructions with one sort instead of one insert each.
    /// Handles come back in input order.
    pub fn schedule_all(
        &mut self,
        instructions: impl IntoIterator<Item = (Instruction, f64)>,
    ) -> Vec<ScheduledHandle> {
        let first = self.pending.len();
        for (instruction, at) in instructions {
            let handle = ScheduledHandle(self.next_handle);
            self.next_handle += 1;
            self.pending.push(ScheduledEvent {
                handle,
                at,
                instruction,
            });
        }
        let handles = self.pending[first..].iter().map(|e| e.handle).collect();

        // Stable, so equal times keep registration order
        self.pending.sort_by(|a, b| a.at.total_cmp(&b.at));
        handles
    }

    /// Returns false if the handle already fired or was cancelled.
    pub fn cancel(&mut self, handle: ScheduledHandle) -> bool {
        match self.pending.iter().position(|e| e.handle == handle) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Removes every listed handle still pending in a single pass and returns
    /// how many were removed.
    pub fn cancel_all(&mut self, handles: &[ScheduledHandle]) -> usize {
        if handles.is_empty() {
            return 0;
        }
        let doomed: HashSet<ScheduledHandle> = handles.iter().copied().collect();
        let before = self.pending.len();
        self.pending.retain(|e| !doomed.contains(&e.handle));
        before - self.pending.len()
    }

    pub fn start(&mut self) {
        self.state = TransportState::Started;
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Started {
            self.state = TransportState::Paused;
        }
    }

    /// Stops and rewinds. Pending events are left in place.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.position = 0.0;
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Current position in transport seconds.
    pub fn now(&self) -> f64 {
        self.position
    }

    pub fn pending(&self) -> &[ScheduledEvent] {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn next_event_time(&self) -> Option<f64> {
        self.pending.first().map(|e| e.at)
    }

    pub fn advance(&mut self, seconds: f64) -> Vec<ScheduledEvent> {
        let mut fired = Vec::new();
        self.advance_into(seconds, &mut fired);
        fired
    }

    /// Moves the clock forward and appends every event now due to `fired`,
    /// in nondecreasing time order.
    pub fn advance_into(&mut self, seconds: f64, fired: &mut Vec<ScheduledEvent>) {
        if self.state != TransportState::Started {
            return;
        }
        self.position += seconds.max(0.0);

        let due = self.pending.partition_point(|e| e.at <= self.position);
        fired.extend(self.pending.drain(..due));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8) -> Instruction {
        Instruction::Note {
            pitch,
            velocity: 1.0,
            duration: 0.25,
        }
    }

    fn pitches(events: &[ScheduledEvent]) -> Vec<u8> {
        events
            .iter()
            .map(|e| match e.instruction {
                Instruction::Note { pitch, .. } => pitch,
            })
            .collect()
    }

    #[test]
    fn fires_in_time_order_at_most_once() {
        let mut transport = Transport::new();
        transport.schedule(note(64), 1.0);
        transport.schedule(note(60), 0.5);
        transport.schedule(note(62), 0.5);
        transport.start();

        assert!(transport.advance(0.4).is_empty());
        assert_eq!(pitches(&transport.advance(0.2)), vec![60, 62]);
        assert_eq!(pitches(&transport.advance(1.0)), vec![64]);
        assert!(transport.advance(10.0).is_empty());
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn paused_transport_holds_position_and_events() {
        let mut transport = Transport::new();
        transport.schedule(note(60), 1.0);
        transport.start();
        transport.advance(0.5);
        transport.pause();

        assert!(transport.advance(5.0).is_empty());
        assert_eq!(transport.now(), 0.5);
        assert_eq!(transport.pending_count(), 1);

        transport.start();
        assert_eq!(pitches(&transport.advance(0.5)), vec![60]);
    }

    #[test]
    fn stop_rewinds_without_clearing() {
        let mut transport = Transport::new();
        transport.schedule(note(60), 3.0);
        transport.start();
        transport.advance(1.0);
        transport.stop();

        assert_eq!(transport.now(), 0.0);
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.pending_count(), 1);
    }

    #[test]
    fn batch_schedule_merges_in_time_order() {
        let mut transport = Transport::new();
        transport.schedule(note(48), 0.75);
        let handles = transport.schedule_all([(note(60), 1.0), (note(62), 0.5), (note(64), 0.75)]);

        assert_eq!(handles.len(), 3);
        assert_eq!(transport.pending()[0].handle, handles[1]);
        assert_eq!(pitches(transport.pending()), vec![62, 48, 64, 60]);

        transport.start();
        assert_eq!(pitches(&transport.advance(0.8)), vec![62, 48, 64]);
    }

    #[test]
    fn cancel_all_skips_fired_and_unknown_handles() {
        let mut transport = Transport::new();
        let handles = transport.schedule_all((0..100).map(|i| (note(60), i as f64 * 0.1)));
        let keep = transport.schedule(note(72), 0.05);
        transport.start();
        transport.advance(0.45);

        assert_eq!(transport.cancel_all(&handles), 95);
        assert_eq!(transport.pending().len(), 0);
        assert!(!transport.cancel(keep));
        assert_eq!(transport.cancel_all(&handles), 0);
    }

    #[test]
    fn cancel_removes_only_that_handle() {
        let mut transport = Transport::new();
        let a = transport.schedule(note(60), 1.0);
        let b = transport.schedule(note(62), 1.0);

        assert!(transport.cancel(a));
        assert!(!transport.cancel(a));
        assert_eq!(transport.pending().len(), 1);
        assert_eq!(transport.pending()[0].handle, b);
    }
}
