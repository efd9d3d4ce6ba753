use std::collections::BTreeMap;

use crate::midi::MidiMessage;

/// A message waiting for its target tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEntry {
    pub target_tick: u64,
    pub seq: u64,
    pub message: MidiMessage,
}

/// Pending messages ordered by target tick, then by insertion order.
#[derive(Debug, Default)]
pub struct EventQueue {
    entries: BTreeMap<(u64, u64), MidiMessage>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target_tick: u64, message: MidiMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((target_tick, seq), message);
    }

    /// Removes and returns every entry with `target_tick <= tick`, in
    /// emission order.
    pub fn drain_due(&mut self, tick: u64) -> Vec<ScheduledEntry> {
        let due = match tick.checked_add(1) {
            Some(bound) => {
                let later = self.entries.split_off(&(bound, 0));
                std::mem::replace(&mut self.entries, later)
            }
            None => std::mem::take(&mut self.entries),
        };
        due.into_iter()
            .map(|((target_tick, seq), message)| ScheduledEntry {
                target_tick,
                seq,
                message,
            })
            .collect()
    }

    /// Target tick of the earliest pending entry.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.keys().next().map(|&(tick, _)| tick)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all pending entries, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::Channel;

    fn cc(value: u8) -> MidiMessage {
        MidiMessage::control_change(Channel::default(), 1, value)
    }

    fn values(entries: &[ScheduledEntry]) -> Vec<u8> {
        entries.iter().map(|e| e.message.as_bytes()[2]).collect()
    }

    #[test]
    fn drains_in_tick_then_insertion_order() {
        let mut queue = EventQueue::new();
        queue.push(3, cc(0));
        queue.push(1, cc(1));
        queue.push(3, cc(2));
        queue.push(2, cc(3));
        queue.push(1, cc(4));

        assert_eq!(queue.next_due(), Some(1));
        let due = queue.drain_due(3);
        assert_eq!(values(&due), vec![1, 4, 3, 0, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn leaves_future_entries() {
        let mut queue = EventQueue::new();
        queue.push(5, cc(5));
        queue.push(2, cc(2));

        assert!(queue.drain_due(1).is_empty());
        assert_eq!(values(&queue.drain_due(4)), vec![2]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(5));
    }

    #[test]
    fn drain_at_max_tick_takes_everything() {
        let mut queue = EventQueue::new();
        queue.push(u64::MAX, cc(1));
        queue.push(0, cc(0));
        assert_eq!(values(&queue.drain_due(u64::MAX)), vec![0, 1]);
    }

    #[test]
    fn clear_reports_count() {
        let mut queue = EventQueue::new();
        queue.push(1, cc(1));
        queue.push(1, cc(2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
