use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::model::LogEntry;

/// `(Priority ascending, Timestamp ascending)` total order over entries
/// (spec §4.2.1), backed by a binary heap. `std::collections::BinaryHeap` is
/// a max-heap, so entries are wrapped in `Reverse` to dequeue the
/// numerically-smallest `(priority, timestamp)` pair first.
#[derive(Debug, Default)]
pub struct PriorityStructure {
    heap: BinaryHeap<Reverse<LogEntry>>,
}

impl PriorityStructure {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.heap.push(Reverse(entry));
    }

    pub fn pop(&mut self) -> Option<LogEntry> {
        self.heap.pop().map(|Reverse(e)| e)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;
    use chrono::Utc;

    #[test]
    fn pops_in_priority_then_age_order() {
        let mut q = PriorityStructure::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::milliseconds(1);
        q.push(LogEntry::new("a".into(), "p".into(), "s".into(), t0, Priority::Low, 0));
        q.push(LogEntry::new("b".into(), "p".into(), "s".into(), t1, Priority::High, 1));
        q.push(LogEntry::new("c".into(), "p".into(), "s".into(), t0, Priority::High, 2));

        let first = q.pop().unwrap();
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.content, "c");

        let second = q.pop().unwrap();
        assert_eq!(second.content, "b");

        let third = q.pop().unwrap();
        assert_eq!(third.priority, Priority::Low);
    }
}
