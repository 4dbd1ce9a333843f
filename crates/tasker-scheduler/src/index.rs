//! Due-time ordering for sync tasks.

use std::collections::{BTreeMap, HashMap};

use tasker_core::Tick;

use crate::task::TaskId;

/// Maps due tick → task ids, with a reverse map for cheap removal.
///
/// Pop order is ascending tick, then ascending id within a tick. Ids are
/// handed out monotonically, so insertion order and id order agree for
/// fresh tasks; a repeating task re-inserted into a tick that already holds
/// newer tasks is placed by id, not appended.
#[derive(Debug, Default)]
pub struct DueTimeIndex {
    buckets: BTreeMap<Tick, Vec<TaskId>>,
    due: HashMap<TaskId, Tick>,
    /// Lowest tick an insertion may land on: one past the last popped tick.
    floor: Tick,
}

impl DueTimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index whose first pop may cover `floor`.
    pub fn with_floor(floor: Tick) -> Self {
        Self {
            floor,
            ..Self::default()
        }
    }

    /// Insert `id` due at `tick` and return the tick actually used.
    ///
    /// A tick at or before the last popped batch is moved to the next
    /// advance. Re-inserting an id that is already present moves it.
    pub fn insert(&mut self, id: TaskId, tick: Tick) -> Tick {
        self.remove(id);
        let tick = tick.max(self.floor);
        let bucket = self.buckets.entry(tick).or_default();
        match bucket.last() {
            Some(last) if *last > id => {
                let pos = bucket.partition_point(|other| *other < id);
                bucket.insert(pos, id);
            }
            _ => bucket.push(id),
        }
        self.due.insert(id, tick);
        tick
    }

    /// Remove `id`. Returns false if it was not indexed.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let Some(tick) = self.due.remove(&id) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&tick) {
            bucket.retain(|other| *other != id);
            if bucket.is_empty() {
                self.buckets.remove(&tick);
            }
        }
        true
    }

    /// Remove and return every id due at or before `upto`, in pop order.
    pub fn pop_due(&mut self, upto: Tick) -> Vec<(Tick, TaskId)> {
        let later = match upto.checked_add(1) {
            Some(next) => self.buckets.split_off(&next),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.buckets, later);

        let mut popped = Vec::with_capacity(due.values().map(Vec::len).sum());
        for (tick, ids) in due {
            for id in ids {
                self.due.remove(&id);
                popped.push((tick, id));
            }
        }
        self.floor = self.floor.max(upto.saturating_add(1));
        popped
    }

    /// Remove everything, returning ids in pop order.
    pub fn drain_all(&mut self) -> Vec<TaskId> {
        self.due.clear();
        std::mem::take(&mut self.buckets)
            .into_values()
            .flatten()
            .collect()
    }

    pub fn due_tick(&self, id: TaskId) -> Option<Tick> {
        self.due.get(&id).copied()
    }

    /// Earliest tick that has something due.
    pub fn next_due(&self) -> Option<Tick> {
        self.buckets.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(popped: &[(Tick, TaskId)]) -> Vec<u64> {
        popped.iter().map(|(_, id)| id.0).collect()
    }

    #[test]
    fn pops_by_tick_then_id() {
        let mut idx = DueTimeIndex::new();
        idx.insert(TaskId(3), 5);
        idx.insert(TaskId(1), 7);
        idx.insert(TaskId(2), 5);
        idx.insert(TaskId(4), 6);

        let popped = idx.pop_due(10);
        assert_eq!(ids(&popped), vec![2, 3, 4, 1]);
        assert_eq!(popped[0].0, 5);
        assert!(idx.is_empty());
    }

    #[test]
    fn pop_leaves_later_ticks() {
        let mut idx = DueTimeIndex::new();
        idx.insert(TaskId(1), 3);
        idx.insert(TaskId(2), 4);
        idx.insert(TaskId(3), 9);

        assert_eq!(ids(&idx.pop_due(4)), vec![1, 2]);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.next_due(), Some(9));
        assert!(idx.pop_due(8).is_empty());
    }

    #[test]
    fn insert_at_or_before_popped_tick_goes_to_next_advance() {
        let mut idx = DueTimeIndex::new();
        idx.pop_due(10);
        assert_eq!(idx.insert(TaskId(1), 10), 11);
        assert_eq!(idx.insert(TaskId(2), 4), 11);
        assert_eq!(idx.insert(TaskId(3), 12), 12);
        assert!(idx.pop_due(10).is_empty());
        assert_eq!(ids(&idx.pop_due(11)), vec![1, 2]);
    }

    #[test]
    fn remove_is_targeted() {
        let mut idx = DueTimeIndex::new();
        idx.insert(TaskId(1), 2);
        idx.insert(TaskId(2), 2);
        assert!(idx.remove(TaskId(1)));
        assert!(!idx.remove(TaskId(1)));
        assert_eq!(idx.due_tick(TaskId(2)), Some(2));
        assert_eq!(ids(&idx.pop_due(2)), vec![2]);
    }

    #[test]
    fn reinsert_keeps_id_order_within_tick() {
        let mut idx = DueTimeIndex::new();
        idx.insert(TaskId(5), 20);
        idx.insert(TaskId(9), 20);
        // older repeating task lands on the same tick later on
        idx.insert(TaskId(2), 20);
        assert_eq!(ids(&idx.pop_due(20)), vec![2, 5, 9]);
    }

    #[test]
    fn reinsert_moves_existing_entry() {
        let mut idx = DueTimeIndex::new();
        idx.insert(TaskId(1), 3);
        idx.insert(TaskId(1), 8);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.next_due(), Some(8));
    }

    #[test]
    fn drain_all_returns_pop_order() {
        let mut idx = DueTimeIndex::new();
        idx.insert(TaskId(2), 9);
        idx.insert(TaskId(1), 4);
        let all: Vec<u64> = idx.drain_all().into_iter().map(|id| id.0).collect();
        assert_eq!(all, vec![1, 2]);
        assert!(idx.is_empty());
        assert_eq!(idx.next_due(), None);
    }

    #[test]
    fn pop_at_max_tick_does_not_overflow() {
        let mut idx = DueTimeIndex::new();
        idx.insert(TaskId(1), Tick::MAX);
        assert_eq!(ids(&idx.pop_due(Tick::MAX)), vec![1]);
        // floor saturates instead of wrapping to zero
        assert_eq!(idx.insert(TaskId(2), 0), Tick::MAX);
    }
}
