use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::store::AnnotationStore;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded stack of full store snapshots.
///
/// Callers push before every mutation, so `pop` always yields the state as it
/// was before the most recent change.
#[derive(Debug, Clone)]
pub struct History {
    snapshots: VecDeque<AnnotationStore>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Records a deep copy of `store`. Returns `false` when the snapshot was skipped.
    pub fn push(&mut self, store: &AnnotationStore) -> bool {
        if !store.is_representable() {
            warn!(
                annotations = store.len(),
                "failed to push history snapshot: store holds non-finite geometry"
            );
            return false;
        }

        self.snapshots.push_back(store.clone());
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
            debug!(capacity = self.capacity, "evicted oldest history snapshot");
        }
        true
    }

    pub fn pop(&mut self) -> Option<AnnotationStore> {
        self.snapshots.pop_back()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, AnnotationData, LineData, Tool};

    fn line(n: f32) -> Annotation {
        Annotation::new(
            Tool::Draw,
            1,
            AnnotationData::Line(LineData {
                start_x: n,
                start_y: n,
                end_x: n + 1.0,
                end_y: n + 1.0,
                color: "#ff0000".into(),
                size: 3.0,
            }),
        )
    }

    #[test]
    fn undo_round_trip_restores_every_step() {
        let mut store = AnnotationStore::new();
        store.append(line(-1.0));
        let original = store.clone();
        let mut history = History::default();

        let mut states = Vec::new();
        for i in 0..DEFAULT_HISTORY_CAPACITY {
            states.push(store.clone());
            assert!(history.push(&store));
            if i % 3 == 2 {
                store.remove_at(0);
            } else {
                store.append(line(i as f32));
            }
        }

        while let Some(previous) = history.pop() {
            let expected = states.pop().unwrap();
            assert_eq!(previous, expected);
            store = previous;
        }
        assert_eq!(store, original);
    }

    #[test]
    fn snapshots_do_not_alias_live_store() {
        let mut store = AnnotationStore::new();
        let id = store.append(line(0.0));
        let mut history = History::default();
        history.push(&store);

        store.mutate(id, |a| a.page = 9);
        let snapshot = history.pop().unwrap();
        assert_eq!(snapshot.get(id).unwrap().page, 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut history = History::default();
        let mut store = AnnotationStore::new();
        for i in 0..(DEFAULT_HISTORY_CAPACITY + 10) {
            store.append(line(i as f32));
            history.push(&store);
        }
        assert_eq!(history.len(), DEFAULT_HISTORY_CAPACITY);

        let mut last = None;
        while let Some(snapshot) = history.pop() {
            last = Some(snapshot);
        }
        // The oldest surviving snapshot is the 50th most recent push.
        assert_eq!(last.unwrap().len(), 11);
    }

    #[test]
    fn unrepresentable_store_is_skipped() {
        let mut store = AnnotationStore::new();
        let id = store.append(line(0.0));
        store.mutate(id, |a| {
            if let AnnotationData::Line(d) = &mut a.data {
                d.end_x = f32::INFINITY;
            }
        });

        let mut history = History::default();
        assert!(!history.push(&store));
        assert!(history.is_empty());
        assert!(history.pop().is_none());
    }
}
