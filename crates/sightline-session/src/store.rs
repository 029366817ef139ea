//! `ResultStore` — the one value shared between the session task and the
//! display redraw path.

use std::sync::{Arc, Mutex, MutexGuard};

use sightline_core::{InboundResult, Landmarks};

/// Latest decoded service result, faults included. Cloneable handle; the session task is
/// the only writer (the mutating methods are crate-private), everything
/// else reads snapshots.
#[derive(Clone, Default)]
pub struct ResultStore {
    inner: Arc<Mutex<Option<InboundResult>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<InboundResult>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Snapshot of the latest result, if any.
    pub fn latest(&self) -> Option<InboundResult> {
        self.lock().clone()
    }

    /// Landmarks from the latest result, for the overlay renderer.
    pub fn landmarks(&self) -> Option<Landmarks> {
        self.lock().as_ref().and_then(|r| r.landmarks().cloned())
    }

    pub(crate) fn set(&self, result: InboundResult) {
        *self.lock() = Some(result);
    }

    pub(crate) fn clear(&self) {
        *self.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::Point;

    #[test]
    fn stores_and_clears_the_latest_result() {
        let store = ResultStore::new();
        assert!(store.latest().is_none());
        assert!(store.landmarks().is_none());

        let landmarks = Landmarks { face: vec![Point::new(0.1, 0.9)], ..Default::default() };
        store.set(InboundResult::Analysis {
            prediction: None,
            landmarks:  Some(landmarks.clone()),
        });
        assert_eq!(store.landmarks(), Some(landmarks));

        // A reader handle observes the clear.
        let reader = store.clone();
        store.clear();
        assert!(reader.latest().is_none());
    }

    #[test]
    fn faults_carry_no_landmarks() {
        let store = ResultStore::new();
        store.set(InboundResult::fault("overloaded"));
        assert!(store.latest().expect("stored").is_fault());
        assert!(store.landmarks().is_none());
    }
}
