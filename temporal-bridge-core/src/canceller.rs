//! Cancel-thunk registry keyed by message id.

use std::collections::BTreeMap;

use crate::error::BridgeError;

pub type CancelThunk = Box<dyn FnOnce() -> Result<(), BridgeError> + Send>;

/// Maps outstanding message ids to the thunk that cancels the SDK primitive
/// they started. Thunks typically call a `request_cancel_*` primitive, which
/// may fire the primitive's result handler synchronously — callers invoking
/// thunks must therefore not hold the coordinator state lock.
///
/// Keyed by a `BTreeMap`: ids are monotonic, so ascending key order is
/// insertion order.
#[derive(Default)]
pub struct Canceller {
    thunks: BTreeMap<u64, CancelThunk>,
}

impl Canceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: u64, thunk: CancelThunk) {
        self.thunks.insert(id, thunk);
    }

    /// Drop a registration once the primitive resolved.
    pub fn discard(&mut self, id: u64) {
        self.thunks.remove(&id);
    }

    /// Remove and return the thunks registered for `ids`, in insertion
    /// order. Ids with no registration (never registered or discarded) are
    /// skipped.
    pub fn take(&mut self, ids: &[u64]) -> Vec<(u64, CancelThunk)> {
        let mut wanted: Vec<u64> = ids
            .iter()
            .copied()
            .filter(|id| self.thunks.contains_key(id))
            .collect();
        wanted.sort_unstable();
        wanted.dedup();
        wanted
            .into_iter()
            .filter_map(|id| self.thunks.remove(&id).map(|t| (id, t)))
            .collect()
    }

    /// Invoke the thunks for `ids` in insertion order. Errors are collected;
    /// every thunk runs regardless.
    pub fn cancel(&mut self, ids: &[u64]) -> Result<(), BridgeError> {
        let mut failed = Vec::new();
        for (id, thunk) in self.take(ids) {
            if let Err(e) = thunk() {
                failed.push(format!("id {id}: {e}"));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Protocol(format!(
                "cancel: {}",
                failed.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<u64>>>, id: u64) -> CancelThunk {
        let log = Arc::clone(log);
        Box::new(move || {
            log.lock().unwrap().push(id);
            Ok(())
        })
    }

    #[test]
    fn cancel_runs_only_requested_ids_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut canceller = Canceller::new();
        for id in [2u64, 5, 9] {
            canceller.register(id, recorder(&log, id));
        }

        canceller.cancel(&[9, 2]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![2, 9]);

        // id 5 is still registered, ids 2 and 9 are consumed
        canceller.cancel(&[2, 5, 9]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![2, 9, 5]);
    }

    #[test]
    fn discarded_ids_are_not_invoked() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut canceller = Canceller::new();
        canceller.register(1, recorder(&log, 1));
        canceller.register(2, recorder(&log, 2));
        canceller.discard(1);

        canceller.cancel(&[1, 2]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn errors_are_aggregated_but_all_thunks_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut canceller = Canceller::new();
        canceller.register(1, Box::new(|| Err(BridgeError::Protocol("nope".to_string()))));
        canceller.register(2, recorder(&log, 2));

        let err = canceller.cancel(&[1, 2]).unwrap_err();
        assert!(err.to_string().contains("id 1"));
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let mut canceller = Canceller::new();
        canceller.cancel(&[7]).unwrap();
    }
}
