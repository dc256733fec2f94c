//! Correlation of child-workflow start results with later lookups.
//!
//! The start of a child workflow resolves before (or after) the worker asks
//! for its execution handle; this registry accepts either ordering. Each id
//! is single-shot: once a result meets its listener both sides are consumed.
//!
//! Methods return the ready `(listener, result)` pair instead of invoking it
//! so callers can fire the listener outside any state lock.

use std::collections::HashMap;

use temporal_bridge_proto::WorkflowExecution;

use crate::error::WorkflowError;

pub type ChildStartResult = Result<WorkflowExecution, WorkflowError>;
pub type StartListener = Box<dyn FnOnce(ChildStartResult) + Send>;

enum Slot {
    Ready(ChildStartResult),
    Waiting(StartListener),
}

#[derive(Default)]
pub struct IdRegistry {
    slots: HashMap<u64, Slot>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a start result. Returns the parked listener when one was
    /// already waiting for this id.
    pub fn push(
        &mut self,
        id: u64,
        result: ChildStartResult,
    ) -> Option<(StartListener, ChildStartResult)> {
        match self.slots.remove(&id) {
            Some(Slot::Waiting(listener)) => Some((listener, result)),
            Some(Slot::Ready(_)) | None => {
                self.slots.insert(id, Slot::Ready(result));
                None
            }
        }
    }

    /// Register a listener for a start result. Returns the listener paired
    /// with the result when the result already arrived.
    pub fn listen(
        &mut self,
        id: u64,
        listener: StartListener,
    ) -> Option<(StartListener, ChildStartResult)> {
        match self.slots.remove(&id) {
            Some(Slot::Ready(result)) => Some((listener, result)),
            Some(Slot::Waiting(_)) | None => {
                self.slots.insert(id, Slot::Waiting(listener));
                None
            }
        }
    }
}
