//! Contract against the SDK's workflow environment.
//!
//! The environment is deterministic by construction: every method returns
//! synchronously, and completions arrive later through the handlers passed
//! in here. Handlers may fire re-entrantly from inside a `request_cancel_*`
//! call — the coordinator's callback discipline depends on that.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use temporal_bridge_proto::{Header, Payloads, WorkflowExecution};

use crate::error::WorkflowError;
use crate::id_registry::ChildStartResult;
use crate::message::{ActivityOptions, ChildWorkflowOptions, LocalActivityOptions};
use crate::search_attributes::SearchAttributeUpdate;

/// Completion handler for activities, timers, side effects, and external
/// signal/cancel requests.
pub type ResultHandler = Box<dyn FnOnce(Option<Payloads>, Option<WorkflowError>) + Send>;

/// Start handler for child workflows; fires when the child's execution
/// handle is known (before its result).
pub type ChildStartHandler = Box<dyn FnOnce(ChildStartResult) + Send>;

/// Completion handler for local activities.
pub type LocalActivityHandler = Box<dyn FnOnce(LocalActivityResult) + Send>;

/// Outcome of a local activity attempt.
pub struct LocalActivityResult {
    pub payloads: Option<Payloads>,
    pub failure: Option<LocalActivityFailure>,
}

/// Local activity failures carry scheduling detail the server-side activity
/// path reports out of band.
pub struct LocalActivityFailure {
    pub error: WorkflowError,
    pub attempt: u32,
    pub backoff: Option<Duration>,
}

/// SDK-assigned handle used to cancel a scheduled activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityId(pub String);

/// SDK-assigned handle used to cancel a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(pub u64);

/// Static facts about the run plus per-task counters.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInfo {
    pub namespace: String,
    pub workflow_type: String,
    pub workflow_id: String,
    pub run_id: String,
    pub task_queue: String,
    pub attempt: u32,
    pub history_length: i64,
    pub history_size: i64,
    pub continue_as_new_suggested: bool,
}

pub struct ExecuteActivityParams {
    pub activity_type: String,
    pub input: Option<Payloads>,
    pub header: Option<Header>,
    pub options: ActivityOptions,
}

pub struct ExecuteLocalActivityParams {
    pub activity_type: String,
    pub input: Option<Payloads>,
    pub header: Option<Header>,
    pub options: LocalActivityOptions,
}

pub struct ExecuteChildWorkflowParams {
    pub workflow_type: String,
    pub input: Option<Payloads>,
    pub header: Option<Header>,
    pub options: ChildWorkflowOptions,
}

pub struct SignalExternalParams {
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
    pub signal_name: String,
    pub args: Option<Payloads>,
    pub child_workflow_only: bool,
}

/// The Temporal workflow-bindings surface the coordinator drives. One
/// instance per run; all methods are synchronous and replay-safe.
pub trait WorkflowEnvironment: Send + Sync {
    fn workflow_info(&self) -> WorkflowInfo;

    /// Deterministic workflow time.
    fn now(&self) -> DateTime<Utc>;

    fn is_replaying(&self) -> bool;

    fn execute_activity(&self, params: ExecuteActivityParams, on_result: ResultHandler)
        -> ActivityId;

    fn request_cancel_activity(&self, id: &ActivityId);

    fn execute_local_activity(
        &self,
        params: ExecuteLocalActivityParams,
        on_result: LocalActivityHandler,
    ) -> ActivityId;

    fn request_cancel_local_activity(&self, id: &ActivityId);

    fn execute_child_workflow(
        &self,
        params: ExecuteChildWorkflowParams,
        on_result: ResultHandler,
        on_start: ChildStartHandler,
    );

    fn request_cancel_child_workflow(&self, namespace: &str, workflow_id: &str);

    /// Returns `None` when the timer could not be scheduled (zero duration);
    /// only a `Some` handle is cancellable.
    fn new_timer(
        &self,
        duration: Duration,
        summary: Option<String>,
        on_fire: ResultHandler,
    ) -> Option<TimerId>;

    fn request_cancel_timer(&self, id: TimerId);

    /// Record (or replay) a side-effect value. The recorded payloads come
    /// back through `on_recorded`, possibly synchronously.
    fn side_effect(&self, value: Option<Payloads>, on_recorded: ResultHandler);

    fn get_version(&self, change_id: &str, min_supported: u32, max_supported: u32) -> i32;

    fn signal_external_workflow(&self, params: SignalExternalParams, on_result: ResultHandler);

    fn request_cancel_external_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
        run_id: &str,
        on_result: ResultHandler,
    );

    fn upsert_search_attributes(
        &self,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), WorkflowError>;

    fn upsert_typed_search_attributes(
        &self,
        updates: Vec<SearchAttributeUpdate>,
    ) -> Result<(), WorkflowError>;

    fn upsert_memo(&self, memo: BTreeMap<String, serde_json::Value>) -> Result<(), WorkflowError>;

    /// Terminal: report the run's result (or failure / continue-as-new
    /// sentinel) to the SDK.
    fn complete(&self, result: Option<Payloads>, error: Option<WorkflowError>);
}

/// Server-assigned update lifecycle callbacks handed to `handle_update`.
pub trait UpdateCallbacks: Send + Sync {
    fn accept(&self);
    fn reject(&self, error: WorkflowError);
    fn complete(&self, result: Option<Payloads>, error: Option<WorkflowError>);
}

/// Convenience for tests and fakes.
pub fn execution(workflow_id: &str, run_id: &str) -> WorkflowExecution {
    WorkflowExecution {
        workflow_id: workflow_id.to_string(),
        run_id: run_id.to_string(),
    }
}
