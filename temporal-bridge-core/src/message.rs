//! Typed protocol commands and the in-process message shape.
//!
//! On the wire a command is a string discriminator plus a JSON options blob
//! (spec'd per command); in process it is a tagged enum so dispatch is
//! exhaustive. Payloads, header, and failure ride alongside the command in
//! the enclosing [`Message`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use temporal_bridge_proto::{Failure, Header, Payloads};

use crate::error::BridgeError;
use crate::search_attributes::TypedSearchAttribute;

// ─── Message ──────────────────────────────────────────────────

/// One protocol message. `command == None` marks a response to a prior
/// outbound message with the same id.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub id: u64,
    pub command: Option<Command>,
    pub payloads: Option<Payloads>,
    pub header: Option<Header>,
    pub failure: Option<Failure>,
    pub history_length: i64,
}

impl Message {
    pub fn is_response(&self) -> bool {
        self.command.is_none()
    }
}

// ─── Shared option fragments ──────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub maximum_interval_ms: u64,
    pub maximum_attempts: i32,
    pub non_retryable_error_types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityOptions {
    pub task_queue: Option<String>,
    pub schedule_to_close_timeout_ms: u64,
    pub schedule_to_start_timeout_ms: u64,
    pub start_to_close_timeout_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub wait_for_cancellation: bool,
    pub activity_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalActivityOptions {
    pub schedule_to_close_timeout_ms: u64,
    pub start_to_close_timeout_ms: u64,
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChildWorkflowOptions {
    pub namespace: Option<String>,
    pub workflow_id: Option<String>,
    pub task_queue: Option<String>,
    pub workflow_execution_timeout_ms: u64,
    pub workflow_run_timeout_ms: u64,
    pub workflow_task_timeout_ms: u64,
    pub workflow_id_reuse_policy: i32,
    pub parent_close_policy: i32,
    pub cron_schedule: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

// ─── Per-command options ──────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteActivityOptions {
    pub name: String,
    pub options: ActivityOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteLocalActivityOptions {
    pub name: String,
    pub options: LocalActivityOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteChildWorkflowOptions {
    pub name: String,
    pub options: ChildWorkflowOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetChildWorkflowExecutionOptions {
    /// Id of the originating `ExecuteChildWorkflow` message.
    pub id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTimerOptions {
    pub ms: u64,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetVersionOptions {
    pub change_id: String,
    pub min_supported: u32,
    pub max_supported: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateResultOptions {
    /// Update id assigned by the server, echoed by the worker.
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinueAsNewTarget {
    pub task_queue: Option<String>,
    pub workflow_run_timeout_ms: u64,
    pub workflow_task_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinueAsNewOptionsWire {
    pub name: String,
    pub options: ContinueAsNewTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertSearchAttributesOptions {
    pub search_attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertTypedSearchAttributesOptions {
    pub search_attributes: BTreeMap<String, TypedSearchAttribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalExternalWorkflowOptions {
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
    pub signal: String,
    pub child_workflow_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelExternalWorkflowOptions {
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelOptions {
    /// Message ids whose registered cancel thunks must fire.
    pub ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanicOptions {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertMemoOptions {
    pub memo: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartWorkflowOptions {
    pub name: String,
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
    pub task_queue: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvokeSignalOptions {
    pub run_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvokeQueryOptions {
    pub run_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvokeUpdateOptions {
    pub run_id: String,
    pub update_id: String,
    pub name: String,
    /// Dispatch mode; the only mode spoken today is `validate_execute`.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunIdOptions {
    pub run_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetWorkerInfoOptions {
    pub rr_version: String,
}

// ─── Command ──────────────────────────────────────────────────

/// Every command either side of the protocol may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // worker → host
    ExecuteActivity(ExecuteActivityOptions),
    ExecuteLocalActivity(ExecuteLocalActivityOptions),
    ExecuteChildWorkflow(ExecuteChildWorkflowOptions),
    GetChildWorkflowExecution(GetChildWorkflowExecutionOptions),
    NewTimer(NewTimerOptions),
    GetVersion(GetVersionOptions),
    SideEffect,
    UpdateValidated(UpdateResultOptions),
    UpdateCompleted(UpdateResultOptions),
    CompleteWorkflow,
    ContinueAsNew(ContinueAsNewOptionsWire),
    UpsertWorkflowSearchAttributes(UpsertSearchAttributesOptions),
    UpsertWorkflowTypedSearchAttributes(UpsertTypedSearchAttributesOptions),
    SignalExternalWorkflow(SignalExternalWorkflowOptions),
    CancelExternalWorkflow(CancelExternalWorkflowOptions),
    Cancel(CancelOptions),
    Panic(PanicOptions),
    UpsertMemo(UpsertMemoOptions),
    // host → worker
    StartWorkflow(StartWorkflowOptions),
    InvokeSignal(InvokeSignalOptions),
    InvokeQuery(InvokeQueryOptions),
    InvokeUpdate(InvokeUpdateOptions),
    CancelWorkflow(RunIdOptions),
    DestroyWorkflow(RunIdOptions),
    GetWorkerInfo(GetWorkerInfoOptions),
}

impl Command {
    /// Wire discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ExecuteActivity(_) => "ExecuteActivity",
            Command::ExecuteLocalActivity(_) => "ExecuteLocalActivity",
            Command::ExecuteChildWorkflow(_) => "ExecuteChildWorkflow",
            Command::GetChildWorkflowExecution(_) => "GetChildWorkflowExecution",
            Command::NewTimer(_) => "NewTimer",
            Command::GetVersion(_) => "GetVersion",
            Command::SideEffect => "SideEffect",
            Command::UpdateValidated(_) => "UpdateValidated",
            Command::UpdateCompleted(_) => "UpdateCompleted",
            Command::CompleteWorkflow => "CompleteWorkflow",
            Command::ContinueAsNew(_) => "ContinueAsNew",
            Command::UpsertWorkflowSearchAttributes(_) => "UpsertWorkflowSearchAttributes",
            Command::UpsertWorkflowTypedSearchAttributes(_) => {
                "UpsertWorkflowTypedSearchAttributes"
            }
            Command::SignalExternalWorkflow(_) => "SignalExternalWorkflow",
            Command::CancelExternalWorkflow(_) => "CancelExternalWorkflow",
            Command::Cancel(_) => "Cancel",
            Command::Panic(_) => "Panic",
            Command::UpsertMemo(_) => "UpsertMemo",
            Command::StartWorkflow(_) => "StartWorkflow",
            Command::InvokeSignal(_) => "InvokeSignal",
            Command::InvokeQuery(_) => "InvokeQuery",
            Command::InvokeUpdate(_) => "InvokeUpdate",
            Command::CancelWorkflow(_) => "CancelWorkflow",
            Command::DestroyWorkflow(_) => "DestroyWorkflow",
            Command::GetWorkerInfo(_) => "GetWorkerInfo",
        }
    }

    /// Serialize the options blob for the wire.
    pub fn options_json(&self) -> Result<Vec<u8>, BridgeError> {
        fn enc<T: Serialize>(options: &T) -> Result<Vec<u8>, BridgeError> {
            serde_json::to_vec(options)
                .map_err(|e| BridgeError::Protocol(format!("encode command options: {e}")))
        }
        match self {
            Command::ExecuteActivity(o) => enc(o),
            Command::ExecuteLocalActivity(o) => enc(o),
            Command::ExecuteChildWorkflow(o) => enc(o),
            Command::GetChildWorkflowExecution(o) => enc(o),
            Command::NewTimer(o) => enc(o),
            Command::GetVersion(o) => enc(o),
            Command::SideEffect => Ok(b"{}".to_vec()),
            Command::UpdateValidated(o) => enc(o),
            Command::UpdateCompleted(o) => enc(o),
            Command::CompleteWorkflow => Ok(b"{}".to_vec()),
            Command::ContinueAsNew(o) => enc(o),
            Command::UpsertWorkflowSearchAttributes(o) => enc(o),
            Command::UpsertWorkflowTypedSearchAttributes(o) => enc(o),
            Command::SignalExternalWorkflow(o) => enc(o),
            Command::CancelExternalWorkflow(o) => enc(o),
            Command::Cancel(o) => enc(o),
            Command::Panic(o) => enc(o),
            Command::UpsertMemo(o) => enc(o),
            Command::StartWorkflow(o) => enc(o),
            Command::InvokeSignal(o) => enc(o),
            Command::InvokeQuery(o) => enc(o),
            Command::InvokeUpdate(o) => enc(o),
            Command::CancelWorkflow(o) => enc(o),
            Command::DestroyWorkflow(o) => enc(o),
            Command::GetWorkerInfo(o) => enc(o),
        }
    }

    /// Reconstruct a command from its wire discriminator and options blob.
    /// An unrecognized discriminator is fatal for the task.
    pub fn from_wire(name: &str, options: &[u8]) -> Result<Self, BridgeError> {
        fn dec<'a, T: Deserialize<'a> + Default>(options: &'a [u8]) -> Result<T, BridgeError> {
            if options.is_empty() {
                return Ok(T::default());
            }
            serde_json::from_slice(options)
                .map_err(|e| BridgeError::Protocol(format!("decode command options: {e}")))
        }
        match name {
            "ExecuteActivity" => Ok(Command::ExecuteActivity(dec(options)?)),
            "ExecuteLocalActivity" => Ok(Command::ExecuteLocalActivity(dec(options)?)),
            "ExecuteChildWorkflow" => Ok(Command::ExecuteChildWorkflow(dec(options)?)),
            "GetChildWorkflowExecution" => Ok(Command::GetChildWorkflowExecution(dec(options)?)),
            "NewTimer" => Ok(Command::NewTimer(dec(options)?)),
            "GetVersion" => Ok(Command::GetVersion(dec(options)?)),
            "SideEffect" => Ok(Command::SideEffect),
            "UpdateValidated" => Ok(Command::UpdateValidated(dec(options)?)),
            "UpdateCompleted" => Ok(Command::UpdateCompleted(dec(options)?)),
            "CompleteWorkflow" => Ok(Command::CompleteWorkflow),
            "ContinueAsNew" => Ok(Command::ContinueAsNew(dec(options)?)),
            "UpsertWorkflowSearchAttributes" => {
                Ok(Command::UpsertWorkflowSearchAttributes(dec(options)?))
            }
            "UpsertWorkflowTypedSearchAttributes" => {
                Ok(Command::UpsertWorkflowTypedSearchAttributes(dec(options)?))
            }
            "SignalExternalWorkflow" => Ok(Command::SignalExternalWorkflow(dec(options)?)),
            "CancelExternalWorkflow" => Ok(Command::CancelExternalWorkflow(dec(options)?)),
            "Cancel" => Ok(Command::Cancel(dec(options)?)),
            "Panic" => Ok(Command::Panic(dec(options)?)),
            "UpsertMemo" => Ok(Command::UpsertMemo(dec(options)?)),
            "StartWorkflow" => Ok(Command::StartWorkflow(dec(options)?)),
            "InvokeSignal" => Ok(Command::InvokeSignal(dec(options)?)),
            "InvokeQuery" => Ok(Command::InvokeQuery(dec(options)?)),
            "InvokeUpdate" => Ok(Command::InvokeUpdate(dec(options)?)),
            "CancelWorkflow" => Ok(Command::CancelWorkflow(dec(options)?)),
            "DestroyWorkflow" => Ok(Command::DestroyWorkflow(dec(options)?)),
            "GetWorkerInfo" => Ok(Command::GetWorkerInfo(dec(options)?)),
            other => Err(BridgeError::Protocol(format!("unknown command {other:?}"))),
        }
    }
}
