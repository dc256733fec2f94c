use std::time::Duration;

use temporal_bridge_proto::{Failure, Header, Payloads};

/// Fatal faults on the bridge path. A non-`Ok` return from message dispatch
/// or the flush protocol fails the current workflow task; the server retries
/// the task, not the workflow.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Streaming reply, empty reply, unknown command, malformed options.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A wire-level failure the external worker asked us to surface as the
    /// task result (the `Panic` command). Carried verbatim — Temporal
    /// classifies retryability by failure identity.
    #[error("workflow failure: {}", .0.message)]
    Workflow(Failure),

    /// An SDK primitive refused an operation (search attribute upsert,
    /// memo upsert).
    #[error("workflow environment: {0}")]
    Environment(#[from] WorkflowError),
}

/// User-level failures flowing between the SDK and the external worker.
/// Convertible to and from the wire [`Failure`] shape.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    #[error("{message}")]
    Application {
        message: String,
        error_type: String,
        non_retryable: bool,
        details: Option<Payloads>,
    },

    #[error("canceled")]
    Canceled { details: Option<Payloads> },

    /// Sentinel completing the current run while scheduling a fresh one.
    #[error("continue as new: {}", .0.workflow_type)]
    ContinueAsNew(Box<ContinueAsNewOptions>),
}

impl WorkflowError {
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
            error_type: String::new(),
            non_retryable: false,
            details: None,
        }
    }

    pub fn canceled() -> Self {
        Self::Canceled { details: None }
    }
}

/// Parameters for the next run carried by the continue-as-new sentinel.
#[derive(Debug, Clone, Default)]
pub struct ContinueAsNewOptions {
    pub workflow_type: String,
    pub input: Option<Payloads>,
    pub header: Option<Header>,
    pub task_queue: String,
    pub workflow_run_timeout: Option<Duration>,
    pub workflow_task_timeout: Option<Duration>,
}
