//! Conversion between the wire-level [`Failure`] shape and the in-process
//! [`WorkflowError`]. The SDK owns the canonical converter; this is the
//! bridge-local equivalent used when handing worker failures to SDK
//! primitives and vice versa.

use temporal_bridge_proto::{ApplicationFailureInfo, CanceledFailureInfo, Failure};

use crate::error::WorkflowError;

/// Source tag stamped on failures this bridge creates.
const FAILURE_SOURCE: &str = "WorkflowBridge";

/// Map a wire failure onto an in-process error. Cancellation info wins over
/// application info when both are present; a bare failure becomes a plain
/// application error.
pub fn failure_to_error(failure: &Failure) -> WorkflowError {
    if let Some(info) = &failure.canceled_failure_info {
        return WorkflowError::Canceled {
            details: info.details.clone(),
        };
    }
    let (error_type, non_retryable, details) = match &failure.application_failure_info {
        Some(info) => (info.r#type.clone(), info.non_retryable, info.details.clone()),
        None => (String::new(), false, None),
    };
    WorkflowError::Application {
        message: failure.message.clone(),
        error_type,
        non_retryable,
        details,
    }
}

/// Map an in-process error onto the wire failure shape.
pub fn error_to_failure(error: &WorkflowError) -> Failure {
    match error {
        WorkflowError::Application {
            message,
            error_type,
            non_retryable,
            details,
        } => Failure {
            message: message.clone(),
            source: FAILURE_SOURCE.to_string(),
            application_failure_info: Some(ApplicationFailureInfo {
                r#type: error_type.clone(),
                non_retryable: *non_retryable,
                details: details.clone(),
            }),
            ..Default::default()
        },
        WorkflowError::Canceled { details } => Failure {
            message: "canceled".to_string(),
            source: FAILURE_SOURCE.to_string(),
            canceled_failure_info: Some(CanceledFailureInfo {
                details: details.clone(),
            }),
            ..Default::default()
        },
        WorkflowError::ContinueAsNew(options) => Failure {
            message: format!("continue as new: {}", options.workflow_type),
            source: FAILURE_SOURCE.to_string(),
            ..Default::default()
        },
    }
}
