//! Startup discovery of the workflows and activities the external worker
//! implements. Queried once, before any coordinator exists; the declarations
//! feed SDK registration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{Codec, TransportPayload};
use crate::context::TickContext;
use crate::error::BridgeError;
use crate::message::{Command, GetWorkerInfoOptions, Message};
use crate::pool::{stop_channel, WorkerPool};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowDeclaration {
    pub name: String,
    pub queries: Vec<String>,
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityDeclaration {
    pub name: String,
}

/// One worker process's self-description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerInfo {
    pub task_queue: String,
    pub workflows: Vec<WorkflowDeclaration>,
    pub activities: Vec<ActivityDeclaration>,
}

/// Declarations fetched from the external worker at startup.
#[derive(Debug)]
pub struct WorkerRegistry {
    workers: Vec<WorkerInfo>,
}

impl WorkerRegistry {
    /// One-shot `GetWorkerInfo` exchange. A worker describing no workflows
    /// and no activities is a configuration fault.
    pub async fn discover(pool: &dyn WorkerPool, rr_version: &str) -> Result<Self, BridgeError> {
        let msg = Message {
            id: 1,
            command: Some(Command::GetWorkerInfo(GetWorkerInfoOptions {
                rr_version: rr_version.to_string(),
            })),
            ..Default::default()
        };

        let mut payload = TransportPayload::default();
        Codec::encode(&TickContext::default(), &mut payload, &[msg])?;

        let (stop, stop_rx) = stop_channel();
        let mut rx = pool.exec(&payload, stop_rx).await?;
        let reply = match rx.try_recv() {
            Ok(result) => result?,
            Err(_) => return Err(BridgeError::Protocol("worker empty response".to_string())),
        };
        if reply.is_stream() {
            stop.signal();
            return Err(BridgeError::Protocol(
                "streaming responses are not supported".to_string(),
            ));
        }

        let messages = Codec::decode(&reply)?;
        let answer = messages
            .first()
            .ok_or_else(|| BridgeError::Protocol("empty worker info reply".to_string()))?;
        let payloads = answer
            .payloads
            .as_ref()
            .and_then(|p| p.payloads.first())
            .ok_or_else(|| BridgeError::Protocol("worker info reply without payload".to_string()))?;

        let workers: Vec<WorkerInfo> = temporal_bridge_proto::from_json_payload(payloads)
            .map_err(|e| BridgeError::Protocol(format!("decode worker info: {e}")))?;

        if workers
            .iter()
            .all(|w| w.workflows.is_empty() && w.activities.is_empty())
        {
            return Err(BridgeError::Protocol(
                "external worker declares no workflows or activities".to_string(),
            ));
        }

        for worker in &workers {
            debug!(
                task_queue = %worker.task_queue,
                workflows = worker.workflows.len(),
                activities = worker.activities.len(),
                "discovered worker"
            );
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> &[WorkerInfo] {
        &self.workers
    }

    pub fn workflow_names(&self) -> Vec<&str> {
        self.workers
            .iter()
            .flat_map(|w| w.workflows.iter().map(|d| d.name.as_str()))
            .collect()
    }

    pub fn activity_names(&self) -> Vec<&str> {
        self.workers
            .iter()
            .flat_map(|w| w.activities.iter().map(|d| d.name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_info_decodes_from_json() {
        let json = r#"[{
            "taskQueue": "default",
            "workflows": [{"name": "OrderFlow", "queries": ["status"], "signals": ["add"]}],
            "activities": [{"name": "charge"}, {"name": "refund"}]
        }]"#;
        let workers: Vec<WorkerInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(workers[0].task_queue, "default");
        assert_eq!(workers[0].workflows[0].signals, vec!["add"]);
        assert_eq!(workers[0].activities.len(), 2);
    }
}
