//! Per-tick context shipped as the batch header.

use serde::{Deserialize, Serialize};

/// Snapshot of the workflow task the batch belongs to. Serialized as JSON
/// into the transport payload's context slot; `tick_time` is RFC3339 and
/// comes from the SDK's deterministic clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TickContext {
    pub task_queue: String,
    pub tick_time: String,
    pub replay: bool,
    pub history_len: i64,
    pub history_size: i64,
    pub continue_as_new_suggested: bool,
    pub rr_id: String,
    pub worker_pid: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_round_trips_as_json() {
        let ctx = TickContext {
            task_queue: "default".to_string(),
            tick_time: "2024-05-01T10:30:00Z".to_string(),
            replay: true,
            history_len: 42,
            history_size: 16_384,
            continue_as_new_suggested: false,
            rr_id: "wf-pool-1".to_string(),
            worker_pid: 4321,
        };
        let json = serde_json::to_vec(&ctx).unwrap();
        let back: TickContext = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let json = serde_json::to_string(&TickContext::default()).unwrap();
        assert!(json.contains("taskQueue"));
        assert!(json.contains("tickTime"));
        assert!(json.contains("continueAsNewSuggested"));
    }
}
