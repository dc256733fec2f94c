//! Configuration contract consumed by the embedding plugin. The bridge
//! itself only observes the graceful-shutdown timeout (through pool
//! cancellation); everything else is wiring for the surrounding process.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct BridgeConfig {
    /// Temporal frontend address.
    pub address: String,
    pub namespace: String,
    pub activities: PoolConfig,
    /// How long pool teardown waits for in-flight work.
    pub graceful_shutdown_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_shutdown_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7233".to_string(),
            namespace: "default".to_string(),
            activities: PoolConfig::default(),
            graceful_shutdown_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PoolConfig {
    pub num_workers: usize,
    /// 0 means no per-process job cap.
    pub max_jobs: usize,
    pub allocate_timeout_ms: u64,
    pub destroy_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            max_jobs: 0,
            allocate_timeout_ms: 60_000,
            destroy_timeout_ms: 60_000,
        }
    }
}
