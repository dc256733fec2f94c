//! Contract against the external worker pool, plus the reusable payload
//! buffers and the metrics sink updated around transport round trips.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::codec::TransportPayload;
use crate::error::BridgeError;

/// Gauge updated around workflow flushes.
pub const METRIC_WORKFLOWS_QUEUE: &str = "rr_workflows_pool_queue_size";
/// Gauge updated around single-shot commands (queries, teardown).
pub const METRIC_POOL_QUEUE: &str = "rr_pool_queue_size";

pub type PoolResult = Result<TransportPayload, BridgeError>;

/// Handle the coordinator uses to abort a streamed reply.
#[derive(Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<()>,
}

impl StopHandle {
    pub fn signal(&self) {
        let _ = self.tx.try_send(());
    }
}

pub fn stop_channel() -> (StopHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (StopHandle { tx }, rx)
}

/// Pool of external worker processes.
///
/// The pool contract is synchronous in disguise: by the time `exec` returns
/// its channel the reply is already buffered, so the caller receives it
/// non-blockingly. An empty channel is a protocol error on the caller side.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    async fn exec(
        &self,
        payload: &TransportPayload,
        stop: mpsc::Receiver<()>,
    ) -> Result<mpsc::Receiver<PoolResult>, BridgeError>;

    /// Current depth of the pool's request queue, reported to the gauges.
    fn queue_size(&self) -> u64;
}

/// Sink for the two queue-size gauges. The bridge only fixes the update
/// points; delivery is the caller's concern.
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &'static str, value: f64);
}

/// Discards all measurements.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn gauge(&self, _name: &'static str, _value: f64) {}
}

/// Free-list of scratch transport payloads for the flush path. Buffers are
/// cleared on release so a reused payload never leaks a previous batch.
#[derive(Default)]
pub struct PayloadPool {
    free: Mutex<Vec<TransportPayload>>,
}

impl PayloadPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> TransportPayload {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        free.pop().unwrap_or_default()
    }

    pub fn release(&self, mut payload: TransportPayload) {
        payload.clear();
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        free.push(payload);
    }
}
