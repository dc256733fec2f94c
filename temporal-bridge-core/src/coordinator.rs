//! Per-run workflow coordinator.
//!
//! One instance exists per running workflow (including every replay
//! attempt). The SDK calls in with signals, queries, updates, cancels, and
//! tick notifications; the external worker answers with command batches.
//! Everything non-deterministic is delegated to SDK primitives, so a replay
//! with the same history reproduces the same ids, commands, and responses.
//!
//! Concurrency model: cooperative, single-threaded per run. SDK result
//! handlers may fire re-entrantly from inside a `request_cancel_*` call;
//! while the dispatch loop runs (`in_loop`) such completions execute inline
//! so a cancel cascade lands in the outbound buffer before the tick ends.
//! Outside the loop they are parked on the callback queue and drained by the
//! next tick.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use temporal_bridge_proto::{json_payloads, Failure, Header, Payloads};
use tracing::{debug, warn};

use crate::canceller::Canceller;
use crate::codec::{Codec, TransportPayload};
use crate::context::TickContext;
use crate::env::{
    ExecuteActivityParams, ExecuteChildWorkflowParams, ExecuteLocalActivityParams,
    LocalActivityHandler, LocalActivityResult, SignalExternalParams, UpdateCallbacks,
    WorkflowEnvironment,
};
use crate::error::{BridgeError, ContinueAsNewOptions, WorkflowError};
use crate::failure::{error_to_failure, failure_to_error};
use crate::id_registry::{IdRegistry, StartListener};
use crate::message::{
    CancelExternalWorkflowOptions, CancelOptions, Command, ContinueAsNewOptionsWire,
    ExecuteActivityOptions, ExecuteChildWorkflowOptions, ExecuteLocalActivityOptions,
    GetChildWorkflowExecutionOptions, GetVersionOptions, InvokeQueryOptions, InvokeSignalOptions,
    InvokeUpdateOptions, Message, NewTimerOptions, PanicOptions, RunIdOptions,
    SignalExternalWorkflowOptions, StartWorkflowOptions, UpdateResultOptions, UpsertMemoOptions,
    UpsertSearchAttributesOptions, UpsertTypedSearchAttributesOptions,
};
use crate::pool::{
    stop_channel, MetricsSink, PayloadPool, WorkerPool, METRIC_POOL_QUEUE, METRIC_WORKFLOWS_QUEUE,
};
use crate::queue::MessageQueue;
use crate::search_attributes;

/// Deferred resolution drained by the next tick; applied under the state
/// lock.
type DeferredThunk = Box<dyn FnOnce(&mut RunState) -> Result<(), BridgeError> + Send>;
type UpdateThunk = Box<dyn FnOnce(Message) + Send>;

/// Mutable per-run state. Guarded by one mutex; the lock is never held
/// across an await point or while an environment primitive runs.
struct RunState {
    mq: MessageQueue,
    pipeline: VecDeque<Message>,
    callbacks: VecDeque<DeferredThunk>,
    canceller: Canceller,
    ids: IdRegistry,
    update_validate_cbs: HashMap<String, UpdateThunk>,
    update_complete_cbs: HashMap<String, UpdateThunk>,
    update_names: BTreeSet<String>,
    /// Feeds deterministic child-workflow id generation.
    seq: u64,
    /// True while the tick drain runs.
    in_loop: bool,
    /// Set once `CompleteWorkflow`/`ContinueAsNew` is handled.
    terminated: bool,
    /// Inbound header captured at workflow start; inherited by outbound
    /// primitives that do not carry their own.
    header: Option<Header>,
}

pub(crate) struct Shared {
    state: Mutex<RunState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(RunState {
                mq: MessageQueue::new(),
                pipeline: VecDeque::new(),
                callbacks: VecDeque::new(),
                canceller: Canceller::new(),
                ids: IdRegistry::new(),
                update_validate_cbs: HashMap::new(),
                update_complete_cbs: HashMap::new(),
                update_names: BTreeSet::new(),
                seq: 0,
                in_loop: false,
                terminated: false,
                header: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Route a primitive's resolution to the outbound buffer: inline while
    /// the dispatch loop runs, parked on the callback queue otherwise.
    fn resolve(&self, id: u64, payloads: Option<Payloads>, error: Option<WorkflowError>) {
        let mut st = self.lock();
        if st.in_loop {
            Self::apply_resolution(&mut st, id, payloads, error);
        } else {
            st.callbacks.push_back(Box::new(move |st| {
                Shared::apply_resolution(st, id, payloads, error);
                Ok(())
            }));
        }
    }

    fn apply_resolution(
        st: &mut RunState,
        id: u64,
        payloads: Option<Payloads>,
        error: Option<WorkflowError>,
    ) {
        if st.terminated {
            debug!(id, "resolution after terminal command, dropping");
            return;
        }
        st.canceller.discard(id);
        match error {
            Some(e) => st.mq.push_error(id, error_to_failure(&e)),
            None => st.mq.push_response(id, payloads),
        }
    }
}

/// Bridges one workflow run between the SDK environment and the external
/// worker pool.
pub struct WorkflowCoordinator {
    env: Arc<dyn WorkflowEnvironment>,
    pool: Arc<dyn WorkerPool>,
    metrics: Arc<dyn MetricsSink>,
    buffers: Arc<PayloadPool>,
    run_id: String,
    rr_id: String,
    worker_pid: i32,
    shared: Arc<Shared>,
}

impl WorkflowCoordinator {
    pub fn new(
        env: Arc<dyn WorkflowEnvironment>,
        pool: Arc<dyn WorkerPool>,
        metrics: Arc<dyn MetricsSink>,
        buffers: Arc<PayloadPool>,
        rr_id: String,
        worker_pid: i32,
    ) -> Self {
        let run_id = env.workflow_info().run_id;
        Self {
            env,
            pool,
            metrics,
            buffers,
            run_id,
            rr_id,
            worker_pid,
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Update names the workflow exposed so far.
    pub fn update_names(&self) -> Vec<String> {
        self.shared.lock().update_names.iter().cloned().collect()
    }

    // ─── SDK-triggered entries ────────────────────────────────

    /// Stage the start of the workflow body. Captures the inbound header for
    /// later inheritance.
    pub fn on_start(&self, input: Option<Payloads>, header: Option<Header>) {
        let info = self.env.workflow_info();
        let mut st = self.shared.lock();
        st.header = header.clone();
        st.mq.push_command(
            Command::StartWorkflow(StartWorkflowOptions {
                name: info.workflow_type,
                namespace: info.namespace,
                workflow_id: info.workflow_id,
                run_id: info.run_id,
                task_queue: info.task_queue,
                attempt: info.attempt,
            }),
            input,
            header,
        );
    }

    /// Stage an inbound signal. Never fails.
    pub fn handle_signal(
        &self,
        name: &str,
        payloads: Option<Payloads>,
        header: Option<Header>,
    ) {
        let mut st = self.shared.lock();
        st.mq.push_command(
            Command::InvokeSignal(InvokeSignalOptions {
                run_id: self.run_id.clone(),
                name: name.to_string(),
            }),
            payloads,
            header,
        );
    }

    /// Stage a workflow cancellation request.
    pub fn handle_cancel(&self) {
        let mut st = self.shared.lock();
        st.mq.push_command(
            Command::CancelWorkflow(RunIdOptions {
                run_id: self.run_id.clone(),
            }),
            None,
            None,
        );
    }

    /// Synchronous query: one message out, exactly one reply back. Queries
    /// must not mutate workflow state, so this bypasses the pipeline and the
    /// callback queue entirely.
    pub async fn handle_query(
        &self,
        name: &str,
        args: Option<Payloads>,
        header: Option<Header>,
    ) -> Result<Option<Payloads>, BridgeError> {
        let reply = self
            .run_command(
                Command::InvokeQuery(InvokeQueryOptions {
                    run_id: self.run_id.clone(),
                    name: name.to_string(),
                }),
                args,
                header,
            )
            .await?;
        if let Some(failure) = reply.failure {
            return Err(BridgeError::Workflow(failure));
        }
        Ok(reply.payloads)
    }

    /// Stage an update invocation and register its lifecycle callbacks.
    /// Validation must precede completion; a validation failure discards the
    /// completion callback (`UpdateValidated` handling below).
    pub fn handle_update(
        &self,
        name: &str,
        update_id: &str,
        payloads: Option<Payloads>,
        header: Option<Header>,
        callbacks: Arc<dyn UpdateCallbacks>,
    ) {
        let env = Arc::clone(&self.env);
        let accept_cbs = Arc::clone(&callbacks);
        let validate: UpdateThunk = Box::new(move |msg: Message| match msg.failure {
            // Rejections are only delivered outside replay; during replay
            // the SDK reproduces the recorded outcome itself.
            Some(failure) => {
                if !env.is_replaying() {
                    accept_cbs.reject(failure_to_error(&failure));
                }
            }
            None => accept_cbs.accept(),
        });
        let complete: UpdateThunk = Box::new(move |msg: Message| match msg.failure {
            Some(failure) => callbacks.complete(None, Some(failure_to_error(&failure))),
            None => callbacks.complete(msg.payloads, None),
        });

        let mut st = self.shared.lock();
        st.update_names.insert(name.to_string());
        st.update_validate_cbs
            .insert(update_id.to_string(), validate);
        st.update_complete_cbs
            .insert(update_id.to_string(), complete);
        st.mq.push_command(
            Command::InvokeUpdate(InvokeUpdateOptions {
                run_id: self.run_id.clone(),
                update_id: update_id.to_string(),
                name: name.to_string(),
                kind: "validate_execute".to_string(),
            }),
            payloads,
            header,
        );
    }

    /// Process one workflow task: ship staged commands, then drain the
    /// inbound pipeline and the parked callbacks until both are empty.
    pub async fn on_tick(&self) -> Result<(), BridgeError> {
        self.shared.lock().in_loop = true;
        let result = self.drain().await;
        self.shared.lock().in_loop = false;
        result
    }

    /// Tear down the run on the worker side. Best effort — the SDK has
    /// already discarded the run when this is called.
    pub async fn destroy(&self) {
        {
            let mut st = self.shared.lock();
            st.terminated = true;
            st.pipeline.clear();
            st.callbacks.clear();
            st.update_validate_cbs.clear();
            st.update_complete_cbs.clear();
        }
        let destroy = Command::DestroyWorkflow(RunIdOptions {
            run_id: self.run_id.clone(),
        });
        if let Err(e) = self.run_command(destroy, None, None).await {
            warn!(run_id = %self.run_id, error = %e, "workflow destroy command failed");
        }
    }

    // ─── Tick drain & flush protocol ──────────────────────────

    async fn drain(&self) -> Result<(), BridgeError> {
        enum Step {
            Handle(Message),
            Invoke(DeferredThunk),
            Flush,
            Done,
        }

        loop {
            let step = {
                let mut st = self.shared.lock();
                if let Some(msg) = st.pipeline.pop_front() {
                    Step::Handle(msg)
                } else if let Some(cb) = st.callbacks.pop_front() {
                    Step::Invoke(cb)
                } else if !st.mq.is_empty() && !st.terminated {
                    Step::Flush
                } else {
                    Step::Done
                }
            };
            match step {
                Step::Handle(msg) => self.handle_message(msg).await?,
                Step::Invoke(cb) => {
                    let mut st = self.shared.lock();
                    cb(&mut st)?;
                }
                Step::Flush => self.flush_queue().await?,
                Step::Done => return Ok(()),
            }
        }
    }

    /// One encode → exec → decode round trip over the buffered outbound
    /// messages. An empty buffer (or a terminated run) returns silently —
    /// no no-op heartbeat is sent.
    async fn flush_queue(&self) -> Result<(), BridgeError> {
        let outbound: Vec<Message> = {
            let st = self.shared.lock();
            if st.terminated || st.mq.is_empty() {
                return Ok(());
            }
            st.mq.messages().to_vec()
        };

        self.metrics
            .gauge(METRIC_WORKFLOWS_QUEUE, self.pool.queue_size() as f64);

        let mut payload = self.buffers.acquire();
        let encoded = Codec::encode(&self.tick_context(), &mut payload, &outbound);
        let inbound = match encoded {
            Ok(()) => self.round_trip(&payload).await,
            Err(e) => Err(e),
        };
        self.buffers.release(payload);

        self.metrics
            .gauge(METRIC_WORKFLOWS_QUEUE, self.pool.queue_size() as f64);

        let inbound = inbound?;
        let mut st = self.shared.lock();
        st.mq.flush();
        st.pipeline.extend(inbound);
        Ok(())
    }

    /// Single-shot exchange outside the pipeline (queries, teardown).
    /// Allocates an id from the shared sequence but never touches the
    /// outbound buffer.
    async fn run_command(
        &self,
        command: Command,
        payloads: Option<Payloads>,
        header: Option<Header>,
    ) -> Result<Message, BridgeError> {
        let id = self.shared.lock().mq.allocate_id();
        let msg = Message {
            id,
            command: Some(command),
            payloads,
            header,
            ..Default::default()
        };

        self.metrics
            .gauge(METRIC_POOL_QUEUE, self.pool.queue_size() as f64);

        let mut payload = self.buffers.acquire();
        let encoded = Codec::encode(&self.tick_context(), &mut payload, std::slice::from_ref(&msg));
        let inbound = match encoded {
            Ok(()) => self.round_trip(&payload).await,
            Err(e) => Err(e),
        };
        self.buffers.release(payload);

        self.metrics
            .gauge(METRIC_POOL_QUEUE, self.pool.queue_size() as f64);

        let mut inbound = inbound?;
        if inbound.len() != 1 {
            return Err(BridgeError::Protocol(format!(
                "expected exactly one reply message, got {}",
                inbound.len()
            )));
        }
        Ok(inbound.remove(0))
    }

    async fn round_trip(&self, payload: &TransportPayload) -> Result<Vec<Message>, BridgeError> {
        let (stop, stop_rx) = stop_channel();
        let mut rx = self.pool.exec(payload, stop_rx).await?;

        // The pool contract guarantees the reply is buffered by the time the
        // channel is handed back; an empty channel is a worker fault.
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
        Codec::decode(&reply)
    }

    fn tick_context(&self) -> TickContext {
        let info = self.env.workflow_info();
        TickContext {
            task_queue: info.task_queue,
            tick_time: self.env.now().to_rfc3339(),
            replay: self.env.is_replaying(),
            history_len: info.history_length,
            history_size: info.history_size,
            continue_as_new_suggested: info.continue_as_new_suggested,
            rr_id: self.rr_id.clone(),
            worker_pid: self.worker_pid,
        }
    }

    // ─── Inbound command dispatch ─────────────────────────────

    async fn handle_message(&self, mut msg: Message) -> Result<(), BridgeError> {
        if self.shared.lock().terminated {
            warn!(
                run_id = %self.run_id,
                id = msg.id,
                "message after terminal command, dropping"
            );
            return Ok(());
        }
        let Some(command) = msg.command.take() else {
            debug!(run_id = %self.run_id, id = msg.id, "stray response in pipeline, dropping");
            return Ok(());
        };
        debug!(run_id = %self.run_id, id = msg.id, command = command.name(), "dispatch");

        match command {
            Command::ExecuteActivity(opts) => self.execute_activity(msg, opts),
            Command::ExecuteLocalActivity(opts) => self.execute_local_activity(msg, opts),
            Command::ExecuteChildWorkflow(opts) => self.execute_child_workflow(msg, opts),
            Command::GetChildWorkflowExecution(opts) => {
                self.get_child_workflow_execution(msg, opts)
            }
            Command::NewTimer(opts) => self.new_timer(msg, opts),
            Command::GetVersion(opts) => return self.get_version(msg, opts).await,
            Command::SideEffect => return self.side_effect(msg).await,
            Command::UpdateValidated(opts) => self.update_validated(msg, opts),
            Command::UpdateCompleted(opts) => self.update_completed(msg, opts),
            Command::CompleteWorkflow => return self.complete_workflow(msg),
            Command::ContinueAsNew(opts) => return self.continue_as_new(msg, opts),
            Command::UpsertWorkflowSearchAttributes(opts) => {
                return self.upsert_search_attributes(opts)
            }
            Command::UpsertWorkflowTypedSearchAttributes(opts) => {
                return self.upsert_typed_search_attributes(opts)
            }
            Command::SignalExternalWorkflow(opts) => self.signal_external_workflow(msg, opts),
            Command::CancelExternalWorkflow(opts) => self.cancel_external_workflow(msg, opts),
            Command::Cancel(opts) => return self.cancel(msg, opts).await,
            Command::Panic(opts) => return self.panic(msg, opts),
            Command::UpsertMemo(opts) => return self.upsert_memo(opts),
            other @ (Command::StartWorkflow(_)
            | Command::InvokeSignal(_)
            | Command::InvokeQuery(_)
            | Command::InvokeUpdate(_)
            | Command::CancelWorkflow(_)
            | Command::DestroyWorkflow(_)
            | Command::GetWorkerInfo(_)) => {
                return Err(BridgeError::Protocol(format!(
                    "unexpected inbound command {}",
                    other.name()
                )));
            }
        }
        Ok(())
    }

    fn inherited_header(&self, header: Option<Header>) -> Option<Header> {
        header.or_else(|| self.shared.lock().header.clone())
    }

    fn execute_activity(&self, msg: Message, opts: ExecuteActivityOptions) {
        let id = msg.id;
        let params = ExecuteActivityParams {
            activity_type: opts.name,
            input: msg.payloads,
            header: self.inherited_header(msg.header),
            options: opts.options,
        };
        let shared = Arc::clone(&self.shared);
        let activity_id = self
            .env
            .execute_activity(params, Box::new(move |p, e| shared.resolve(id, p, e)));

        let env = Arc::clone(&self.env);
        self.shared.lock().canceller.register(
            id,
            Box::new(move || {
                env.request_cancel_activity(&activity_id);
                Ok(())
            }),
        );
    }

    fn execute_local_activity(&self, msg: Message, opts: ExecuteLocalActivityOptions) {
        let id = msg.id;
        let params = ExecuteLocalActivityParams {
            activity_type: opts.name,
            input: msg.payloads,
            header: self.inherited_header(msg.header),
            options: opts.options,
        };
        let shared = Arc::clone(&self.shared);
        let handler: LocalActivityHandler = Box::new(move |result: LocalActivityResult| {
            match result.failure {
                Some(f) => {
                    debug!(id, attempt = f.attempt, backoff = ?f.backoff, "local activity failed");
                    shared.resolve(id, None, Some(f.error));
                }
                None => shared.resolve(id, result.payloads, None),
            }
        });
        let activity_id = self.env.execute_local_activity(params, handler);

        let env = Arc::clone(&self.env);
        self.shared.lock().canceller.register(
            id,
            Box::new(move || {
                env.request_cancel_local_activity(&activity_id);
                Ok(())
            }),
        );
    }

    fn execute_child_workflow(&self, msg: Message, mut opts: ExecuteChildWorkflowOptions) {
        let id = msg.id;
        // Deterministic fallback id: same history, same sequence, same id.
        if opts
            .options
            .workflow_id
            .as_deref()
            .map_or(true, str::is_empty)
        {
            let seq = {
                let mut st = self.shared.lock();
                st.seq += 1;
                st.seq
            };
            opts.options.workflow_id = Some(format!("{}_{}", self.run_id, seq));
        }
        let namespace = opts.options.namespace.clone().unwrap_or_default();
        let workflow_id = opts.options.workflow_id.clone().unwrap_or_default();

        let params = ExecuteChildWorkflowParams {
            workflow_type: opts.name,
            input: msg.payloads,
            header: self.inherited_header(msg.header),
            options: opts.options,
        };

        let shared = Arc::clone(&self.shared);
        let on_result = Box::new(move |p, e| shared.resolve(id, p, e));

        let shared = Arc::clone(&self.shared);
        let on_start = Box::new(move |result| {
            let ready = shared.lock().ids.push(id, result);
            if let Some((listener, result)) = ready {
                listener(result);
            }
        });

        self.env.execute_child_workflow(params, on_result, on_start);

        let env = Arc::clone(&self.env);
        self.shared.lock().canceller.register(
            id,
            Box::new(move || {
                env.request_cancel_child_workflow(&namespace, &workflow_id);
                Ok(())
            }),
        );
    }

    fn get_child_workflow_execution(&self, msg: Message, opts: GetChildWorkflowExecutionOptions) {
        let reply_id = msg.id;
        let shared = Arc::clone(&self.shared);
        let listener: StartListener = Box::new(move |result| match result {
            Ok(execution) => {
                let encoded = json_payloads(&serde_json::json!({
                    "id": execution.workflow_id,
                    "runId": execution.run_id,
                }));
                match encoded {
                    Ok(payloads) => shared.resolve(reply_id, Some(payloads), None),
                    Err(e) => shared.resolve(
                        reply_id,
                        None,
                        Some(WorkflowError::application(format!(
                            "encode child execution: {e}"
                        ))),
                    ),
                }
            }
            Err(e) => shared.resolve(reply_id, None, Some(e)),
        });

        let ready = self.shared.lock().ids.listen(opts.id, listener);
        if let Some((listener, result)) = ready {
            listener(result);
        }
    }

    fn new_timer(&self, msg: Message, opts: NewTimerOptions) {
        let id = msg.id;
        let shared = Arc::clone(&self.shared);
        let timer = self.env.new_timer(
            Duration::from_millis(opts.ms),
            opts.summary,
            Box::new(move |p, e| shared.resolve(id, p, e)),
        );
        if let Some(timer_id) = timer {
            let env = Arc::clone(&self.env);
            self.shared.lock().canceller.register(
                id,
                Box::new(move || {
                    env.request_cancel_timer(timer_id);
                    Ok(())
                }),
            );
        }
    }

    /// The worker blocks on the version answer, so the response is pushed
    /// and flushed within this dispatch.
    async fn get_version(&self, msg: Message, opts: GetVersionOptions) -> Result<(), BridgeError> {
        let version = self
            .env
            .get_version(&opts.change_id, opts.min_supported, opts.max_supported);
        let payloads = json_payloads(&version)
            .map_err(|e| BridgeError::Protocol(format!("encode version: {e}")))?;
        self.shared.lock().mq.push_response(msg.id, Some(payloads));
        self.flush_queue().await
    }

    /// Continuable: when the SDK records the value synchronously, the flush
    /// below ships it to the worker within the same round trip. A deferred
    /// recording makes the flush a no-op and the value ships next tick.
    async fn side_effect(&self, msg: Message) -> Result<(), BridgeError> {
        let id = msg.id;
        let shared = Arc::clone(&self.shared);
        self.env
            .side_effect(msg.payloads, Box::new(move |p, e| shared.resolve(id, p, e)));
        self.flush_queue().await
    }

    fn update_validated(&self, msg: Message, opts: UpdateResultOptions) {
        let callback = self.shared.lock().update_validate_cbs.remove(&opts.id);
        match callback {
            None => warn!(
                run_id = %self.run_id,
                update_id = %opts.id,
                "no validation callback registered"
            ),
            Some(callback) => {
                let rejected = msg.failure.is_some();
                callback(msg);
                if rejected {
                    // a rejected update never completes
                    self.shared.lock().update_complete_cbs.remove(&opts.id);
                }
            }
        }
    }

    fn update_completed(&self, msg: Message, opts: UpdateResultOptions) {
        let callback = self.shared.lock().update_complete_cbs.remove(&opts.id);
        match callback {
            None => warn!(
                run_id = %self.run_id,
                update_id = %opts.id,
                "no completion callback registered"
            ),
            Some(callback) => callback(msg),
        }
    }

    fn complete_workflow(&self, msg: Message) -> Result<(), BridgeError> {
        let ack = json_payloads(&"completed")
            .map_err(|e| BridgeError::Protocol(format!("encode ack: {e}")))?;
        {
            let mut st = self.shared.lock();
            st.mq.push_response(msg.id, Some(ack));
            st.terminated = true;
        }
        match msg.failure {
            Some(failure) => self.env.complete(None, Some(failure_to_error(&failure))),
            None => self.env.complete(msg.payloads, None),
        }
        Ok(())
    }

    fn continue_as_new(
        &self,
        msg: Message,
        opts: ContinueAsNewOptionsWire,
    ) -> Result<(), BridgeError> {
        let ack = json_payloads(&"completed")
            .map_err(|e| BridgeError::Protocol(format!("encode ack: {e}")))?;
        {
            let mut st = self.shared.lock();
            st.mq.push_response(msg.id, Some(ack));
            st.terminated = true;
        }

        let task_queue = match opts.options.task_queue {
            Some(tq) if !tq.is_empty() => tq,
            _ => self.env.workflow_info().task_queue,
        };
        let next_run = ContinueAsNewOptions {
            workflow_type: opts.name,
            input: msg.payloads,
            header: msg.header,
            task_queue,
            workflow_run_timeout: nonzero_millis(opts.options.workflow_run_timeout_ms),
            workflow_task_timeout: nonzero_millis(opts.options.workflow_task_timeout_ms),
        };
        self.env
            .complete(None, Some(WorkflowError::ContinueAsNew(Box::new(next_run))));
        Ok(())
    }

    fn upsert_search_attributes(
        &self,
        opts: UpsertSearchAttributesOptions,
    ) -> Result<(), BridgeError> {
        self.env.upsert_search_attributes(opts.search_attributes)?;
        Ok(())
    }

    fn upsert_typed_search_attributes(
        &self,
        opts: UpsertTypedSearchAttributesOptions,
    ) -> Result<(), BridgeError> {
        let updates = search_attributes::translate(&opts.search_attributes)?;
        if updates.is_empty() {
            warn!(run_id = %self.run_id, "typed search attribute update produced no entries");
            return Ok(());
        }
        self.env.upsert_typed_search_attributes(updates)?;
        Ok(())
    }

    fn signal_external_workflow(&self, msg: Message, opts: SignalExternalWorkflowOptions) {
        let id = msg.id;
        let shared = Arc::clone(&self.shared);
        self.env.signal_external_workflow(
            SignalExternalParams {
                namespace: opts.namespace,
                workflow_id: opts.workflow_id,
                run_id: opts.run_id,
                signal_name: opts.signal,
                args: msg.payloads,
                child_workflow_only: opts.child_workflow_only,
            },
            Box::new(move |p, e| shared.resolve(id, p, e)),
        );
    }

    fn cancel_external_workflow(&self, msg: Message, opts: CancelExternalWorkflowOptions) {
        let id = msg.id;
        let shared = Arc::clone(&self.shared);
        self.env.request_cancel_external_workflow(
            &opts.namespace,
            &opts.workflow_id,
            &opts.run_id,
            Box::new(move |p, e| shared.resolve(id, p, e)),
        );
    }

    /// Cancel thunks run outside the state lock: a `request_cancel_*` call
    /// may fire the primitive's result handler synchronously, which takes
    /// the lock again to push its error inline.
    async fn cancel(&self, msg: Message, opts: CancelOptions) -> Result<(), BridgeError> {
        let thunks = self.shared.lock().canceller.take(&opts.ids);
        let mut failed = Vec::new();
        for (id, thunk) in thunks {
            if let Err(e) = thunk() {
                failed.push(format!("id {id}: {e}"));
            }
        }
        if !failed.is_empty() {
            return Err(BridgeError::Protocol(format!(
                "cancel: {}",
                failed.join("; ")
            )));
        }

        let ack = json_payloads(&"completed")
            .map_err(|e| BridgeError::Protocol(format!("encode ack: {e}")))?;
        self.shared.lock().mq.push_response(msg.id, Some(ack));
        self.flush_queue().await
    }

    /// Propagated unwrapped: Temporal classifies retryability by failure
    /// identity.
    fn panic(&self, msg: Message, opts: PanicOptions) -> Result<(), BridgeError> {
        let failure = msg.failure.unwrap_or_else(|| Failure {
            message: opts
                .message
                .unwrap_or_else(|| "external worker panic".to_string()),
            ..Default::default()
        });
        Err(BridgeError::Workflow(failure))
    }

    fn upsert_memo(&self, opts: UpsertMemoOptions) -> Result<(), BridgeError> {
        if opts.memo.is_empty() {
            return Ok(());
        }
        self.env.upsert_memo(opts.memo)?;
        Ok(())
    }
}

fn nonzero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
