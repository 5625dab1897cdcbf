use std::sync::atomic::Ordering;
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::Mutex as TokioMutex;

use crate::engine::config::RuntimeOptions;
use crate::engine::dispatch::{HttpBackend, ReqwestBackend};
use crate::engine::instance::FirmwareInstance;
use crate::engine::module::FirmwareModule;
use crate::engine::store::{RunStore, SharedState};
use crate::error::{BadgeError, BadgeResult};
use crate::protocol::HostIpcMessage;

/// Observer invoked synchronously, from within the host-import call, with
/// every decoded frame the guest writes.
pub type FrameHandler = Box<dyn Fn(RgbaImage) + Send + Sync>;

/// Lifecycle of the runtime, advanced by `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running { generation: u64 },
}

/// How a guest run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The guest's tick export reported completion.
    Finished,
    /// A newer `start` call retired this run, or superseded it before it
    /// ever instantiated.
    Superseded,
}

/// Owns module instantiation, the host-import surface, the run loop, and
/// restart sequencing. At most one guest instance is live at any instant;
/// the host→guest queue belongs to the runtime and survives restarts.
pub struct BadgeRuntime {
    shared: Arc<SharedState>,
    /// Held for the whole duration of a run; `start` waits here until the
    /// previous run has observably stopped.
    run_lock: TokioMutex<()>,
}

impl BadgeRuntime {
    pub fn new(options: RuntimeOptions) -> BadgeResult<Self> {
        let http = ReqwestBackend::new(options.http_timeout)
            .map_err(|e| BadgeError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_backend(options, Arc::new(http)))
    }

    /// Use a custom network backend; tests resolve requests against a mock
    /// network this way.
    pub fn with_http_backend(options: RuntimeOptions, http: Arc<dyn HttpBackend>) -> Self {
        Self {
            shared: Arc::new(SharedState::new(options, http)),
            run_lock: TokioMutex::new(()),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.shared.lifecycle()
    }

    /// Register the single frame observer, replacing any previous one.
    pub fn add_frame_buffer_handler(&self, handler: FrameHandler) {
        *self.shared.frame_handler.lock().unwrap() = Some(handler);
    }

    /// Enqueue an unsolicited host→guest message. Safe to call at any time,
    /// including before any guest has started; the message waits on the
    /// queue until a guest drains it.
    pub fn send_host_ipc_message(&self, message: HostIpcMessage) {
        match serde_json::to_vec(&message) {
            Ok(payload) => self.shared.enqueue(0, payload),
            Err(e) => tracing::error!("failed to encode host IPC message: {e}"),
        }
    }

    /// Snapshot of the undelivered host→guest queue, for diagnostics and
    /// tests. Entries that fail to decode are skipped.
    pub fn pending_host_messages(&self) -> Vec<(u32, HostIpcMessage)> {
        self.shared
            .host_queue
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(id, payload)| {
                serde_json::from_slice(payload).ok().map(|msg| (*id, msg))
            })
            .collect()
    }

    /// Start a new guest run, retiring any current one first.
    ///
    /// Advancing the generation is the stop signal; the running loop observes
    /// it at its next iteration and exits, releasing the run lock this call
    /// is waiting on. Starts are therefore serialized, never interleaved,
    /// and when several queue up only the newest one instantiates.
    pub async fn start(&self, module_bytes: Vec<u8>) -> BadgeResult<RunOutcome> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let _run = self.run_lock.lock().await;

        if self.shared.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("run {generation} superseded before instantiation");
            return Ok(RunOutcome::Superseded);
        }

        // The previous run is fully retired: its responses must not leak
        // into this run's id space.
        self.shared.purge_responses();

        self.shared
            .set_lifecycle(LifecycleState::Running { generation });
        let outcome = self.run(generation, module_bytes).await;
        self.shared.set_lifecycle(LifecycleState::Idle);
        outcome
    }

    async fn run(&self, generation: u64, module_bytes: Vec<u8>) -> BadgeResult<RunOutcome> {
        let module = FirmwareModule::new(module_bytes).map_err(BadgeError::Instantiation)?;

        let data = RunStore::new(generation, self.shared.clone());
        let mut instance = FirmwareInstance::new(&module, data)
            .await
            .map_err(BadgeError::Instantiation)?;

        tracing::info!("firmware run {generation} starting");
        instance.entry().await.map_err(execution_error)?;

        loop {
            if self.shared.generation.load(Ordering::SeqCst) != generation {
                tracing::info!("firmware run {generation} superseded");
                return Ok(RunOutcome::Superseded);
            }

            let (head_id, head_len) = self.shared.peek_head();
            let done = instance
                .tick(head_id, head_len)
                .await
                .map_err(execution_error)?;
            if done {
                tracing::info!("firmware run {generation} finished");
                return Ok(RunOutcome::Finished);
            }

            // One tick at a time: keep the host serviceable even under a
            // tight guest loop.
            tokio::task::yield_now().await;
        }
    }
}

/// Traps raised by our own host imports carry a `BadgeError`; surface it
/// instead of the generic trap wrapper.
fn execution_error(e: anyhow::Error) -> BadgeError {
    match e.downcast::<BadgeError>() {
        Ok(badge) => badge,
        Err(e) => BadgeError::Execution(e),
    }
}
