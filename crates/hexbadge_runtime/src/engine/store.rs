use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::engine::config::RuntimeOptions;
use crate::engine::dispatch::HttpBackend;
use crate::engine::runtime::{FrameHandler, LifecycleState};
use crate::timer::TimerRegistry;

/// State shared between the runtime handle, the run loop, and dispatch tasks.
/// Lives for the whole runtime lifetime and survives guest restarts.
pub(crate) struct SharedState {
    /// Current run generation. Advancing it is the stop signal: the run loop
    /// exits as soon as the value moves past its own generation.
    pub(crate) generation: AtomicU64,
    pub(crate) lifecycle: Mutex<LifecycleState>,
    /// Host→guest FIFO queue of `(correlation_id, encoded payload)` pairs.
    /// Id 0 marks unsolicited events; nonzero ids tie responses to requests.
    pub(crate) host_queue: Mutex<VecDeque<(u32, Vec<u8>)>>,
    pub(crate) frame_handler: Mutex<Option<FrameHandler>>,
    pub(crate) options: RuntimeOptions,
    pub(crate) http: Arc<dyn HttpBackend>,
}

impl SharedState {
    pub(crate) fn new(options: RuntimeOptions, http: Arc<dyn HttpBackend>) -> Self {
        Self {
            generation: AtomicU64::new(0),
            lifecycle: Mutex::new(LifecycleState::Idle),
            host_queue: Mutex::new(VecDeque::new()),
            frame_handler: Mutex::new(None),
            options,
            http,
        }
    }

    pub(crate) fn enqueue(&self, correlation_id: u32, payload: Vec<u8>) {
        self.host_queue
            .lock()
            .unwrap()
            .push_back((correlation_id, payload));
    }

    /// Enqueue a response only while its originating run is still the live
    /// one; responses addressed to a retired run are discarded.
    pub(crate) fn enqueue_for_generation(
        &self,
        generation: u64,
        correlation_id: u32,
        payload: Vec<u8>,
    ) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.enqueue(correlation_id, payload);
        true
    }

    /// `(id, len)` of the queue head without removing it; `(0, 0)` when empty.
    pub(crate) fn peek_head(&self) -> (u32, u32) {
        let queue = self.host_queue.lock().unwrap();
        match queue.front() {
            Some((id, payload)) => (*id, payload.len() as u32),
            None => (0, 0),
        }
    }

    /// Drop undelivered responses addressed to retired runs. Unsolicited
    /// (id 0) events survive restarts; request ids restart at 1 per run, so
    /// a stale response left queued would collide with the new run's ids.
    pub(crate) fn purge_responses(&self) {
        let mut queue = self.host_queue.lock().unwrap();
        let before = queue.len();
        queue.retain(|(id, _)| *id == 0);
        let dropped = before - queue.len();
        if dropped > 0 {
            tracing::debug!("dropped {dropped} undelivered response message(s) from a retired run");
        }
    }

    pub(crate) fn set_lifecycle(&self, state: LifecycleState) {
        *self.lifecycle.lock().unwrap() = state;
    }

    pub(crate) fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.lock().unwrap()
    }
}

/// Per-run store data; every host import closes over this through the
/// wasmtime `Caller`.
pub(crate) struct RunStore {
    /// Wall-clock start of this run; drives `extern_get_millis`.
    pub(crate) started_at: Instant,
    /// Generation this run was started under.
    pub(crate) generation: u64,
    /// Last guest→host request id handed out. Ids start at 1 and are never
    /// reused within a run; a new run resets them.
    pub(crate) last_request_id: u32,
    pub(crate) timers: TimerRegistry,
    pub(crate) shared: Arc<SharedState>,
}

impl RunStore {
    pub(crate) fn new(generation: u64, shared: Arc<SharedState>) -> Self {
        Self {
            started_at: Instant::now(),
            generation,
            last_request_id: 0,
            timers: TimerRegistry::new(),
            shared,
        }
    }
}
