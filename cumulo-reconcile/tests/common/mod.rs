//! Shared test doubles for the integration tests: a scripted control-plane
//! endpoint that replays canned responses and records how often it was
//! called.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cumulo_reconcile::{Backoff, Engine, Outcome, ReconcileConfig};

/// A resource snapshot as the schema layer would decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub state: String,
}

impl Snapshot {
    pub fn new(id: &str, state: &str) -> Self {
        Self {
            id: id.into(),
            state: state.into(),
        }
    }
}

/// State accessor handed to the poll engine.
pub fn state_of(snap: &Snapshot) -> &str {
    &snap.state
}

/// Fresh control-plane style id.
pub fn fresh_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

/// Install a test subscriber once, so `RUST_LOG=debug` shows engine
/// activity during a test run.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Engine tuned for tests: millisecond backoff, short deadline.
pub fn fast_engine() -> Engine {
    Engine::new(ReconcileConfig {
        timeout: Duration::from_millis(250),
        backoff: Backoff::fixed(Duration::from_millis(2)),
        conflict_rechecks: 3,
    })
}

enum Step<T> {
    Respond(Outcome<T>),
    Fail(String),
}

/// Replays queued responses in order; an optional repeat response serves
/// any calls after the queue drains.
pub struct Scripted<T> {
    queue: Mutex<VecDeque<Step<T>>>,
    repeat: Mutex<Option<Outcome<T>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Scripted<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            repeat: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue one response.
    pub fn respond(&self, outcome: Outcome<T>) -> &Self {
        self.queue.lock().unwrap().push_back(Step::Respond(outcome));
        self
    }

    /// Queue one transport-level failure.
    pub fn fail(&self, message: &str) -> &Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(Step::Fail(message.to_string()));
        self
    }

    /// Serve `outcome` for every call once the queue is drained.
    pub fn then_repeat(&self, outcome: Outcome<T>) -> &Self {
        *self.repeat.lock().unwrap() = Some(outcome);
        self
    }

    /// How many calls the endpoint has served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Serve the next scripted response.
    pub fn next(&self) -> anyhow::Result<Outcome<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.queue.lock().unwrap().pop_front() {
            return match step {
                Step::Respond(outcome) => Ok(outcome),
                Step::Fail(message) => Err(anyhow::anyhow!(message)),
            };
        }
        if let Some(outcome) = self.repeat.lock().unwrap().clone() {
            return Ok(outcome);
        }
        Err(anyhow::anyhow!("scripted endpoint ran out of responses"))
    }
}
