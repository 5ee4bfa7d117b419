// Shared fixtures: a scripted `Upstream` with call counters and a session
// harness that swaps the WebSocket for in-memory channels.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hashilink_core::{
    Backend, BackendConfig, BackendKind, FetchOutcome, Mutation, PollerSettings, Session,
    SessionSettings, SubscriptionKey, Target, Upstream, UpstreamError,
};

type Script = VecDeque<Result<FetchOutcome, UpstreamError>>;

// ── FakeUpstream ────────────────────────────────────────────────────

/// Replays scripted fetch outcomes per resource type. Once a script runs
/// dry, `fetch` blocks forever, like a blocking query with nothing new.
pub struct FakeUpstream {
    kind: BackendKind,
    scripts: Mutex<HashMap<String, Script>>,
    fetches: AtomicUsize,
    mutations: AtomicUsize,
    fetch_log: Mutex<Vec<(String, u64)>>,
    mutation_log: Mutex<Vec<(Mutation, String)>>,
    mutate_error: Mutex<Option<UpstreamError>>,
}

impl FakeUpstream {
    pub fn new(kind: BackendKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            scripts: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
            fetch_log: Mutex::new(Vec::new()),
            mutation_log: Mutex::new(Vec::new()),
            mutate_error: Mutex::new(None),
        })
    }

    /// Append outcomes for a resource (`"job/web"` for an id'd resource).
    pub fn script(
        &self,
        resource: &str,
        outcomes: impl IntoIterator<Item = Result<FetchOutcome, UpstreamError>>,
    ) {
        self.scripts
            .lock()
            .unwrap()
            .entry(resource.to_owned())
            .or_default()
            .extend(outcomes);
    }

    pub fn fail_mutations_with(&self, err: UpstreamError) {
        *self.mutate_error.lock().unwrap() = Some(err);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn mutate_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// `(resource, last_index)` per fetch, in call order.
    pub fn fetch_log(&self) -> Vec<(String, u64)> {
        self.fetch_log.lock().unwrap().clone()
    }

    pub fn mutation_log(&self) -> Vec<(Mutation, String)> {
        self.mutation_log.lock().unwrap().clone()
    }
}

fn script_name(key: &SubscriptionKey) -> String {
    match &key.id {
        Some(id) => format!("{}/{}", key.resource, id),
        None => key.resource.to_owned(),
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    fn backend(&self) -> BackendKind {
        self.kind
    }

    async fn fetch(&self, key: &SubscriptionKey, last_index: u64) -> Result<FetchOutcome, UpstreamError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let name = script_name(key);
        self.fetch_log.lock().unwrap().push((name.clone(), last_index));

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        match next {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }

    async fn mutate(&self, mutation: &Mutation, region: &str) -> Result<Value, UpstreamError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.mutation_log
            .lock()
            .unwrap()
            .push((mutation.clone(), region.to_owned()));
        match self.mutate_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(json!({ "EvalID": "eval-1" })),
        }
    }
}

// ── Outcome shorthands ──────────────────────────────────────────────

pub fn changed(index: u64, payload: Value) -> Result<FetchOutcome, UpstreamError> {
    Ok(FetchOutcome::Changed { index, payload })
}

pub fn unchanged(index: u64) -> Result<FetchOutcome, UpstreamError> {
    Ok(FetchOutcome::Unchanged { index })
}

pub fn gone(index: u64) -> Result<FetchOutcome, UpstreamError> {
    Ok(FetchOutcome::Gone { index })
}

pub fn transient() -> Result<FetchOutcome, UpstreamError> {
    Err(UpstreamError::Transient("connection refused".into()))
}

// ── Targets and settings ────────────────────────────────────────────

pub fn backend_config(kind: BackendKind) -> BackendConfig {
    let address = match kind {
        BackendKind::Nomad => "http://127.0.0.1:4646",
        BackendKind::Consul => "http://127.0.0.1:8500",
    };
    BackendConfig::new(kind, address.parse().unwrap())
}

pub fn target_with(config: BackendConfig, upstream: Arc<FakeUpstream>) -> Target {
    let backend = Arc::new(Backend::new(config, upstream));
    let region = backend.resolve_region(None).unwrap();
    Target { backend, region }
}

pub fn nomad_target(upstream: Arc<FakeUpstream>, read_only: bool) -> Target {
    let mut config = backend_config(BackendKind::Nomad);
    config.read_only = read_only;
    target_with(config, upstream)
}

pub fn fast_poller() -> PollerSettings {
    PollerSettings {
        wait: Duration::from_secs(5),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        max_consecutive_failures: 3,
        interval: Duration::from_secs(1),
    }
}

// ── Session harness ─────────────────────────────────────────────────

/// A running session with the transport replaced by channels.
pub struct Harness {
    pub inbound: mpsc::UnboundedSender<Result<String, String>>,
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub task: JoinHandle<()>,
    pub shutdown: CancellationToken,
}

pub fn start_session(target: Target) -> Harness {
    let (in_tx, in_rx) = mpsc::unbounded();
    let (out_tx, out_rx) = mpsc::unbounded();
    let shutdown = CancellationToken::new();
    let session = Session::new(target, fast_poller(), SessionSettings::default(), &shutdown);
    let task = tokio::spawn(session.run(in_rx, out_tx));
    Harness {
        inbound: in_tx,
        outbound: out_rx,
        task,
        shutdown,
    }
}

impl Harness {
    pub fn send(&self, message: Value) {
        self.inbound.unbounded_send(Ok(message.to_string())).unwrap();
    }

    pub fn send_raw(&self, text: &str) {
        self.inbound.unbounded_send(Ok(text.to_owned())).unwrap();
    }

    /// Next outbound event, failing the test after 10 (virtual) seconds.
    pub async fn next_event(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(10), self.outbound.next())
            .await
            .expect("timed out waiting for an event")
            .expect("session closed the transport");
        serde_json::from_str(&text).unwrap()
    }

    /// `true` if nothing arrives within `window`.
    pub async fn quiet_for(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.outbound.next()).await.is_err()
    }

    /// Close the client side and wait for the session to finish.
    pub async fn close(self) {
        drop(self.inbound);
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("session did not shut down")
            .unwrap();
    }
}
