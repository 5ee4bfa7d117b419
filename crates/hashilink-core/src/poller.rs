// ── Subscription poller ──
//
// One background task per (session, resource, id, region). Issues
// blocking queries in a loop and turns index movement into snapshot /
// update / delete events on the session's outbound channel.
//
// Lifecycle: Starting -> Waiting -> Delivering -> Waiting -> ... -> Stopped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::capability::QueryMode;
use crate::config::PollerSettings;
use crate::error::UpstreamError;
use crate::protocol::OutboundEvent;
use crate::upstream::{FetchOutcome, SubscriptionKey, Upstream};

/// Observable poller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Starting,
    Waiting,
    Delivering,
    Stopped,
}

/// Whether the client currently holds a copy of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    /// Nothing delivered yet; the next event must be a snapshot.
    Unknown,
    Present,
    /// Delivered as missing (404). Reappearance is a fresh snapshot.
    Absent,
}

// ── PollerHandle ─────────────────────────────────────────────────────

/// Owner-side handle to a running poller.
pub struct PollerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<PollerState>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// The task has exited (cancelled, exhausted retries, or rejected).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished() || self.state() == PollerState::Stopped
    }

    /// Signal the poller to stop. Any in-flight fetch is dropped.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait until `deadline`; abort the task past it.
    ///
    /// Returns `false` if the task had to be aborted.
    pub async fn shutdown(mut self, deadline: tokio::time::Instant) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout_at(deadline, &mut self.join).await {
            Ok(_) => true,
            Err(_) => {
                self.join.abort();
                false
            }
        }
    }
}

// ── Poller ───────────────────────────────────────────────────────────

pub struct Poller {
    key: SubscriptionKey,
    mode: QueryMode,
    upstream: Arc<dyn Upstream>,
    settings: PollerSettings,
    events: mpsc::Sender<OutboundEvent>,
    cancel: CancellationToken,
    state: watch::Sender<PollerState>,
}

impl Poller {
    /// Spawn a poller under `parent`'s cancellation scope.
    pub fn spawn(
        key: SubscriptionKey,
        mode: QueryMode,
        upstream: Arc<dyn Upstream>,
        settings: PollerSettings,
        events: mpsc::Sender<OutboundEvent>,
        parent: &CancellationToken,
    ) -> PollerHandle {
        let cancel = parent.child_token();
        let (state_tx, state_rx) = watch::channel(PollerState::Starting);
        let span = info_span!(
            "poller",
            resource = key.resource,
            id = key.id.as_deref().unwrap_or(""),
            region = %key.region,
        );
        let poller = Self {
            key,
            mode,
            upstream,
            settings,
            events,
            cancel: cancel.clone(),
            state: state_tx,
        };
        let join = tokio::spawn(poller.run().instrument(span));

        PollerHandle {
            cancel,
            state: state_rx,
            join,
        }
    }

    async fn run(self) {
        let mut index: u64 = 0;
        let mut presence = Presence::Unknown;
        let mut last_payload: Option<Value> = None;
        let mut failures: u32 = 0;

        debug!("poller starting");

        loop {
            let query_index = match self.mode {
                QueryMode::Blocking => index,
                QueryMode::Interval => 0,
            };

            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.upstream.fetch(&self.key, query_index) => result,
            };

            let outcome = match result {
                Ok(outcome) => {
                    failures = 0;
                    outcome
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= self.settings.max_consecutive_failures {
                        let err = UpstreamError::Unreachable {
                            attempts: failures,
                            last_error: e.to_string(),
                        };
                        warn!(error = %err, "giving up on subscription");
                        self.finish(self.error_event(&err)).await;
                        return;
                    }
                    let delay = calculate_backoff(failures - 1, &self.settings);
                    debug!(error = %e, attempt = failures, delay_ms = delay.as_millis() as u64, "fetch failed, backing off");
                    if !self.pause(delay).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "subscription rejected by upstream");
                    self.finish(self.error_event(&e)).await;
                    return;
                }
            };

            match outcome {
                FetchOutcome::Changed { index: new, payload } => {
                    let unindexed = self.mode == QueryMode::Interval || new == 0;
                    let event = match presence {
                        Presence::Unknown | Presence::Absent => Some(self.snapshot(new, payload.clone())),
                        Presence::Present if new > 0 && new < index => {
                            debug!(old = index, new, "index went backwards, resending snapshot");
                            Some(self.snapshot(new, payload.clone()))
                        }
                        Presence::Present if unindexed && last_payload.as_ref() == Some(&payload) => None,
                        Presence::Present => Some(self.update(new, payload.clone())),
                    };
                    presence = Presence::Present;
                    index = new;
                    if unindexed {
                        last_payload = Some(payload);
                    }
                    if let Some(event) = event {
                        if !self.emit(event).await {
                            break;
                        }
                    }
                    if unindexed && !self.pause(self.settings.interval).await {
                        break;
                    }
                }
                FetchOutcome::Unchanged { index: new } => {
                    // Wait elapsed; re-issue immediately.
                    index = new;
                }
                FetchOutcome::Gone { index: new } => {
                    let event = match presence {
                        Presence::Unknown => Some(self.snapshot(new, Value::Null)),
                        Presence::Present => Some(OutboundEvent::delete(
                            self.key.resource,
                            self.key.id.as_deref(),
                            &self.key.region,
                            new,
                        )),
                        Presence::Absent => None,
                    };
                    presence = Presence::Absent;
                    last_payload = None;
                    let advanced = new > index;
                    index = new;
                    if let Some(event) = event {
                        if !self.emit(event).await {
                            break;
                        }
                    }
                    // A 404 that does not move the index would otherwise
                    // be re-queried in a tight loop.
                    if !advanced && !self.pause(self.settings.initial_backoff).await {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(PollerState::Stopped);
        debug!("poller stopped");
    }

    fn snapshot(&self, index: u64, payload: Value) -> OutboundEvent {
        OutboundEvent::snapshot(self.key.resource, self.key.id.as_deref(), &self.key.region, index, payload)
    }

    fn update(&self, index: u64, payload: Value) -> OutboundEvent {
        OutboundEvent::update(self.key.resource, self.key.id.as_deref(), &self.key.region, index, payload)
    }

    fn error_event(&self, err: &UpstreamError) -> OutboundEvent {
        OutboundEvent::error(err.kind(), err.to_string()).about(
            self.key.resource,
            self.key.id.as_deref(),
            Some(&self.key.region),
        )
    }

    /// Queue an event for the session. Returns `false` if the poller
    /// should stop (cancelled or the session is gone).
    async fn emit(&self, event: OutboundEvent) -> bool {
        self.state.send_replace(PollerState::Delivering);
        let delivered = tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        };
        self.state.send_replace(PollerState::Waiting);
        delivered
    }

    /// Deliver the event that ends this poller. `Stopped` is published
    /// first, so a re-watch racing the delivery replaces this poller.
    async fn finish(&self, event: OutboundEvent) {
        self.state.send_replace(PollerState::Stopped);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {}
            _ = self.events.send(event) => {}
        }
        debug!("poller stopped");
    }

    /// Cancel-aware sleep. Returns `false` if cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with deterministic jitter, capped at `max_backoff`.
///
/// `delay = min(initial * 2^attempt * (1 +- 25%), max)`
pub fn calculate_backoff(attempt: u32, settings: &PollerSettings) -> Duration {
    let base = settings.initial_backoff.as_secs_f64() * 2.0_f64.powi(attempt.min(30) as i32);

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (base * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter.min(settings.max_backoff.as_secs_f64()))
}
