// ── Connection session ──
//
// Owns one client connection. Pollers and in-flight commands feed a
// single bounded channel; the session is the only writer to the
// transport and drains that channel in arrival order. The transport is
// abstracted as a `Stream` of inbound text frames and a `Sink` of
// outbound ones, so tests can drive a session over plain channels.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Display;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::capability::{self, QueryMode};
use crate::config::{PollerSettings, SessionSettings};
use crate::error::CoreError;
use crate::poller::{Poller, PollerHandle};
use crate::protocol::{ClientMessage, EventKind, OutboundEvent, WatchRequest, parse_inbound};
use crate::resolver::Target;
use crate::router::CommandRouter;
use crate::upstream::SubscriptionKey;

pub struct Session {
    id: Uuid,
    target: Target,
    router: CommandRouter,
    poller: PollerSettings,
    settings: SessionSettings,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<OutboundEvent>,
    events_rx: mpsc::Receiver<OutboundEvent>,
    subscriptions: HashMap<SubscriptionKey, PollerHandle>,
}

impl Session {
    /// Create a session bound to `target`, cancelled together with `parent`.
    pub fn new(
        target: Target,
        poller: PollerSettings,
        settings: SessionSettings,
        parent: &CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(settings.outbound_buffer.max(1));
        Self {
            id: Uuid::new_v4(),
            router: CommandRouter::new(target.clone()),
            target,
            poller,
            settings,
            cancel: parent.child_token(),
            events_tx,
            events_rx,
            subscriptions: HashMap::new(),
        }
    }

    /// Serve the connection until the transport closes or the session is
    /// cancelled, then stop every poller.
    pub async fn run<I, O, E>(self, inbound: I, outbound: O)
    where
        I: Stream<Item = Result<String, E>> + Unpin,
        O: Sink<String> + Unpin,
        E: Display,
    {
        let span = info_span!(
            "session",
            id = %self.id,
            backend = %self.target.backend.kind(),
            region = %self.target.region,
        );
        self.serve(inbound, outbound).instrument(span).await;
    }

    async fn serve<I, O, E>(mut self, mut inbound: I, mut outbound: O)
    where
        I: Stream<Item = Result<String, E>> + Unpin,
        O: Sink<String> + Unpin,
        E: Display,
    {
        info!("session opened");

        let defaults = self.target.backend.config().default_watches.clone();
        for resource in defaults {
            let request = WatchRequest {
                resource_type: resource,
                id: None,
                region: None,
            };
            if let Err(e) = self.watch(&request) {
                warn!(resource = %request.resource_type, error = %e, "skipping default watch");
            }
        }

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("session cancelled");
                    break;
                }
                frame = inbound.next() => match frame {
                    Some(Ok(text)) => {
                        if let Some(reply) = self.handle_text(&text) {
                            if outbound.send(reply.to_json()).await.is_err() {
                                debug!("transport write failed");
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "transport read failed");
                        break;
                    }
                    None => {
                        debug!("transport closed");
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => {
                    if self.is_subscribed(&event) && outbound.send(event.to_json()).await.is_err() {
                        debug!("transport write failed");
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Handle one inbound frame. Returns an event to write directly when
    /// the message is answered without upstream work.
    fn handle_text(&mut self, text: &str) -> Option<OutboundEvent> {
        let message = match parse_inbound(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e.error, "malformed client message");
                return Some(e.into_event());
            }
        };

        match message {
            ClientMessage::Watch(request) => self.watch(&request).err().map(|e| watch_error(&request, &e)),
            ClientMessage::Unwatch(request) => self.unwatch(&request).err().map(|e| watch_error(&request, &e)),
            ClientMessage::Command(request) => match self.router.prepare(&request) {
                Ok(prepared) => {
                    let router = self.router.clone();
                    let events = self.events_tx.clone();
                    let cancel = self.cancel.child_token();
                    tokio::spawn(
                        async move {
                            let event = tokio::select! {
                                biased;
                                () = cancel.cancelled() => return,
                                event = router.execute(prepared) => event,
                            };
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => {}
                                _ = events.send(event) => {}
                            }
                        }
                        .in_current_span(),
                    );
                    None
                }
                Err(e) => {
                    info!(action = %request.action, error = %e, "command refused");
                    Some(OutboundEvent::command_result(&request, Err(&e)))
                }
            },
        }
    }

    fn subscription(&self, request: &WatchRequest) -> Result<(SubscriptionKey, QueryMode), CoreError> {
        let backend = &self.target.backend;
        let capability = capability::lookup(backend.kind(), &request.resource_type).ok_or_else(|| {
            CoreError::UnknownResource {
                backend: backend.kind(),
                resource_type: request.resource_type.clone(),
            }
        })?;
        let id = request.id.clone().filter(|id| !id.is_empty());
        if !capability.id.accepts(id.as_deref()) {
            let message = match id {
                Some(_) => format!("'{}' does not take an id", capability.resource),
                None => format!("'{}' requires an id", capability.resource),
            };
            return Err(CoreError::Protocol { message });
        }
        let region = match request.region.as_deref() {
            Some(r) => backend.resolve_region(Some(r))?,
            None => self.target.region.clone(),
        };
        Ok((SubscriptionKey::new(capability.resource, id, region), capability.mode))
    }

    /// Start a poller for the subscription unless one is already running.
    /// A poller that has stopped on its own is replaced.
    fn watch(&mut self, request: &WatchRequest) -> Result<(), CoreError> {
        let (key, mode) = self.subscription(request)?;

        let slot = match self.subscriptions.entry(key) {
            Entry::Occupied(entry) if !entry.get().is_finished() => {
                debug!(key = %entry.key(), "already watching");
                return Ok(());
            }
            Entry::Occupied(entry) => {
                debug!(key = %entry.key(), "restarting stopped poller");
                entry.remove_entry().0
            }
            Entry::Vacant(entry) => entry.into_key(),
        };

        debug!(key = %slot, "watch");
        let handle = Poller::spawn(
            slot.clone(),
            mode,
            self.target.backend.upstream().clone(),
            self.poller.clone(),
            self.events_tx.clone(),
            &self.cancel,
        );
        self.subscriptions.insert(slot, handle);
        Ok(())
    }

    fn unwatch(&mut self, request: &WatchRequest) -> Result<(), CoreError> {
        let (key, _) = self.subscription(request)?;
        if let Some(handle) = self.subscriptions.remove(&key) {
            debug!(%key, "unwatch");
            handle.stop();
        }
        Ok(())
    }

    /// State events still queued for a subscription that was unwatched
    /// are dropped. Errors and command results always go out.
    fn is_subscribed(&self, event: &OutboundEvent) -> bool {
        match event.kind {
            EventKind::Snapshot | EventKind::Update | EventKind::Delete => self
                .subscriptions
                .keys()
                .any(|key| key.describes(&event.resource_type, event.id.as_deref(), event.region.as_deref())),
            EventKind::Error | EventKind::CommandResult => true,
        }
    }

    /// Cancel everything and give pollers a short grace period to exit.
    async fn teardown(mut self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.settings.teardown_grace;
        let count = self.subscriptions.len();
        for (key, handle) in self.subscriptions.drain() {
            if !handle.shutdown(deadline).await {
                warn!(%key, "poller did not stop within grace period, aborted");
            }
        }
        info!(subscriptions = count, "session closed");
    }
}

fn watch_error(request: &WatchRequest, err: &CoreError) -> OutboundEvent {
    OutboundEvent::error(err.kind(), err.to_string()).about(
        &request.resource_type,
        request.id.as_deref(),
        request.region.as_deref(),
    )
}
