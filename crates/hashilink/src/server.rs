// ── HTTP / WebSocket server ──
//
// Routes:
//   GET /ws/{backend}           WebSocket, backend's primary region
//   GET /ws/{backend}/{region}  WebSocket, explicit region
//   GET /config.js              runtime configuration for the UI bundle
//   GET /                       redirect to the primary backend's UI
//
// Backend and region are resolved before the upgrade; a connection that
// cannot be resolved is refused with a plain HTTP error and no session
// is ever created.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt, future};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hashilink_core::{
    BackendKind, CoreError, GatewayConfig, PollerSettings, Resolver, Session, SessionSettings,
    Target,
};

// ── AppState ─────────────────────────────────────────────────────────

/// Shared, read-only server state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: Resolver,
    poller: PollerSettings,
    session: SessionSettings,
    proxy_address: String,
    config_script: String,
    shutdown: CancellationToken,
}

impl AppState {
    /// Cancelling `shutdown` ends every live session.
    pub fn new(
        resolver: Resolver,
        config: &GatewayConfig,
        proxy_address: &str,
        shutdown: CancellationToken,
    ) -> Self {
        let proxy_address = proxy_address.trim_end_matches('/').to_owned();
        let config_script = config_script(&resolver, &proxy_address);
        Self {
            inner: Arc::new(Inner {
                resolver,
                poller: config.poller.clone(),
                session: config.session.clone(),
                proxy_address,
                config_script,
                shutdown,
            }),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }
}

/// `window.*` globals the UI bundle reads at load time.
fn config_script(resolver: &Resolver, proxy_address: &str) -> String {
    let flags = |kind: BackendKind| {
        resolver
            .get(kind)
            .map_or((false, false), |b| (true, b.read_only()))
    };
    let (consul_enabled, consul_read_only) = flags(BackendKind::Consul);
    let (nomad_enabled, nomad_read_only) = flags(BackendKind::Nomad);

    let enabled: Vec<String> = resolver.backends().map(|b| format!("'{}'", b.kind())).collect();
    let endpoint = if proxy_address.is_empty() {
        "document.location.protocol + '//' + document.location.hostname + ':' \
         + (window.NOMAD_ENDPOINT_PORT || document.location.port)"
            .to_owned()
    } else {
        serde_json::Value::from(proxy_address).to_string()
    };

    [
        format!("window.CONSUL_ENABLED={consul_enabled}"),
        format!("window.CONSUL_READ_ONLY={consul_read_only}"),
        format!("window.NOMAD_ENABLED={nomad_enabled}"),
        format!("window.NOMAD_READ_ONLY={nomad_read_only}"),
        format!("window.ENABLED_SERVICES=[{}]", enabled.join(",")),
        format!("window.NOMAD_ENDPOINT={endpoint}"),
    ]
    .join("\n")
}

// ── Router ───────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/config.js", get(config_js))
        .route("/ws/{backend}", get(ws_primary_region))
        .route("/ws/{backend}/{region}", get(ws_named_region))
        .with_state(state)
}

/// Serve until the state's shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown_token();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn index(State(state): State<AppState>) -> Response {
    let Some(primary) = state.inner.resolver.backends().next() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let location = format!("{}/{}", state.inner.proxy_address, primary.kind());
    info!(%location, "redirecting /");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn config_js(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        state.inner.config_script.clone(),
    )
        .into_response()
}

// ── WebSocket ────────────────────────────────────────────────────────

#[allow(clippy::unused_async)] // Required for axum handler
async fn ws_primary_region(
    State(state): State<AppState>,
    Path(backend): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(&state, &backend, None, ws)
}

#[allow(clippy::unused_async)] // Required for axum handler
async fn ws_named_region(
    State(state): State<AppState>,
    Path((backend, region)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(&state, &backend, Some(&region), ws)
}

fn upgrade(state: &AppState, backend: &str, region: Option<&str>, ws: WebSocketUpgrade) -> Response {
    let target = match state.inner.resolver.resolve(backend, region) {
        Ok(target) => target,
        Err(e) => {
            warn!(backend, ?region, error = %e, "refusing connection");
            return refusal(&e);
        }
    };
    let state = state.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, state, target))
}

fn refusal(err: &CoreError) -> Response {
    let status = match err {
        CoreError::BackendDisabled { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::NOT_FOUND,
    };
    (status, err.to_string()).into_response()
}

/// Bridge the socket to a session: text frames in, JSON events out.
async fn handle_socket(socket: WebSocket, state: AppState, target: Target) {
    let session = Session::new(
        target,
        state.inner.poller.clone(),
        state.inner.session.clone(),
        &state.inner.shutdown,
    );
    let (sink, stream) = socket.split();

    let inbound = stream
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                // Binary, Ping, Pong -- pings are answered by axum
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });
    let outbound = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));

    session.run(Box::pin(inbound), Box::pin(outbound)).await;
}
