use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, State, ws::WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
};

use hearth::envelope::{Envelope, TRACE_ID, Tracing};

use hearth_relay::error::{Error, ErrorKind, Result};
use hearth_relay::registry::Registry;
use hearth_relay::state::CachedState;

use serde::Serialize;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use tokio_util::sync::CancellationToken;

use tracing::{error, info, warn};

use crate::config::HubConfig;
use crate::hub::{Hub, SourceSummary};
use crate::responses::ErrorResponse;
use crate::websocket;

/// The header carrying the distributed-trace identifier of a command.
pub const TRACE_HEADER: &str = "x-trace-id";

/// The body of `GET /api/sources`.
#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    /// Whether a worker is connected.
    pub connected: bool,
    /// Served sources.
    pub sources: Vec<SourceSummary>,
}

/// Builds the hub routes.
///
/// - `GET /ws`: the worker endpoint
/// - `GET /api/sources`: the served sources and their roles
/// - `GET /api/state/{source}`: the state cached for a source
/// - `POST /api/command/{source}/{action}`: sends the request body as a
///   command payload and returns the worker reply. The command identifier
///   is derived from the body alone, so a command sent while another one
///   with an identical body is still pending is rejected with
///   `409 Conflict`, whatever its source and action
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/ws", get(worker_endpoint))
        .route("/api/sources", get(sources))
        .route("/api/state/{source}", get(state))
        .route("/api/command/{source}/{action}", post(command))
        .with_state(hub)
}

async fn worker_endpoint(State(hub): State<Arc<Hub>>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| async move {
        if let Err(e) = hub.accept(websocket::transport(socket)).await {
            warn!("Worker rejected: {e}");
        }
    })
}

async fn sources(State(hub): State<Arc<Hub>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        connected: hub.is_connected(),
        sources: hub.sources(),
    })
}

async fn state(
    State(hub): State<Arc<Hub>>,
    Path(source): Path<String>,
) -> std::result::Result<Json<CachedState>, ErrorResponse> {
    hub.state(&source)
        .map(Json)
        .ok_or_else(|| ErrorResponse::not_found(&format!("No cached state for `{source}`")))
}

// The identifier of the command is the digest of its payload. Two
// commands with the same body, even for different sources, cannot be in
// flight at once: the later one fails with a duplicate identifier.
async fn command(
    State(hub): State<Arc<Hub>>,
    Path((source, action)): Path<(String, String)>,
    headers: HeaderMap,
    payload: String,
) -> std::result::Result<Json<Envelope>, ErrorResponse> {
    let mut request = Envelope::new(source, action, payload);

    if let Some(trace_id) = headers
        .get(TRACE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        let mut tracing = Tracing::new();
        let _ = tracing.insert(TRACE_ID.into(), trace_id.into());
        request = request.with_tracing(tracing);
    }

    info!("Command {request}");

    hub.call_envelope(request)
        .await
        .map(Json)
        .map_err(|e| {
            warn!("Command failed: {e}");
            ErrorResponse::from(e)
        })
}

/// The hub `HTTP` server.
#[derive(Debug)]
pub struct Server {
    hub: Arc<Hub>,
    config: HubConfig,
}

impl Server {
    /// Creates a [`Server`] for the providers of a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: HubConfig) -> Self {
        Self {
            hub: Arc::new(Hub::new(registry).call_timeout(config.timeout())),
            config,
        }
    }

    /// Returns the hub.
    #[must_use]
    pub const fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Starts listening and serving in the background.
    ///
    /// # Errors
    ///
    /// The listening address cannot be bound.
    pub async fn bind(self) -> Result<ServerHandle> {
        let listen_address = self.config.listen_address();
        let listener = TcpListener::bind(listen_address).await.map_err(|e| {
            Error::new(
                ErrorKind::Transport,
                format!("Impossible to listen on `{listen_address}`: {e}"),
            )
        })?;
        let address = listener.local_addr()?;

        info!("Hub listening on `{address}`");

        let cancellation_token = CancellationToken::new();
        let signal = cancellation_token.clone();
        let app = router(Arc::clone(&self.hub));

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(e) = server.await {
                error!("Hub server failure: {e}");
            }
        });

        Ok(ServerHandle {
            address,
            hub: self.hub,
            cancellation_token,
            task,
        })
    }

    /// Serves until the signal completes, then shuts down.
    ///
    /// # Errors
    ///
    /// The listening address cannot be bound.
    pub async fn run(self, signal: impl Future<Output = ()>) -> Result<()> {
        let handle = self.bind().await?;
        signal.await;
        handle.shutdown().await;
        Ok(())
    }
}

/// A running hub server.
#[derive(Debug)]
pub struct ServerHandle {
    address: SocketAddr,
    hub: Arc<Hub>,
    cancellation_token: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Returns the bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Returns the hub.
    #[must_use]
    pub const fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Closes the worker connection and stops serving.
    pub async fn shutdown(self) {
        self.hub.shutdown().await;
        self.cancellation_token.cancel();
        if let Err(e) = self.task.await {
            error!("Hub server task failed: {e}");
        }
        info!("Hub stopped");
    }
}
