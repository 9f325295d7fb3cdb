//! HTTP route handlers and router assembly.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use callswarm_core::{ProviderAgent, ShortlistEntry};
use callswarm_runtime::{
    ingest_result, ApplyOutcome, IngestError, IngestOutcome, InboundResult, RuntimeError,
    Subscription, SwarmOrchestrator,
};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::{attach_bridge, BroadcastManager, ClientConnection, CLIENT_QUEUE_DEPTH};
use crate::metrics::{WEBHOOK_ACCEPTED_TOTAL, WEBHOOK_REJECTED_TOTAL};
use crate::webhook::verify_signature;

/// Path clients use to receive the event stream.
pub const WS_PATH: &str = "/api/appointments/ws";

/// Shared state behind every handler.
pub struct AppState {
    /// The one orchestrator instance.
    pub orchestrator: Arc<SwarmOrchestrator>,
    /// WebSocket fan-out.
    pub broadcast: Arc<BroadcastManager>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// Shared secret for webhook authenticity, when configured.
    pub webhook_secret: Option<String>,
    // Keeps the orchestrator-to-broadcast bridge attached.
    _bridge: Vec<Subscription>,
}

impl AppState {
    /// Wire the orchestrator's event channel into a fresh broadcast
    /// manager and assemble the shared state.
    pub fn new(
        orchestrator: Arc<SwarmOrchestrator>,
        metrics: PrometheusHandle,
        webhook_secret: Option<String>,
    ) -> Self {
        let broadcast = Arc::new(BroadcastManager::new());
        let bridge = attach_bridge(&orchestrator, &broadcast);
        Self {
            orchestrator,
            broadcast,
            metrics,
            webhook_secret,
            _bridge: bridge,
        }
    }
}

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/appointments/search", post(start_search))
        .route("/api/appointments/results/{run_id}", get(run_results))
        .route(WS_PATH, get(ws_upgrade))
        .route("/call-status", post(call_status))
        .route("/call-status/health", get(health))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    service_type: String,
    #[serde(default)]
    max_providers: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    run_id: String,
    status: &'static str,
    agents_spawned: usize,
    websocket_url: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WinnerBody {
    agent_id: String,
    provider_name: String,
    slot_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultsResponse {
    run_id: String,
    status: &'static str,
    agents: Vec<ProviderAgent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner: Option<WinnerBody>,
    ranked_shortlist: Vec<ShortlistEntry>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn response(status: StatusCode, error: &'static str, detail: String) -> Response {
        (status, Json(Self { error, detail })).into_response()
    }
}

/// Start a new run.
async fn start_search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Response {
    match state
        .orchestrator
        .start(&request.service_type, request.max_providers)
    {
        Ok(started) => {
            info!(run_id = %started.run_id, agents = started.agents.len(), "search started");
            (
                StatusCode::OK,
                Json(SearchResponse {
                    run_id: started.run_id,
                    status: "spawning",
                    agents_spawned: started.agents.len(),
                    websocket_url: WS_PATH,
                }),
            )
                .into_response()
        }
        Err(error @ RuntimeError::EmptyRegistry { .. }) => {
            ApiError::response(StatusCode::NOT_FOUND, "no_providers", error.to_string())
        }
        Err(error) => {
            ApiError::response(StatusCode::INTERNAL_SERVER_ERROR, "start_failed", error.to_string())
        }
    }
}

/// Snapshot of one run.
async fn run_results(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    let snapshot = state
        .orchestrator
        .snapshot()
        .filter(|s| s.run_id == run_id);
    match snapshot {
        Some(snapshot) => {
            let status = if snapshot.completed { "completed" } else { "running" };
            (
                StatusCode::OK,
                Json(ResultsResponse {
                    run_id: snapshot.run_id,
                    status,
                    agents: snapshot.agents,
                    winner: snapshot.winner.map(|w| WinnerBody {
                        agent_id: w.agent_id,
                        provider_name: w.provider_name,
                        slot_time: w.slot_time,
                    }),
                    ranked_shortlist: snapshot.shortlist,
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ResultsResponse {
                run_id,
                status: "unknown",
                agents: vec![],
                winner: None,
                ranked_shortlist: vec![],
            }),
        )
            .into_response(),
    }
}

/// Upgrade to the event-stream WebSocket.
async fn ws_upgrade(State(state): State<Arc<AppState>>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(CLIENT_QUEUE_DEPTH);
    let id = format!("ws_{}", Uuid::now_v7().simple());
    state
        .broadcast
        .add(Arc::new(ClientConnection::new(id.clone(), tx)));
    debug!(conn_id = %id, "websocket client connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame.as_str().into())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Event stream is one-way; inbound frames are ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broadcast.remove(&id);
    debug!(conn_id = %id, "websocket client disconnected");
}

#[derive(Debug, Serialize)]
struct IngestAck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<bool>,
}

/// Inbound webhook results from the voice platform.
async fn call_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<InboundResult>,
) -> Response {
    if !verify_signature(&headers, state.webhook_secret.as_deref()) {
        counter!(WEBHOOK_REJECTED_TOTAL, "reason" => "signature").increment(1);
        warn!(run_id = %payload.run_id, "webhook signature rejected");
        return ApiError::response(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "signature header missing or wrong".to_string(),
        );
    }

    match ingest_result(&state.orchestrator, &payload) {
        Ok(IngestOutcome::Progress { applied }) => {
            counter!(WEBHOOK_ACCEPTED_TOTAL).increment(1);
            (
                StatusCode::OK,
                Json(IngestAck {
                    status: "accepted",
                    result: None,
                    applied: Some(applied),
                }),
            )
                .into_response()
        }
        Ok(IngestOutcome::Terminal(outcome)) => {
            counter!(WEBHOOK_ACCEPTED_TOTAL).increment(1);
            let result = match outcome {
                ApplyOutcome::Booked => "booked",
                ApplyOutcome::Rejected => "rejected",
                ApplyOutcome::Cancelled => "cancelled",
            };
            (
                StatusCode::OK,
                Json(IngestAck {
                    status: "completed",
                    result: Some(result),
                    applied: None,
                }),
            )
                .into_response()
        }
        Err(error) => {
            let (status, label, kind) = match &error {
                IngestError::Runtime(RuntimeError::AgentAlreadyTerminal { .. }) => {
                    (StatusCode::CONFLICT, "conflict", "agent_terminal")
                }
                IngestError::Runtime(
                    RuntimeError::NoActiveRun
                    | RuntimeError::UnknownRun { .. }
                    | RuntimeError::UnknownAgent { .. },
                ) => (StatusCode::NOT_FOUND, "correlation", "unknown_correlation"),
                IngestError::Runtime(RuntimeError::EmptyRegistry { .. })
                | IngestError::UnrecognizedTool { .. }
                | IngestError::MissingToolParam { .. }
                | IngestError::MalformedSlot { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "validation", "malformed")
                }
            };
            counter!(WEBHOOK_REJECTED_TOTAL, "reason" => label).increment(1);
            warn!(run_id = %payload.run_id, agent_id = %payload.agent_id, %error, "webhook rejected");
            ApiError::response(status, kind, error.to_string())
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> String {
    crate::metrics::render(&state.metrics)
}
