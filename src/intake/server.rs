use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::InternalError;
use crate::intake::processor::{advance, IntakeStage, ProcessError, ProcessOutcome, SignalProcessor};
use crate::models::decision::Decision;
use crate::models::gate::{GateKind, GateResult};
use crate::models::signal::Signal;
use crate::telemetry::latency::StageLatency;
use crate::telemetry::stats::StatsSnapshot;

/// Shared state behind every route.
pub struct AppState {
    processor: Arc<SignalProcessor>,
    permits: Arc<Semaphore>,
}

impl AppState {
    /// `max_in_flight` bounds how many signals are processed at once.
    pub fn new(processor: Arc<SignalProcessor>, max_in_flight: usize) -> Self {
        Self {
            processor,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_gate: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gates: Vec<GateResult>,
}

impl IntakeResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            decision: None,
            skipped_gate: None,
            gates: Vec::new(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            ..Self::success(message)
        }
    }

    fn with_outcome(mut self, outcome: ProcessOutcome) -> Self {
        match outcome {
            ProcessOutcome::Skipped { failed, results } => {
                self.skipped_gate = Some(failed.gate);
                self.gates = results;
            }
            ProcessOutcome::Decided { decision, results } => {
                self.decision = Some(decision);
                self.gates = results;
            }
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    config_version: u64,
    decision_authority: &'static str,
    gates: Vec<GateLayout>,
    stats: StatsSnapshot,
    latency: Vec<StageLatency>,
}

#[derive(Debug, Serialize)]
struct GateLayout {
    name: String,
    kind: GateKind,
}

type Reply = (StatusCode, Json<IntakeResponse>);

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(receive_signal).fallback(not_found))
        .route("/webhook/tradingview", post(receive_signal).fallback(not_found))
        .route("/health", get(health).fallback(not_found))
        .route("/status", get(status).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Signal intake listening on http://{addr}");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn receive_signal(State(state): State<Arc<AppState>>, uri: Uri, body: Bytes) -> Reply {
    let stats = state.processor.stats();
    stats.on_received();
    debug!(stage = ?IntakeStage::Received, path = uri.path(), bytes = body.len(), "intake stage");

    let signal = match Signal::from_payload(&body) {
        Ok(signal) => signal,
        Err(e) => {
            stats.on_rejected();
            warn!("Rejected payload on {} ({} bytes): {e}", uri.path(), body.len());
            return (
                StatusCode::BAD_REQUEST,
                Json(IntakeResponse::error(format!("Invalid signal payload: {e}"))),
            );
        }
    };
    info!(
        "Signal {} received on {}: {} {} @ {}",
        signal.id,
        uri.path(),
        signal.display_symbol(),
        signal.action.as_str(),
        signal
            .price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".into())
    );

    // The permit moves into the task, and failures are recorded there, so a
    // dropped connection neither lets the next signal overtake this one nor
    // loses its ledger row.
    let permit = match state.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            let err = InternalError::Task(format!("intake closed: {e}"));
            error!("Signal {}: {err}", signal.id);
            state.processor.record_failure(&signal, &err.to_string());
            return internal_error(&err);
        }
    };

    let processor = state.processor.clone();
    let task_signal = signal.clone();
    let handle = tokio::spawn(async move {
        let _permit = permit;
        processor.process_guarded(&task_signal).await
    });

    let reply = match handle.await {
        Ok(Ok(outcome)) => {
            let message = outcome.message();
            (
                StatusCode::OK,
                Json(IntakeResponse::success(message).with_outcome(outcome)),
            )
        }
        Ok(Err(ProcessError::Ledger { outcome, source })) => {
            let message = format!("{}; ledger write failed: {source}", outcome.message());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(IntakeResponse::error(message).with_outcome(outcome)),
            )
        }
        Ok(Err(ProcessError::Internal(err))) => internal_error(&err),
        Err(join_err) => {
            let err = InternalError::Task(join_err.to_string());
            error!(
                "Signal {} ({}) failed: {err}",
                signal.id,
                signal.display_symbol()
            );
            state.processor.record_failure(&signal, &err.to_string());
            internal_error(&err)
        }
    };

    advance(&signal, IntakeStage::Responded);
    reply
}

fn internal_error(err: &InternalError) -> Reply {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(IntakeResponse::error(format!("Internal server error: {err}"))),
    )
}

async fn health() -> Json<IntakeResponse> {
    Json(IntakeResponse::success("agent is running"))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let processor = &state.processor;
    let config = processor.store().current().await;
    Json(StatusResponse {
        status: "success",
        version: env!("CARGO_PKG_VERSION"),
        config_version: config.version,
        decision_authority: processor.decision_client().name(),
        gates: processor
            .pipeline()
            .layout()
            .into_iter()
            .map(|(name, kind)| GateLayout { name, kind })
            .collect(),
        stats: processor.stats().snapshot(),
        latency: processor.latency().snapshot(),
    })
}

async fn not_found(uri: Uri) -> Reply {
    warn!("No route for {}", uri.path());
    (
        StatusCode::NOT_FOUND,
        Json(IntakeResponse::error("not found")),
    )
}
