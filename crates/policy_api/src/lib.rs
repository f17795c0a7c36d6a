//! HTTP surface of the companion decision backend.
//!
//! Exposes `POST /v1/decide` and `POST /v1/feedback` on top of
//! [`companion_policy`], plus `/health` and `/ready` probes.

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{from_fn, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use companion_policy::{
    Action, Context, DecisionService, FeedbackSink, ServiceConfig,
};
use serde::{Deserialize, Serialize};
use std::{
    env,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tower::{timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tracing::{error, warn};
use ulid::Ulid;

const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;
/// Headroom kept between the generation timeout and the request timeout.
const GENERATE_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);

struct AppStateInner {
    service: DecisionService,
    feedback: FeedbackSink,
    ready: AtomicBool,
}

impl AppState {
    pub fn new(service: DecisionService, feedback: FeedbackSink) -> Self {
        Self(Arc::new(AppStateInner {
            service,
            feedback,
            ready: AtomicBool::new(false),
        }))
    }

    pub fn from_config(cfg: &ServiceConfig) -> Self {
        Self::new(
            DecisionService::from_config(cfg),
            FeedbackSink::new(cfg.feedback_log_path()),
        )
    }

    pub fn service(&self) -> &DecisionService {
        &self.0.service
    }

    pub fn feedback(&self) -> &FeedbackSink {
        &self.0.feedback
    }

    pub fn set_ready(&self) {
        self.0.ready.store(true, Ordering::Release);
    }

    fn is_ready(&self) -> bool {
        self.0.ready.load(Ordering::Acquire)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecideRequest {
    pub context: Context,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecideResponse {
    pub request_id: String,
    pub action: Action,
    pub policy_version: String,
    pub model_id: String,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub feedback: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn health() -> &'static str {
    "ok"
}

async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

/// Never fails for a well-formed request: remote and configuration problems
/// come back as fallback actions.
async fn decide_handler(
    State(state): State<AppState>,
    Json(req): Json<DecideRequest>,
) -> Json<DecideResponse> {
    let mut ctx = req.context;
    if ctx.timestamp == 0 {
        ctx.timestamp = chrono::Utc::now().timestamp_millis();
    }

    let outcome = state.service().decide(&ctx).await;
    Json(DecideResponse {
        request_id: Ulid::new().to_string(),
        action: outcome.decision.action,
        policy_version: outcome.decision.policy_version,
        model_id: outcome.decision.model_id,
        latency_ms: outcome.latency_ms,
    })
}

async fn feedback_handler(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Response {
    if req.request_id.trim().is_empty() || req.feedback.trim().is_empty() {
        warn!("feedback rejected: request_id and feedback required");
        return error_response(StatusCode::BAD_REQUEST, "request_id and feedback required");
    }

    match state.feedback().append(&req.request_id, &req.feedback).await {
        Ok(_) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: "ok".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!(
                request_id = %req.request_id,
                path = %state.feedback().path().display(),
                error = %err,
                "failed to record feedback"
            );
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to record feedback: {err}"),
            )
        }
    }
}

/// The desktop shell talks to the backend from a file:// origin, so CORS is
/// wide open.
async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    if req.method() == Method::OPTIONS {
        return Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
            .header(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            )
            .header(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type"),
            )
            .body(Body::empty())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR);
    }

    let mut response = next.run(req).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    Ok(response)
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/v1/decide", post(decide_handler))
        .route("/v1/feedback", post(feedback_handler))
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().unwrap_or_else(|_| {
            warn!("Invalid value for {key}='{}' – falling back to {default}", v);
            default
        }),
        Err(_) => default,
    }
}

/// Request timeout for a configured value in milliseconds (0 disables).
/// Never shorter than the generation timeout plus a margin, so `/v1/decide`
/// always gets to answer with the fallback action.
fn request_timeout(timeout_ms: u64, generate_timeout: Option<Duration>) -> Option<Duration> {
    if timeout_ms == 0 {
        return None;
    }
    let configured = Duration::from_millis(timeout_ms);
    match generate_timeout.map(|t| t + GENERATE_TIMEOUT_MARGIN) {
        Some(floor) if floor > configured => {
            warn!(
                configured_ms = timeout_ms,
                raised_ms = u64::try_from(floor.as_millis()).unwrap_or(u64::MAX),
                "request timeout below generation timeout, raising it"
            );
            Some(floor)
        }
        _ => Some(configured),
    }
}

/// Builds the router with the request timeout from `COMPANION_HTTP_TIMEOUT_MS`.
pub fn build_app(state: AppState) -> Router {
    let timeout_ms = env_u64("COMPANION_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS);
    build_app_with_timeout(state, timeout_ms)
}

pub fn build_app_with_timeout(state: AppState, timeout_ms: u64) -> Router {
    let timeout = request_timeout(timeout_ms, state.service().generate_timeout());
    if timeout.is_none() {
        tracing::info!("COMPANION_HTTP_TIMEOUT_MS=0 → request timeout disabled");
    }
    let timeout_layer = timeout.map(TimeoutLayer::new);

    let request_guards = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                (StatusCode::REQUEST_TIMEOUT, "request timed out")
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "service temporarily unavailable",
                )
            }
        }))
        .option_layer(timeout_layer)
        // `option_layer` needs both branches to share the BoxError type.
        .layer(tower::util::MapErrLayer::new(
            |e: std::convert::Infallible| -> BoxError { match e {} },
        ));

    routes()
        .with_state(state)
        .layer(from_fn(cors_middleware))
        .layer(request_guards)
}
