use std::{
    ffi::OsString,
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use axum::{
    Form, Json, Router,
    extract::{
        DefaultBodyLimit, FromRequest, Multipart, Request, State, multipart::MultipartRejection,
    },
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
    admission::AdmissionController,
    artifact::TempArtifact,
    config::ServiceConfig,
    error::GatewayError,
    logging::{
        category_access, category_decode, category_encode, category_health, method_label,
        status_label,
    },
    metrics::{MetricsRegistry, MetricsSnapshot, Operation, SharedMetrics},
    parser::{DecodeResult, parse_decode_output},
    process::ProcessRunner,
    system::{SystemSample, is_executable, sample_system},
};

mod handlers;

use handlers::*;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const RIFF_SIGNATURE: &[u8; 4] = b"RIFF";
const SERVICE_NAME: &str = "fsk-http";

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<ServiceConfig>,
    pub metrics: SharedMetrics,
    pub admission: AdmissionController,
    pub runner: ProcessRunner,
}

impl SharedState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            admission: AdmissionController::new(config.max_concurrent_requests),
            runner: ProcessRunner::new(config.request_timeout),
            metrics: Arc::new(MetricsRegistry::new()),
            config: Arc::new(config),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Admission and accounting stage wrapped around one operation route.
#[derive(Clone)]
struct OperationStage {
    state: SharedState,
    operation: Operation,
}

pub fn build_app(state: SharedState) -> Router {
    let mut router = Router::new()
        .route(
            "/encode",
            gated(post(encode_handler), &state, Operation::Encode),
        )
        .route(
            "/decode",
            gated(post(decode_handler), &state, Operation::Decode),
        )
        .route("/metrics", get(metrics_handler));
    if state.config.health_check_enabled {
        router = router.route("/health", get(health_handler));
    }
    router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn(access_log_middleware))
        .with_state(state)
}

fn gated(
    route: MethodRouter<SharedState>,
    state: &SharedState,
    operation: Operation,
) -> MethodRouter<SharedState> {
    let stage = OperationStage {
        state: state.clone(),
        operation,
    };
    route.layer(middleware::from_fn_with_state(stage, operation_stage_middleware))
}

/// Rejects immediately when no permit is free; otherwise holds the permit and
/// an in-flight record until the handler has produced its response. A 2xx
/// status counts as success.
async fn operation_stage_middleware(
    State(stage): State<OperationStage>,
    request: Request,
    next: Next,
) -> Response {
    let permit = match stage.state.admission.try_acquire() {
        Ok(permit) => permit,
        Err(overloaded) => {
            warn!(
                "{} rejected {} request: {overloaded}",
                category_access(),
                stage.operation.as_str()
            );
            return GatewayError::from(overloaded).into_response();
        }
    };
    let in_flight = stage.state.metrics.begin(stage.operation);

    let response = next.run(request).await;

    in_flight.finish(response.status().is_success());
    drop(permit);
    response
}

async fn access_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();

    info!(
        "{} {} {} {} {}ms",
        category_access(),
        method_label(method.as_str()),
        status_label(response.status().as_u16()),
        uri,
        elapsed_ms
    );
    response
}

#[derive(Debug, Deserialize)]
struct EncodeRequest {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct DecodeResponse {
    #[serde(flatten)]
    result: DecodeResult,
    processing_thread: String,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    timestamp_unix_ms: u64,
    service: &'static str,
    version: &'static str,
    thread_pool: ThreadPoolReport,
    system: SystemSample,
    service_metrics: MetricsSnapshot,
    binaries: BinaryReport,
    configuration: ConfigurationReport,
}

#[derive(Debug, Serialize)]
struct ThreadPoolReport {
    max_workers: usize,
    runtime_workers: usize,
}

#[derive(Debug, Serialize)]
struct BinaryReport {
    to_file: bool,
    from_file: bool,
}

#[derive(Debug, Serialize)]
struct ConfigurationReport {
    max_concurrent_requests: usize,
    request_timeout: u64,
    log_level: String,
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
