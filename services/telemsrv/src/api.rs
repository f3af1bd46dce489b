//! Provisioning and diagnostics HTTP API
//!
//! The JSON surface behind the local web UI: status, credential
//! submission, manual send, and register diagnostics. Unauthenticated on
//! purpose: it only ever serves the device's own provisioning network.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::connectivity::{Credentials, LinkState};
use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::scheduler::{CycleAttempt, CycleOutcome};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    link_state: LinkState,
    configured: bool,
    ssid: Option<String>,
    collector_url: String,
    last_cycle: Option<CycleOutcome>,
}

#[derive(Deserialize)]
struct ConfigRequest {
    ssid: String,
    password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct RegisterReading {
    address: String,
    name: &'static str,
    unit: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn router(context: Arc<AgentContext>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/config", post(submit_config))
        .route("/api/send", post(manual_send))
        .route("/api/debug/register/{address}", get(read_register))
        .route("/api/debug/registers", get(dump_registers))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// Bind and serve the API until shutdown
pub async fn serve(context: Arc<AgentContext>, shutdown: CancellationToken) -> Result<()> {
    let bind_address = context.config.api.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| AgentError::config(format!("Failed to bind {bind_address}: {e}")))?;
    info!("Provisioning API listening on {}", bind_address);

    axum::serve(listener, router(context))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AgentError::IoError(format!("API server error: {e}")))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "telemsrv",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(context): State<Arc<AgentContext>>) -> Json<StatusResponse> {
    let connectivity = context.connectivity.read().await;
    Json(StatusResponse {
        link_state: connectivity.state(),
        configured: connectivity.is_configured(),
        ssid: connectivity.ssid().map(str::to_string),
        collector_url: context.config.collector.url.clone(),
        last_cycle: context.cycles.last_outcome().await,
    })
}

async fn submit_config(
    State(context): State<Arc<AgentContext>>,
    Json(request): Json<ConfigRequest>,
) -> Response {
    let credentials = Credentials {
        ssid: request.ssid,
        password: request.password,
    };
    match context.submit_credentials(&credentials) {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Credentials stored, device is restarting".to_string(),
            }),
        )
            .into_response(),
        Err(AgentError::ConfigError(e)) => error_response(StatusCode::BAD_REQUEST, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn manual_send(State(context): State<Arc<AgentContext>>) -> Response {
    match context.cycles.try_run_cycle().await {
        CycleAttempt::Completed(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        CycleAttempt::Busy => error_response(
            StatusCode::CONFLICT,
            "A cycle is already in flight".to_string(),
        ),
        CycleAttempt::Offline => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Link is not connected".to_string(),
        ),
    }
}

async fn read_register(
    State(context): State<Arc<AgentContext>>,
    Path(raw_address): Path<String>,
) -> Response {
    let Some(address) = parse_address(&raw_address) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid register address: {raw_address}"),
        );
    };

    match context.cycles.spot_check(address).await {
        Ok((descriptor, value)) => (
            StatusCode::OK,
            Json(RegisterReading {
                address: format!("0x{:04X}", descriptor.address),
                name: descriptor.name,
                unit: descriptor.unit,
                value: Some(value),
                error: None,
            }),
        )
            .into_response(),
        Err(AgentError::BusyError(e)) => error_response(StatusCode::CONFLICT, e),
        Err(AgentError::ConfigError(e)) => error_response(StatusCode::NOT_FOUND, e),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn dump_registers(State(context): State<Arc<AgentContext>>) -> Response {
    match context.cycles.dump_registers().await {
        Ok(readings) => {
            let readings: Vec<RegisterReading> = readings
                .into_iter()
                .map(|(descriptor, reading)| {
                    let (value, error) = match reading {
                        Ok(value) => (Some(value), None),
                        Err(e) => (None, Some(e.to_string())),
                    };
                    RegisterReading {
                        address: format!("0x{:04X}", descriptor.address),
                        name: descriptor.name,
                        unit: descriptor.unit,
                        value,
                        error,
                    }
                })
                .collect();
            (StatusCode::OK, Json(readings)).into_response()
        }
        Err(AgentError::BusyError(e)) => error_response(StatusCode::CONFLICT, e),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Parse a register address given in decimal or `0x`-prefixed hex
fn parse_address(raw: &str) -> Option<u16> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    use crate::acquisition::AcquisitionEngine;
    use crate::clock::DeviceClock;
    use crate::config::AgentConfig;
    use crate::connectivity::{AccessPointProfile, ConnectivityManager, LinkDriver, StationPolicy};
    use crate::scheduler::{CycleRunner, CycleService};
    use crate::store::CredentialStore;
    use crate::uploader::Uploader;
    use gridlink_meter::{encode_float32, RegisterReader, REGISTER_CATALOG};

    struct HealthyReader;

    #[async_trait]
    impl RegisterReader for HealthyReader {
        async fn read_input_registers(
            &mut self,
            _address: u16,
            quantity: u16,
        ) -> gridlink_meter::error::Result<Vec<u16>> {
            match quantity {
                2 => {
                    let (w1, w2) = encode_float32(220.5);
                    Ok(vec![w1, w2])
                }
                _ => Ok(vec![825]),
            }
        }
    }

    struct InstantUploader;

    #[async_trait]
    impl Uploader for InstantUploader {
        async fn upload(&self, _payload: &Value) -> Result<u16> {
            Ok(200)
        }
    }

    struct AlwaysUpDriver;

    #[async_trait]
    impl LinkDriver for AlwaysUpDriver {
        async fn connect_station(&self, _credentials: &Credentials) -> Result<()> {
            Ok(())
        }
        async fn link_up(&self) -> bool {
            true
        }
        async fn start_access_point(&self, _ap: &AccessPointProfile) -> Result<()> {
            Ok(())
        }
        async fn stop_access_point(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn context_in(
        dir: &tempfile::TempDir,
        stored: Option<Credentials>,
    ) -> (Arc<AgentContext>, CancellationToken) {
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        if let Some(credentials) = &stored {
            store.save(credentials).expect("seed store");
        }

        let mut manager = ConnectivityManager::new(
            Box::new(AlwaysUpDriver),
            AccessPointProfile {
                ssid: "ap".to_string(),
                password: "pw".to_string(),
            },
            StationPolicy {
                max_attempts: 1,
                attempt_delay: Duration::from_secs(1),
            },
        );
        manager.bring_up(store.load()).await;
        let connectivity = Arc::new(RwLock::new(manager));

        let clock = DeviceClock::with_offset_hours(-3);
        let engine = AcquisitionEngine::new(
            Box::new(HealthyReader),
            REGISTER_CATALOG,
            "meter-under-test".to_string(),
            clock,
            Duration::ZERO,
        );
        let cycles = Arc::new(CycleService::new(
            CycleRunner::new(engine, Box::new(InstantUploader), clock),
            connectivity.clone(),
        ));

        let restart = CancellationToken::new();
        let context = Arc::new(AgentContext::new(
            AgentConfig::default(),
            store,
            connectivity,
            cycles,
            restart.clone(),
        ));
        (context, restart)
    }

    fn credentials() -> Option<Credentials> {
        Some(Credentials {
            ssid: "lab-network".to_string(),
            password: "hunter2".to_string(),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    async fn request(router: Router, request: Request<Body>) -> Response {
        router.oneshot(request).await.expect("handler runs")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request builds")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, _restart) = context_in(&dir, None).await;

        let response = request(router(context), get_request("/api/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "telemsrv");
    }

    #[tokio::test]
    async fn test_status_reports_provisioning_when_unconfigured() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, _restart) = context_in(&dir, None).await;

        let body = body_json(request(router(context), get_request("/api/status")).await).await;
        assert_eq!(body["link_state"], "provisioning_ap");
        assert_eq!(body["configured"], false);
        assert!(body["last_cycle"].is_null());
    }

    #[tokio::test]
    async fn test_config_submission_persists_and_requests_restart() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, restart) = context_in(&dir, None).await;
        let store = context.store.clone();

        let response = request(
            router(context),
            post_json(
                "/api/config",
                json!({"ssid": "lab-network", "password": "hunter2"}),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(restart.is_cancelled());
        assert_eq!(store.load().expect("persisted").ssid, "lab-network");
    }

    #[tokio::test]
    async fn test_config_rejects_empty_ssid() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, restart) = context_in(&dir, None).await;

        let response = request(
            router(context),
            post_json("/api/config", json!({"ssid": "", "password": "x"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!restart.is_cancelled());
    }

    #[tokio::test]
    async fn test_manual_send_runs_a_cycle_when_connected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, _restart) = context_in(&dir, credentials()).await;

        let response = request(router(context), post_json("/api/send", json!({}))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["uploaded"], true);
        assert_eq!(body["total_count"], REGISTER_CATALOG.len());
    }

    #[tokio::test]
    async fn test_manual_send_refused_while_provisioning() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, _restart) = context_in(&dir, None).await;

        let response = request(router(context), post_json("/api/send", json!({}))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_register_spot_check_accepts_hex_and_decimal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, _restart) = context_in(&dir, credentials()).await;
        let api = router(context);

        let body =
            body_json(request(api.clone(), get_request("/api/debug/register/0x000E")).await).await;
        assert_eq!(body["name"], "Frequencia");
        assert_eq!(body["value"], 220.5);

        let body = body_json(request(api, get_request("/api/debug/register/14")).await).await;
        assert_eq!(body["name"], "Frequencia");
    }

    #[tokio::test]
    async fn test_register_spot_check_unknown_address() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, _restart) = context_in(&dir, credentials()).await;

        let response = request(
            router(context),
            get_request("/api/debug/register/0xBEEF"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_full_register_dump() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (context, _restart) = context_in(&dir, credentials()).await;

        let response = request(router(context), get_request("/api/debug/registers")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let readings = body.as_array().expect("dump is an array");
        assert_eq!(readings.len(), REGISTER_CATALOG.len());
        assert!(readings.iter().all(|r| r["error"].is_null()));
    }

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("14"), Some(14));
        assert_eq!(parse_address("0x000E"), Some(0x000E));
        assert_eq!(parse_address("0XC8"), Some(0x00C8));
        assert_eq!(parse_address("bogus"), None);
        assert_eq!(parse_address("0xGG"), None);
    }
}
