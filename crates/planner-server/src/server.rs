//! HTTP server for estimation, planning and attested submission.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use gpu_planner::attest::SIGNATURE_ALG;
use gpu_planner::{
    evaluate_submission, plan, sign_attestation, verify_signature, AttestationError, Estimate,
    EstimateAssumptions, GpuSpec, Manifest, PlanCandidate, PlanRequest, PlannerError, PriceTier,
    SignedAttestation, SigningKey, Sizing, Workload,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::{AppState, Config};
use crate::error::ApiError;

/// Build the HTTP router for the planner service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/catalog", get(list_catalog))
        .route("/estimate", post(estimate_handler))
        .route("/plan", post(plan_handler))
        .route("/submit", post(submit_handler))
        .route("/attestations/verify", post(verify_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load state for `config` and serve until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Fails when state cannot be loaded or the listener cannot bind.
pub async fn run(config: Config) -> Result<()> {
    let state = AppState::load(&config)?;
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "GPU planner listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("GPU planner stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        () = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(Debug, Serialize)]
struct CatalogResponse {
    gpus: Vec<GpuSpec>,
}

async fn list_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        gpus: state.catalog.iter().cloned().collect(),
    })
}

/// Body of `POST /estimate`. Assumption overrides sit at the top level.
#[derive(Debug, Deserialize)]
pub struct EstimateBody {
    pub gpu_model: String,
    pub model_params_b: f64,
    pub tokens_b: f64,
    #[serde(default)]
    pub num_gpus: Option<u32>,
    #[serde(default)]
    pub target_time_days: Option<f64>,
    #[serde(default)]
    pub price_tier: Option<PriceTier>,
    #[serde(flatten)]
    pub assumptions: EstimateAssumptions,
}

async fn estimate_handler(
    State(state): State<AppState>,
    payload: Result<Json<EstimateBody>, JsonRejection>,
) -> Result<Json<Estimate>, ApiError> {
    let Json(body) = payload?;
    let sizing = Sizing {
        num_gpus: body.num_gpus,
        target_time_days: body.target_time_days,
    };
    let tier = body.price_tier.unwrap_or(PriceTier::OnDemand);

    let estimate = state.catalog.estimate(
        &body.gpu_model,
        &Workload::new(body.model_params_b, body.tokens_b),
        sizing,
        &body.assumptions,
        tier,
    )?;

    debug!(
        gpu_model = %estimate.gpu_model,
        num_gpus = estimate.num_gpus,
        tier = %tier,
        total_cost_usd = estimate.total_cost_usd,
        "Estimated configuration"
    );
    Ok(Json(estimate))
}

/// Body of `POST /plan`.
#[derive(Debug, Deserialize)]
pub struct PlanBody {
    pub model_params_b: f64,
    pub tokens_b: f64,
    #[serde(flatten)]
    pub request: PlanRequest,
}

#[derive(Debug, Serialize)]
struct PlanResponse {
    plans: Vec<PlanCandidate>,
}

async fn plan_handler(
    State(state): State<AppState>,
    payload: Result<Json<PlanBody>, JsonRejection>,
) -> Result<Json<PlanResponse>, ApiError> {
    let Json(body) = payload?;
    let workload = Workload::new(body.model_params_b, body.tokens_b);
    workload.validate()?;

    let plans = plan(&state.catalog, &workload, &body.request)?;
    if plans.is_empty() {
        return Err(PlannerError::NoFeasiblePlan.into());
    }
    Ok(Json(PlanResponse { plans }))
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    #[serde(flatten)]
    signed: SignedAttestation,
    alternatives: Vec<PlanCandidate>,
}

fn signing_key(state: &AppState) -> Result<&SigningKey, ApiError> {
    state
        .signing_key
        .as_ref()
        .ok_or(ApiError::Attestation(AttestationError::MissingKey(
            gpu_planner::attest::SIGNING_KEY_ENV,
        )))
}

/// Plan, evaluate and sign a job manifest.
///
/// Approved submissions return 200 and rejected ones 400; both carry the
/// signed attestation.
async fn submit_handler(
    State(state): State<AppState>,
    payload: Result<Json<Manifest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let key = signing_key(&state)?;
    let Json(manifest) = payload?;

    let decision = evaluate_submission(&state.catalog, &state.policy, manifest)?;
    let approved = decision.attestation.is_approved();
    let signed = sign_attestation(key, decision.attestation)?;

    let status = if approved {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((
        status,
        Json(SubmitResponse {
            signed,
            alternatives: decision.alternatives,
        }),
    ))
}

/// Body of `POST /attestations/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    pub attestation: Value,
    pub signature: String,
    #[serde(default)]
    pub alg: Option<String>,
}

async fn verify_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let key = signing_key(&state)?;
    let Json(body) = payload?;

    let valid = match body.alg.as_deref() {
        Some(alg) if alg != SIGNATURE_ALG => false,
        _ => verify_signature(key, &body.attestation, &body.signature)?,
    };
    Ok(Json(json!({ "valid": valid })))
}
