//! Axum routes for the PII vault service.

use axum::{
    extract::{Json, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::detect::DetectionReport;
use crate::masker::{MaskError, MaskedEntity};
use crate::policy::Role;
use crate::store::VaultBackend;
use crate::types::{context_str, AuditEvent, ContextMap};
use crate::unmasker::{RevealedEntity, UnmaskError};
use crate::vault::VaultListing;

use super::middleware::record_admin_access;
use super::state::ServiceState;

/// Default page size for listing endpoints.
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Maximum page size for listing endpoints.
pub const MAX_LIST_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to mask text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskRequest {
    /// Text to mask.
    pub text: String,
    /// Session that owns the tokens.
    pub session_id: String,
    /// Request context (`user_id`, `user_role`, `purpose`, ...).
    #[serde(default)]
    pub context: ContextMap,
}

/// Request to unmask text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmaskRequest {
    /// Masked text.
    pub text: String,
    /// Session the tokens belong to.
    pub session_id: String,
    /// Request context. `user_role` selects the reveal policy.
    #[serde(default)]
    pub context: ContextMap,
}

/// Request to detect without masking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Text to scan.
    pub text: String,
}

/// Mask response.
#[derive(Debug, Clone, Serialize)]
pub struct MaskResponse {
    /// Always true on a 200.
    pub success: bool,
    /// Masked text.
    pub masked_text: String,
    /// Masked entities, ascending by start.
    pub entities: Vec<MaskedEntity>,
    /// Echoed session id.
    pub session_id: String,
    /// Risk score.
    pub risk_score: f64,
    /// Detection diagnostics.
    pub metadata: DetectionReport,
    /// Audit record id.
    pub audit_id: String,
}

/// Unmask response.
#[derive(Debug, Clone, Serialize)]
pub struct UnmaskResponse {
    /// Always true on a 200.
    pub success: bool,
    /// Text with authorized placeholders revealed.
    pub unmasked_text: String,
    /// Revealed entities.
    pub entities_unmasked: Vec<RevealedEntity>,
    /// Audit record id.
    pub audit_id: String,
}

/// Detect response.
#[derive(Debug, Clone, Serialize)]
pub struct DetectResponse {
    /// Always true on a 200.
    pub success: bool,
    /// Reconciled entities.
    pub entities: Vec<MaskedEntity>,
    /// Risk score.
    pub risk_score: f64,
    /// Detection diagnostics.
    pub metadata: DetectionReport,
}

/// Pagination query for listing endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Page size (default 50, capped at 100).
    pub limit: Option<usize>,
    /// Restrict to one session (audit listing only).
    pub session_id: Option<String>,
}

impl ListQuery {
    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

/// Vault listing response.
#[derive(Debug, Clone, Serialize)]
pub struct VaultListResponse {
    /// Number of rows.
    pub count: usize,
    /// Rows.
    pub entries: Vec<VaultListing>,
}

/// Audit listing response.
#[derive(Debug, Clone, Serialize)]
pub struct AuditListResponse {
    /// Number of events.
    pub count: usize,
    /// Events, newest first.
    pub events: Vec<AuditEvent>,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Vault backend in use.
    pub backend: String,
    /// Per-component status.
    pub components: ComponentHealth,
}

/// Component health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Always `healthy` when responding.
    pub api: String,
    /// Vault backend reachability.
    pub vault: String,
    /// Audit sink reachability.
    pub audit: String,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `alive`.
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether traffic may be routed here.
    pub ready: bool,
    /// Vault backend reachability.
    pub vault: bool,
    /// Failure detail.
    pub details: Option<String>,
}

/// Structured error response with correlation ID for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Correlation ID for request tracing (matches X-Cloud-Trace-Context when present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            correlation_id: None,
            details: None,
        }
    }

    /// Add a correlation ID to the error.
    pub fn with_correlation_id(mut self, id: Option<String>) -> Self {
        self.correlation_id = id;
        self
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Error paired with its HTTP status.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: ErrorResponse) -> ApiError {
    tracing::warn!(
        status = status.as_u16(),
        code = %error.code,
        error = %error.error,
        correlation_id = ?error.correlation_id,
        "Request error"
    );
    (status, Json(error))
}

impl From<MaskError> for ErrorResponse {
    fn from(e: MaskError) -> Self {
        match e {
            MaskError::VaultUnavailable(_) => Self::new("VAULT_UNAVAILABLE", "Vault unavailable, text was not masked"),
            MaskError::InvalidSpan { .. } => Self::new("DETECTION_FAILED", "Detector returned an invalid span"),
        }
    }
}

impl From<UnmaskError> for ErrorResponse {
    fn from(e: UnmaskError) -> Self {
        match e {
            UnmaskError::VaultUnavailable(_) => Self::new("VAULT_UNAVAILABLE", "Vault unavailable, text was not unmasked"),
        }
    }
}

fn correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Cloud-Trace-Context")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split('/').next().unwrap_or(s).to_string())
}

fn require_session(session_id: &str, headers: &HeaderMap) -> Result<(), ApiError> {
    if session_id.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("INVALID_SESSION_ID", "session_id must not be empty")
                .with_correlation_id(correlation_id(headers)),
        ));
    }
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Mask text and store originals in the vault.
async fn mask_handler<B: VaultBackend + 'static>(
    State(state): State<Arc<ServiceState<B>>>,
    headers: HeaderMap,
    Json(request): Json<MaskRequest>,
) -> Result<Json<MaskResponse>, ApiError> {
    require_session(&request.session_id, &headers)?;

    let outcome = state
        .masker
        .mask(&request.session_id, &request.text, &request.context)
        .await
        .map_err(|e| {
            let status = match e {
                MaskError::VaultUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                MaskError::InvalidSpan { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let details = e.to_string();
            api_error(
                status,
                ErrorResponse::from(e)
                    .with_details(details)
                    .with_correlation_id(correlation_id(&headers)),
            )
        })?;

    Ok(Json(MaskResponse {
        success: true,
        masked_text: outcome.masked_text,
        entities: outcome.entities,
        session_id: request.session_id,
        risk_score: outcome.risk_score,
        metadata: outcome.report,
        audit_id: outcome.audit_id,
    }))
}

/// Reveal placeholders the caller's role may see.
async fn unmask_handler<B: VaultBackend + 'static>(
    State(state): State<Arc<ServiceState<B>>>,
    headers: HeaderMap,
    Json(request): Json<UnmaskRequest>,
) -> Result<Json<UnmaskResponse>, ApiError> {
    require_session(&request.session_id, &headers)?;

    let role = Role::from_optional(context_str(&request.context, "user_role"));
    let outcome = state
        .unmasker
        .unmask(&request.session_id, &request.text, role, &request.context)
        .await
        .map_err(|e| {
            let details = e.to_string();
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::from(e)
                    .with_details(details)
                    .with_correlation_id(correlation_id(&headers)),
            )
        })?;

    Ok(Json(UnmaskResponse {
        success: true,
        unmasked_text: outcome.text,
        entities_unmasked: outcome.revealed,
        audit_id: outcome.audit_id,
    }))
}

/// Detect and score without masking.
async fn detect_handler<B: VaultBackend + 'static>(
    State(state): State<Arc<ServiceState<B>>>,
    Json(request): Json<DetectRequest>,
) -> Json<DetectResponse> {
    let outcome = state.masker.detect(&request.text).await;
    Json(DetectResponse {
        success: true,
        entities: outcome.entities,
        risk_score: outcome.risk_score,
        metadata: outcome.report,
    })
}

/// List vault entries (administrative).
async fn admin_vault_handler<B: VaultBackend + 'static>(
    State(state): State<Arc<ServiceState<B>>>,
    Query(query): Query<ListQuery>,
) -> Json<VaultListResponse> {
    let limit = query.effective_limit();
    let entries = state.vault.list(limit).await;
    record_admin_access("vault_list", entries.len());
    Json(VaultListResponse {
        count: entries.len(),
        entries,
    })
}

/// List recent audit events.
async fn audit_handler<B: VaultBackend + 'static>(
    State(state): State<Arc<ServiceState<B>>>,
    Query(query): Query<ListQuery>,
) -> Json<AuditListResponse> {
    let limit = query.effective_limit();
    let events = state.audit.recent(query.session_id.as_deref(), limit).await;
    record_admin_access("audit_list", events.len());
    Json(AuditListResponse {
        count: events.len(),
        events,
    })
}

/// Health check endpoint (detailed).
async fn health_handler<B: VaultBackend + 'static>(
    State(state): State<Arc<ServiceState<B>>>,
) -> Json<HealthResponse> {
    let vault_healthy = state.vault.is_healthy().await;
    let audit_healthy = state.audit.is_healthy().await;
    let label = |ok: bool| if ok { "healthy" } else { "unhealthy" }.to_string();

    Json(HealthResponse {
        status: if vault_healthy && audit_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.backend_kind.to_string(),
        components: ComponentHealth {
            api: "healthy".to_string(),
            vault: label(vault_healthy),
            audit: label(audit_healthy),
        },
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the vault backend is reachable, 503 otherwise.
async fn readiness_handler<B: VaultBackend + 'static>(
    State(state): State<Arc<ServiceState<B>>>,
) -> impl IntoResponse {
    if state.vault.is_healthy().await {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                vault: true,
                details: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                vault: false,
                details: Some("Vault backend unreachable".to_string()),
            }),
        )
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the PII vault service.
pub fn create_router<B: VaultBackend + 'static>(state: ServiceState<B>) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Masking
        .route("/api/v1/mask", post(mask_handler::<B>))
        .route("/api/v1/unmask", post(unmask_handler::<B>))
        .route("/api/v1/detect", post(detect_handler::<B>))
        // Administration
        .route("/api/v1/admin/vault", get(admin_vault_handler::<B>))
        .route("/api/v1/audit", get(audit_handler::<B>))
        // Health checks
        .route("/health", get(health_handler::<B>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<B>))
        .with_state(state)
}
