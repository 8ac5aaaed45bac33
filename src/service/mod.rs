//! PII Vault REST Service
//!
//! Exposes masking and unmasking as a REST API.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/mask` - Mask text and store originals in the vault
//! - `POST /api/v1/unmask` - Reveal placeholders permitted for `context.user_role`
//! - `POST /api/v1/detect` - Detect and score without masking
//! - `GET /api/v1/admin/vault?limit=` - List vault entries (limit ≤ 100, default 50)
//! - `GET /api/v1/audit?session_id=&limit=` - Recent audit events
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_admin_access};
pub use routes::{create_router, ErrorResponse};
pub use state::ServiceState;
