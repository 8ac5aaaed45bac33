//! Static policy tables: overlap precedence and reveal rights.

pub mod access;
pub mod reconcile;

pub use access::{allow, Role, CUSTOMER_SERVICE_DENYLIST};
pub use reconcile::{ReconcilePolicy, DEFAULT_STRUCTURED_TYPES};
