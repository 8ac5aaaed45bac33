//! Access control gate for reveals.
//!
//! A static policy table, total over every `(role, entity_type)` pair:
//!
//! | Role | Allowed |
//! |------|---------|
//! | `admin` | every entity type |
//! | `customer_service` | every type except [`CUSTOMER_SERVICE_DENYLIST`] |
//! | anything else (`guest`) | nothing |

use serde::{Deserialize, Serialize};

use crate::types::EntityType;

/// Highest-sensitivity government identity and payment card types that
/// customer service may never reveal.
pub const CUSTOMER_SERVICE_DENYLIST: &[&str] = &["US_SSN", "SSN", "CREDIT_CARD", "IN_AADHAAR"];

/// Requesting role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full reveal rights.
    Admin,
    /// Reveal everything except the denylist.
    CustomerService,
    /// No reveal rights. Also used for absent or unrecognized roles.
    #[default]
    Guest,
}

impl Role {
    /// Parse a role label. Unknown labels map to `Guest`.
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "admin" => Self::Admin,
            "customer_service" => Self::CustomerService,
            _ => Self::Guest,
        }
    }

    /// Parse an optional role label; `None` maps to `Guest`.
    pub fn from_optional(label: Option<&str>) -> Self {
        label.map(Self::parse).unwrap_or_default()
    }

    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::CustomerService => "customer_service",
            Self::Guest => "guest",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `role` may reveal values of `entity_type`.
pub fn allow(role: Role, entity_type: &EntityType) -> bool {
    match role {
        Role::Admin => true,
        Role::CustomerService => !CUSTOMER_SERVICE_DENYLIST.contains(&entity_type.as_str()),
        Role::Guest => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_allows_everything() {
        for t in ["CREDIT_CARD", "US_SSN", "PERSON", "ANYTHING_ELSE"] {
            assert!(allow(Role::Admin, &EntityType::new(t)));
        }
    }

    #[test]
    fn test_customer_service_denylist() {
        assert!(!allow(Role::CustomerService, &EntityType::new("CREDIT_CARD")));
        assert!(!allow(Role::CustomerService, &EntityType::new("US_SSN")));
        assert!(!allow(Role::CustomerService, &EntityType::new("SSN")));
        assert!(!allow(Role::CustomerService, &EntityType::new("IN_AADHAAR")));
        assert!(allow(Role::CustomerService, &EntityType::new("EMAIL_ADDRESS")));
        assert!(allow(Role::CustomerService, &EntityType::new("PERSON")));
    }

    #[test]
    fn test_guest_and_unknown_denied() {
        assert!(!allow(Role::Guest, &EntityType::new("PERSON")));
        assert_eq!(Role::parse("superuser"), Role::Guest);
        assert_eq!(Role::parse("ADMIN"), Role::Guest);
        assert_eq!(Role::from_optional(None), Role::Guest);
        assert_eq!(Role::from_optional(Some("admin")), Role::Admin);
    }
}
