//! Tenant context for multi-tenant database operations
//!
//! Every query and mutation is scoped by the customer (tenant) identifier so
//! that several education providers share one database without ever seeing
//! each other's parents, children, emails, notes, journey events or tasks.

use crate::error::StorageError;

/// Maximum length of a customer identifier
pub const MAX_CUSTOMER_ID_LEN: usize = 50;

/// Tenant context passed to all database operations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    customer_id: String,
}

impl TenantContext {
    /// Create a tenant context, rejecting blank or oversized customer ids
    pub fn new(customer_id: impl Into<String>) -> Result<Self, StorageError> {
        let customer_id = customer_id.into();
        let trimmed = customer_id.trim();

        if trimmed.is_empty() {
            return Err(StorageError::InvalidInput("customer_id is required".into()));
        }
        if trimmed.len() > MAX_CUSTOMER_ID_LEN {
            return Err(StorageError::InvalidInput(format!(
                "customer_id must be <= {} characters",
                MAX_CUSTOMER_ID_LEN
            )));
        }

        Ok(Self {
            customer_id: trimmed.to_string(),
        })
    }

    /// Get the customer id as a string reference
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TenantContext({})", self.customer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_context() {
        let ctx = TenantContext::new("TEST-CUSTOMER-001").unwrap();
        assert_eq!(ctx.customer_id(), "TEST-CUSTOMER-001");
    }

    #[test]
    fn test_blank_customer_rejected() {
        assert!(matches!(
            TenantContext::new("   "),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(TenantContext::new("").is_err());
    }

    #[test]
    fn test_customer_id_is_trimmed() {
        let ctx = TenantContext::new("  T1 ").unwrap();
        assert_eq!(ctx.customer_id(), "T1");
        assert_eq!(ctx.to_string(), "TenantContext(T1)");
    }

    #[test]
    fn test_oversized_customer_rejected() {
        let long = "x".repeat(MAX_CUSTOMER_ID_LEN + 1);
        assert!(TenantContext::new(long).is_err());
    }
}
