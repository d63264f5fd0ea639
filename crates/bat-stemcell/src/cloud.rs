//! Cloud provider adapter boundary.
//!
//! Acceptance runs talk to an infrastructure through a `Cloud` adapter.
//! Only the part of that interface the suite relies on is modelled here:
//! adapters may decline an operation, and callers get a
//! [`CloudError::NotImplemented`] naming both the operation and the adapter.

use serde_yaml::Value;
use thiserror::Error;

/// Errors surfaced by cloud adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("`{operation}' is not implemented by {adapter}")]
    NotImplemented {
        operation: &'static str,
        adapter: &'static str,
    },
}

impl CloudError {
    /// An operation the adapter does not support.
    #[must_use]
    pub fn not_implemented(operation: &'static str, adapter: &'static str) -> Self {
        Self::NotImplemented { operation, adapter }
    }
}

/// A cloud provider adapter.
pub trait Cloud {
    /// Human-readable adapter type, used in error messages.
    fn adapter_name(&self) -> &'static str;

    /// Check that moving from the `current` to the `desired` deployment is
    /// possible on this infrastructure.
    ///
    /// # Errors
    ///
    /// Adapters that do not override this return
    /// [`CloudError::NotImplemented`].
    fn validate_deployment(&self, current: &Value, desired: &Value) -> Result<(), CloudError> {
        let _ = (current, desired);
        Err(CloudError::not_implemented(
            "validate_deployment",
            self.adapter_name(),
        ))
    }
}
