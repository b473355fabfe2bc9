//! Metering points.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A provider-side identifier for a physical meter.
///
/// Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeteringPoint {
    /// Metering point number as used by the API.
    pub id: String,
    /// Street address, when the session exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Customer the point belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

impl MeteringPoint {
    /// Creates a metering point with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: None,
            customer_id: None,
        }
    }

    /// Sets the address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the owning customer.
    #[must_use]
    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Ids are non-empty and contain no whitespace.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.is_empty() || self.id.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidData(format!(
                "invalid metering point id: {:?}",
                self.id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for MeteringPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{} ({address})", self.id),
            None => f.write_str(&self.id),
        }
    }
}
