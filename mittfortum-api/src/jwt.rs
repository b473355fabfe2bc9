//! Identity token inspection.
//!
//! The id token carries the CRM customer id:
//!
//! ```json
//! { "sub": "...", "customerid": [ { "crmid": "1234567" } ] }
//! ```
//!
//! Signatures are NOT verified; the token came straight from the token
//! endpoint over TLS and is only read for display and scoping.

use base64::prelude::*;
use serde::Deserialize;
use tracing::{instrument, trace};

use crate::error::ApiError;

/// Claims read from the id token.
#[derive(Debug, Default, Deserialize)]
pub struct IdTokenClaims {
    /// Subject.
    pub sub: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Expiration timestamp.
    pub exp: Option<i64>,
    /// CRM customer records.
    #[serde(default, rename = "customerid")]
    pub customer_ids: Vec<CustomerRecord>,
}

/// One entry of the `customerid` claim.
#[derive(Debug, Deserialize)]
pub struct CustomerRecord {
    /// CRM customer number.
    pub crmid: Option<String>,
}

/// Decodes the payload segment of a JWT.
#[instrument(skip(token))]
pub fn decode_claims(token: &str) -> Result<IdTokenClaims, ApiError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ApiError::DataValidation(format!(
            "Invalid JWT format: expected 3 parts, got {}",
            parts.len()
        )));
    }

    let decoded = BASE64_URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .or_else(|_| BASE64_STANDARD.decode(parts[1]))
        .map_err(|e| ApiError::DataValidation(format!("Base64 decode error: {e}")))?;

    let payload = String::from_utf8(decoded)
        .map_err(|e| ApiError::DataValidation(format!("UTF-8 decode error: {e}")))?;
    trace!(len = payload.len(), "Decoded JWT payload");

    serde_json::from_str(&payload)
        .map_err(|e| ApiError::DataValidation(format!("JWT payload: {e}")))
}

/// Returns `customerid[0].crmid`.
pub fn customer_id(token: &str) -> Result<String, ApiError> {
    decode_claims(token)?
        .customer_ids
        .into_iter()
        .next()
        .and_then(|record| record.crmid)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::DataValidation("id token has no customer id".to_string()))
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let body = BASE64_URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}
