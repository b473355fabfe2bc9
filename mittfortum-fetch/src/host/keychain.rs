//! Secure credential storage using the system keychain.
//!
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)
//!
//! Values are plain strings; [`get_json`] and [`set_json`] layer serde on top
//! for structured secrets such as the OAuth token set.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keyring::Entry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{FetchError, KeychainError};

/// Service name prefix for `MittFortum` credentials.
const SERVICE_PREFIX: &str = "mittfortum";

// ============================================================================
// Keychain API Trait
// ============================================================================

/// API for secure credential storage.
#[async_trait]
pub trait KeychainApi: Send + Sync {
    /// Get a credential from the keychain.
    ///
    /// # Returns
    /// * `Ok(Some(secret))` - Credential found
    /// * `Ok(None)` - Credential not found
    /// * `Err(e)` - Error accessing keychain
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError>;

    /// Set a credential in the keychain, replacing any previous value.
    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError>;

    /// Delete a credential. Deleting a missing credential is not an error.
    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError>;

    /// Check if a credential exists.
    async fn exists(&self, service: &str, account: &str) -> bool {
        matches!(self.get(service, account).await, Ok(Some(_)))
    }
}

/// Reads a JSON-encoded credential.
pub async fn get_json<T: DeserializeOwned>(
    keychain: &dyn KeychainApi,
    service: &str,
    account: &str,
) -> Result<Option<T>, FetchError> {
    match keychain.get(service, account).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Stores a value as a JSON-encoded credential.
pub async fn set_json<T: Serialize + ?Sized>(
    keychain: &dyn KeychainApi,
    service: &str,
    account: &str,
    value: &T,
) -> Result<(), FetchError> {
    let raw = serde_json::to_string(value)?;
    keychain.set(service, account, &raw).await?;
    Ok(())
}

// ============================================================================
// System Keychain Implementation
// ============================================================================

/// Default implementation backed by the `keyring` crate.
#[derive(Debug, Clone, Default)]
pub struct SystemKeychain;

impl SystemKeychain {
    /// Creates a new system keychain instance.
    pub fn new() -> Self {
        Self
    }

    /// Builds the full service name with prefix.
    fn full_service(service: &str) -> String {
        format!("{SERVICE_PREFIX}:{service}")
    }

    fn entry(service: &str, account: &str) -> Result<Entry, KeychainError> {
        let full_service = Self::full_service(service);
        Entry::new(&full_service, account).map_err(|e| KeychainError::Platform(e.to_string()))
    }
}

#[async_trait]
impl KeychainApi for SystemKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        debug!(service = %service, account = %account, "Getting credential from keychain");

        let entry = Self::entry(service, account)?;

        match entry.get_password() {
            Ok(secret) if secret.is_empty() => Ok(None),
            Ok(secret) => {
                debug!(service = %service, account = %account, "Credential found");
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service = %service, account = %account, "Credential not found");
                Ok(None)
            }
            Err(e) => {
                warn!(service = %service, account = %account, error = %e, "Failed to get credential");
                Err(e.into())
            }
        }
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        debug!(service = %service, account = %account, "Setting credential in keychain");

        let entry = Self::entry(service, account)?;

        entry.set_password(secret).map_err(|e| {
            warn!(service = %service, account = %account, error = %e, "Failed to set credential");
            KeychainError::from(e)
        })?;

        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        debug!(service = %service, account = %account, "Deleting credential from keychain");

        let entry = Self::entry(service, account)?;

        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!(service = %service, account = %account, error = %e, "Failed to delete credential");
                Err(e.into())
            }
        }
    }
}

// ============================================================================
// In-Memory Keychain
// ============================================================================

/// Process-local keychain, for tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryKeychain {
    /// Creates an empty keychain.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), String>>, KeychainError> {
        self.entries
            .lock()
            .map_err(|_| KeychainError::Other("keychain lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeychainApi for MemoryKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        Ok(self
            .lock()?
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        self.lock()?
            .insert((service.to_string(), account.to_string()), secret.to_string());
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        self.lock()?
            .remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}

// ============================================================================
// Credential Keys
// ============================================================================

/// Service names.
pub mod services {
    /// Fortum customer account.
    pub const FORTUM: &str = "fortum";
}

/// Account names.
pub mod accounts {
    /// Serialized OAuth token set.
    pub const TOKEN_SET: &str = "token_set";
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Secret {
        token: String,
    }

    #[test]
    fn test_full_service_name() {
        assert_eq!(SystemKeychain::full_service("fortum"), "mittfortum:fortum");
    }

    #[tokio::test]
    async fn test_memory_keychain_round_trip() {
        let keychain = MemoryKeychain::new();
        assert!(!keychain.exists(services::FORTUM, accounts::TOKEN_SET).await);

        keychain
            .set(services::FORTUM, accounts::TOKEN_SET, "abc")
            .await
            .unwrap();
        assert!(keychain.exists(services::FORTUM, accounts::TOKEN_SET).await);

        keychain
            .delete(services::FORTUM, accounts::TOKEN_SET)
            .await
            .unwrap();
        keychain
            .delete(services::FORTUM, accounts::TOKEN_SET)
            .await
            .unwrap();
        assert!(!keychain.exists(services::FORTUM, accounts::TOKEN_SET).await);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let keychain = MemoryKeychain::new();
        let value = Secret {
            token: "t1".to_string(),
        };
        set_json(&keychain, services::FORTUM, accounts::TOKEN_SET, &value)
            .await
            .unwrap();

        let loaded: Option<Secret> = get_json(&keychain, services::FORTUM, accounts::TOKEN_SET)
            .await
            .unwrap();
        assert_eq!(loaded, Some(value));

        keychain
            .set(services::FORTUM, accounts::TOKEN_SET, "{not json")
            .await
            .unwrap();
        let broken: Result<Option<Secret>, _> =
            get_json(&keychain, services::FORTUM, accounts::TOKEN_SET).await;
        assert!(matches!(broken, Err(FetchError::Json(_))));
    }
}
