//! Token set storage.
//!
//! [`KeychainTokenStore`] keeps the token set in the system keychain. When
//! the platform has no usable keychain (headless Linux without a secret
//! service, locked keychain) it falls back to a [`FileTokenStore`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mittfortum_core::{CoreError, SecretStore, TokenSet};
use mittfortum_fetch::host::keychain::{accounts, get_json, services, set_json};
use mittfortum_fetch::{FetchError, KeychainApi, KeychainError};
use tracing::{debug, instrument, warn};

use crate::error::StoreError;
use crate::persistence::{load_json_opt, remove_if_exists, save_json};

// ============================================================================
// File Store
// ============================================================================

/// Token set in an owner-only JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Uses the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Option<TokenSet>, StoreError> {
        let token: Option<TokenSet> = load_json_opt(&self.path).await?;
        if let Some(token) = &token {
            token
                .validate()
                .map_err(|e| StoreError::Invalid(format!("{}: {e}", self.path.display())))?;
        }
        Ok(token)
    }
}

#[async_trait]
impl SecretStore for FileTokenStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load_token(&self) -> Result<Option<TokenSet>, CoreError> {
        Ok(self.load().await?)
    }

    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    async fn save_token(&self, token: &TokenSet) -> Result<(), CoreError> {
        save_json(&self.path, token).await?;
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), CoreError> {
        remove_if_exists(&self.path).await?;
        Ok(())
    }
}

// ============================================================================
// Keychain Store
// ============================================================================

/// Token set in the system keychain.
pub struct KeychainTokenStore {
    keychain: Arc<dyn KeychainApi>,
    fallback: Option<FileTokenStore>,
}

impl KeychainTokenStore {
    /// Keychain only.
    pub fn new(keychain: Arc<dyn KeychainApi>) -> Self {
        Self {
            keychain,
            fallback: None,
        }
    }

    /// Falls back to `file` when the keychain is unusable.
    #[must_use]
    pub fn with_fallback(mut self, file: FileTokenStore) -> Self {
        self.fallback = Some(file);
        self
    }

    fn fallback_for(&self, err: &FetchError) -> Option<&FileTokenStore> {
        let unusable = matches!(
            err,
            FetchError::Keychain(KeychainError::AccessDenied | KeychainError::Platform(_))
        );
        if unusable {
            if let Some(file) = &self.fallback {
                warn!(error = %err, path = %file.path().display(), "Keychain unavailable, using token file");
                return Some(file);
            }
        }
        None
    }
}

impl std::fmt::Debug for KeychainTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainTokenStore")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

fn keychain_error(err: FetchError) -> CoreError {
    StoreError::from(err).into()
}

#[async_trait]
impl SecretStore for KeychainTokenStore {
    #[instrument(skip(self))]
    async fn load_token(&self) -> Result<Option<TokenSet>, CoreError> {
        let loaded: Result<Option<TokenSet>, FetchError> =
            get_json(self.keychain.as_ref(), services::FORTUM, accounts::TOKEN_SET).await;
        match loaded {
            Ok(Some(token)) => {
                debug!("Loaded token set from keychain");
                Ok(Some(token))
            }
            Ok(None) => match &self.fallback {
                // A token saved while the keychain was down still counts.
                Some(file) => file.load_token().await,
                None => Ok(None),
            },
            Err(err) => match self.fallback_for(&err) {
                Some(file) => file.load_token().await,
                None => Err(keychain_error(err)),
            },
        }
    }

    #[instrument(skip(self, token))]
    async fn save_token(&self, token: &TokenSet) -> Result<(), CoreError> {
        let saved = set_json(
            self.keychain.as_ref(),
            services::FORTUM,
            accounts::TOKEN_SET,
            token,
        )
        .await;
        match saved {
            Ok(()) => {
                debug!("Saved token set to keychain");
                if let Some(file) = &self.fallback {
                    file.clear_token().await?;
                }
                Ok(())
            }
            Err(err) => match self.fallback_for(&err) {
                Some(file) => file.save_token(token).await,
                None => Err(keychain_error(err)),
            },
        }
    }

    async fn clear_token(&self) -> Result<(), CoreError> {
        let cleared = self
            .keychain
            .delete(services::FORTUM, accounts::TOKEN_SET)
            .await
            .map_err(FetchError::from);
        if let Some(file) = &self.fallback {
            file.clear_token().await?;
        }
        match cleared {
            Ok(()) => Ok(()),
            Err(err) if self.fallback_for(&err).is_some() => Ok(()),
            Err(err) => Err(keychain_error(err)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mittfortum_fetch::MemoryKeychain;
    use tempfile::TempDir;

    fn token(access: &str) -> TokenSet {
        TokenSet::new(access, "refresh", Utc::now() + Duration::hours(1))
    }

    /// Keychain that always fails like a missing secret service.
    struct BrokenKeychain;

    #[async_trait]
    impl KeychainApi for BrokenKeychain {
        async fn get(&self, _: &str, _: &str) -> Result<Option<String>, KeychainError> {
            Err(KeychainError::Platform("no secret service".into()))
        }
        async fn set(&self, _: &str, _: &str, _: &str) -> Result<(), KeychainError> {
            Err(KeychainError::Platform("no secret service".into()))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), KeychainError> {
            Err(KeychainError::Platform("no secret service".into()))
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(temp_dir.path().join("token.json"));

        assert!(store.load_token().await.unwrap().is_none());
        store.save_token(&token("a1")).await.unwrap();
        assert_eq!(store.load_token().await.unwrap().unwrap().access_token, "a1");

        store.clear_token().await.unwrap();
        assert!(store.load_token().await.unwrap().is_none());
        store.clear_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_blank_token() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token.json");
        save_json(&path, &token("")).await.unwrap();

        let err = FileTokenStore::new(&path).load_token().await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_keychain_store_round_trip() {
        let keychain = Arc::new(MemoryKeychain::new());
        let store = KeychainTokenStore::new(keychain.clone());

        store.save_token(&token("a1")).await.unwrap();
        assert!(keychain.exists(services::FORTUM, accounts::TOKEN_SET).await);
        assert_eq!(store.load_token().await.unwrap().unwrap().access_token, "a1");

        store.clear_token().await.unwrap();
        assert!(store.load_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_broken_keychain_falls_back_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token.json");
        let store = KeychainTokenStore::new(Arc::new(BrokenKeychain))
            .with_fallback(FileTokenStore::new(&path));

        store.save_token(&token("a1")).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.load_token().await.unwrap().unwrap().access_token, "a1");

        store.clear_token().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_broken_keychain_without_fallback_errors() {
        let store = KeychainTokenStore::new(Arc::new(BrokenKeychain));
        assert!(matches!(
            store.load_token().await,
            Err(CoreError::Host(_))
        ));
    }

    #[tokio::test]
    async fn test_keychain_save_clears_stale_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = FileTokenStore::new(temp_dir.path().join("token.json"));
        file.save_token(&token("old")).await.unwrap();

        let store = KeychainTokenStore::new(Arc::new(MemoryKeychain::new()))
            .with_fallback(file.clone());
        assert_eq!(store.load_token().await.unwrap().unwrap().access_token, "old");

        store.save_token(&token("new")).await.unwrap();
        assert!(file.load_token().await.unwrap().is_none());
        assert_eq!(store.load_token().await.unwrap().unwrap().access_token, "new");
    }
}
