//! Host APIs used by the auth and API clients.
//!
//! - [`keychain`] - Secure credential storage (system keychain)
//! - [`http`] - HTTP client with tracing and domain allowlist

pub mod http;
pub mod keychain;

pub use http::{HttpClient, HttpSettings, ResponseExt};
pub use keychain::{KeychainApi, MemoryKeychain, SystemKeychain};
