// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `MittFortum` Fetch
//!
//! Network and credential plumbing shared by the `MittFortum` clients.
//!
//! ## Host APIs
//!
//! - [`host::http`] - HTTP client with bounded timeouts and a domain allowlist
//! - [`host::keychain`] - Secure credential storage (system keychain)
//!
//! [`FetchContext`] bundles both so every component talks through the same
//! client and keychain.

pub mod context;
pub mod error;
pub mod host;

pub use error::{FetchError, HttpError, KeychainError};

pub use host::{
    http::{FORTUM_DOMAINS, HttpClient, HttpSettings, ResponseExt},
    keychain::{KeychainApi, MemoryKeychain, SystemKeychain, accounts, get_json, services, set_json},
};

pub use context::{FetchContext, FetchContextBuilder, FetchSettings};
