// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `MittFortum` API
//!
//! Clients for Fortum's identity provider and customer API.
//!
//! - [`oauth::AuthClient`] - PKCE login, code exchange, refresh, token cache
//! - [`client::ApiClient`] - consumption time series and metering points
//! - [`authorized::AuthorizedApi`] - both of the above with the 401 policy
//! - [`endpoints::Endpoints`] - every URL, per market
//! - [`parser`] - payload decoding and validation
//!
//! ## Example
//!
//! ```ignore
//! use mittfortum_api::{AuthClient, ApiClient, AuthorizedApi, ConsumptionSource, Endpoints};
//!
//! let endpoints = Endpoints::for_locale(Locale::Sv);
//! let auth = Arc::new(AuthClient::new(http.clone(), endpoints.clone(), secrets));
//! let api = AuthorizedApi::new(auth, ApiClient::new(http, endpoints));
//!
//! let samples = api.fetch_consumption("6000123", range, Resolution::Hour).await?;
//! ```

pub mod authorized;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod jwt;
pub mod oauth;
pub mod parser;
pub mod pkce;

#[cfg(test)]
mod test_support;

pub use authorized::{AuthorizedApi, ConsumptionSource};
pub use client::ApiClient;
pub use endpoints::Endpoints;
pub use error::ApiError;
pub use oauth::{AuthClient, AuthorizationRequest};
pub use pkce::PkcePair;
