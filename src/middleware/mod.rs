//! HTTP boundary for Axum: one POST route that accepts the caller-facing
//! tax certificate form, encrypts its secrets, and runs the two-phase protocol.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use codef_taxcert::middleware::{RouteConfig, tax_cert_routes};
//!
//! let config = RouteConfig::from_env()?;
//! let app = axum::Router::new().merge(tax_cert_routes(config));
//! ```
//!
//! Status mapping: `200` when the attempt completed (including business
//! failure codes), `202` while a step-up confirmation is pending, `400` for
//! malformed input, `500` with a generic message for everything else.

mod config;
mod error;
mod routes;
mod state;
mod types;

pub use config::RouteConfig;
pub use error::RouteError;
pub use routes::tax_cert_routes;
pub use types::{ExtraInfoPayload, PreparedRequest, TaxCertPayload, TwoWayInfoPayload};
