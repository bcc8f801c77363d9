//! keyseal-gate: request gating for axum/tower services
//!
//! [`ApiKeyLayer`] checks the `APIKey <mac> <token>` header on each request.
//! Accepted requests carry [`Claims`](keyseal_token::Claims) and [`Authorized`]
//! in their extensions. Rejected ones get a JSON body, a redirect, a rendered
//! page or a plain `401 Unauthorized`, chosen by content negotiation:
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use keyseal_gate::{ApiKeyLayer, GateConfig};
//!
//! # fn main() -> Result<(), keyseal_core::SecurityError> {
//! let gate = GateConfig::builder()
//!     .secret("master secret")
//!     .url_pattern("^/api/")
//!     .redirect("/login")
//!     .build()?;
//! let app: Router = Router::new()
//!     .route("/api/me", get(|| async { "hello" }))
//!     .layer(ApiKeyLayer::new(gate));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod layer;
pub mod negotiate;
pub mod response;

pub use config::{GateBuilder, GateConfig, MemorySession, Session, SessionStore};
pub use layer::{ApiKeyLayer, ApiKeyService, Authorized};
pub use negotiate::Media;
pub use response::Rejection;
