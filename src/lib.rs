//! Request security gateway library.
//!
//! Rate limiting, CSRF validation, authentication and admin gating,
//! permission-aware data access and security headers, composed as an
//! ordered interceptor chain in front of an application.

pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::{Gateway, HttpServer};
pub use lifecycle::Shutdown;
