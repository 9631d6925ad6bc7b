//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, gateway layers)
//!     → pipeline.rs (ordered stages: rate limit → CSRF)
//!     → application routes (auth middleware on protected routers)
//!     → upstream.rs (binary mode: forward to the application server)
//!     → response.rs (GatewayError → status + JSON body)
//! ```

pub mod pipeline;
pub mod response;
pub mod server;
pub mod upstream;

pub use pipeline::{Pipeline, RequestContext, Stage, StageOutcome};
pub use server::{Gateway, HttpServer};
