//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Protected route:
//!     → middleware.rs (extract credentials, call the gate once)
//!     → gate.rs (session → user, then profile → role for admin routes)
//!     → session.rs ports (SessionResolver, ProfileStore)
//!     → remote.rs (HTTP adapters for the identity service)
//! ```
//!
//! # Design Decisions
//! - Roles are read fresh per admin request; nothing is cached
//! - Lookups are time-bounded and hold no locks
//! - Failed profile lookup (500) is never reported as a denial (403)

pub mod gate;
pub mod middleware;
pub mod remote;
pub mod session;

pub use gate::AuthGate;
pub use remote::{HttpProfileStore, HttpSessionResolver};
pub use session::{
    AuthenticatedUser, Credentials, IdentityServiceError, Profile, ProfileStore, Role, Session,
    SessionResolver,
};
