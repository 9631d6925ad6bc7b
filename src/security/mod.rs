//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (security headers on the way out, every response)
//!     → identity.rs (client identity from forwarded headers)
//!     → rate_limit.rs (fixed window per identity + route, store.rs + clock.rs)
//!     → csrf.rs (Origin/Referer check for mutating API calls)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod clock;
pub mod csrf;
pub mod headers;
pub mod identity;
pub mod rate_limit;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use csrf::{CsrfStage, CsrfValidator, CsrfVerdict};
pub use identity::ClientIdentity;
pub use rate_limit::{RateLimitDecision, RateLimitInfo, RateLimitStage, RateLimiter};
pub use store::{CounterStore, InMemoryCounterStore, WindowCounter};
