//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route (with access level) or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile matchers
//!     → Sort by priority
//!     → Freeze as immutable RouteTable
//! ```

pub mod matcher;
pub mod router;

pub use matcher::RequestTarget;
pub use router::{Route, RouteTable};
