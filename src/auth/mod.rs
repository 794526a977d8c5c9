//! Session verification, identity resolution, and permission checks.

pub mod permission;

mod gate;
mod identity;
mod token;

pub use gate::{AuthorizationGate, AuthorizationVerdict, DenyReason, RequestPrincipal, Requirement};
pub use identity::{Directory, Identity, MemoryDirectory, Role};
pub use token::{SessionClaims, SessionVerifier, TokenVerdict, SCHEMA_VERSION};
