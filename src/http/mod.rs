//! HTTP transport: server wiring, gating middleware, and denial
//! responses.

mod middleware;
mod responder;
mod server;

pub use middleware::{
    authenticate, authorize, limit_api, limit_by_ip, limit_tiered, GateState,
};
pub use responder::{auth_denied, rate_limited, AuthErrorBody, RateLimitErrorBody};
pub use server::GateServer;
