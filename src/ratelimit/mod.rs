//! Rate limiting logic and state management.

mod counter;
mod key;
mod limiter;
mod policy;

pub use counter::{FixedWindow, WindowSnapshot};
pub use key::RateLimitKey;
pub use limiter::{BypassRules, RateLimiter, RequestOutcome};
pub use policy::{AccessTier, Category, QuotaConfig, RateLimitPolicy};
