//! Rate limit key derivation.

use super::policy::Category;

/// A key that uniquely identifies one rate limit bucket.
///
/// Composed of the traffic category and a discriminator: the client IP
/// for anonymous categories, the identity id for authenticated ones.
/// Requests sharing a key share a counter window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub category: Category,
    pub discriminator: String,
}

impl RateLimitKey {
    /// Key for an anonymous category bucketed by client IP.
    pub fn for_ip(category: Category, ip: impl Into<String>) -> Self {
        Self {
            category,
            discriminator: ip.into(),
        }
    }

    /// Key for an authenticated category bucketed by identity.
    pub fn for_identity(category: Category, subject_id: impl Into<String>) -> Self {
        Self {
            category,
            discriminator: subject_id.into(),
        }
    }

    /// String form, used for logging and as the counter map key.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.category.as_str(), self.discriminator)
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
