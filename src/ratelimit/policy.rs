//! Category-to-quota policy.

use crate::config::RateLimitSettings;

/// Capacity multiplier for supervisor-tier traffic.
const SUPERVISOR_MULTIPLIER: u64 = 2;
/// Capacity multiplier for admin-tier traffic.
const ADMIN_MULTIPLIER: u64 = 5;

/// Coarse classification of an authenticated identity, derived from its
/// role name. Used only to scale rate-limit capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessTier {
    User,
    Supervisor,
    Admin,
}

impl AccessTier {
    /// Map a role name to a tier. Unrecognized names fall back to the
    /// base tier rather than erroring.
    pub fn from_role_name(name: &str) -> Self {
        match name {
            "admin" => AccessTier::Admin,
            "supervisor" => AccessTier::Supervisor,
            _ => AccessTier::User,
        }
    }

    /// Capacity multiplier relative to the base user capacity. Fixed
    /// constants; not read from configuration.
    pub fn multiplier(&self) -> u64 {
        match self {
            AccessTier::User => 1,
            AccessTier::Supervisor => SUPERVISOR_MULTIPLIER,
            AccessTier::Admin => ADMIN_MULTIPLIER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::User => "user",
            AccessTier::Supervisor => "supervisor",
            AccessTier::Admin => "admin",
        }
    }
}

/// Traffic category a request is limited under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Every request, bucketed by client IP.
    Global,
    /// Login attempts, bucketed by client IP.
    Login,
    /// Signup attempts, bucketed by client IP.
    Signup,
    /// Authenticated API traffic, bucketed by identity.
    Api,
    /// Authenticated traffic scaled by the identity's access tier.
    Tiered(AccessTier),
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Global => "global",
            Category::Login => "login",
            Category::Signup => "signup",
            Category::Api => "api",
            Category::Tiered(tier) => tier.as_str(),
        }
    }
}

/// Quota applied to one rate limit bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Maximum requests allowed per window.
    pub capacity: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Do not count requests that complete successfully.
    pub skip_successful: bool,
    /// Do not count requests that complete with an error status.
    pub skip_failed: bool,
}

/// Maps traffic categories to quotas. Built once at startup from the
/// validated configuration; immutable thereafter.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    global: QuotaConfig,
    login: QuotaConfig,
    signup: QuotaConfig,
    api: QuotaConfig,
    tier_base: QuotaConfig,
}

impl RateLimitPolicy {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            global: QuotaConfig {
                capacity: settings.global.capacity,
                window_ms: settings.global.window_ms,
                skip_successful: false,
                skip_failed: false,
            },
            // Successful logins and signups do not consume quota; only
            // failed attempts count against the window.
            login: QuotaConfig {
                capacity: settings.login.capacity,
                window_ms: settings.login.window_ms,
                skip_successful: true,
                skip_failed: false,
            },
            signup: QuotaConfig {
                capacity: settings.signup.capacity,
                window_ms: settings.signup.window_ms,
                skip_successful: true,
                skip_failed: false,
            },
            api: QuotaConfig {
                capacity: settings.api.capacity,
                window_ms: settings.api.window_ms,
                skip_successful: false,
                skip_failed: false,
            },
            tier_base: QuotaConfig {
                capacity: settings.tiered.capacity,
                window_ms: settings.tiered.window_ms,
                skip_successful: false,
                skip_failed: false,
            },
        }
    }

    /// Resolve the quota for a category. Tiered categories scale the
    /// base capacity by the tier's fixed multiplier.
    pub fn quota(&self, category: Category) -> QuotaConfig {
        match category {
            Category::Global => self.global.clone(),
            Category::Login => self.login.clone(),
            Category::Signup => self.signup.clone(),
            Category::Api => self.api.clone(),
            Category::Tiered(tier) => QuotaConfig {
                capacity: self.tier_base.capacity * tier.multiplier(),
                ..self.tier_base.clone()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RateLimitSettings {
        RateLimitSettings::default()
    }

    #[test]
    fn test_tier_from_role_name() {
        assert_eq!(AccessTier::from_role_name("admin"), AccessTier::Admin);
        assert_eq!(
            AccessTier::from_role_name("supervisor"),
            AccessTier::Supervisor
        );
        assert_eq!(AccessTier::from_role_name("user"), AccessTier::User);
        // Unknown role names default to the base tier.
        assert_eq!(AccessTier::from_role_name("auditor"), AccessTier::User);
        assert_eq!(AccessTier::from_role_name(""), AccessTier::User);
    }

    #[test]
    fn test_tier_multipliers() {
        let policy = RateLimitPolicy::from_settings(&settings());
        let base = policy.quota(Category::Tiered(AccessTier::User)).capacity;

        assert_eq!(
            policy
                .quota(Category::Tiered(AccessTier::Supervisor))
                .capacity,
            base * 2
        );
        assert_eq!(
            policy.quota(Category::Tiered(AccessTier::Admin)).capacity,
            base * 5
        );
    }

    #[test]
    fn test_login_and_signup_skip_successful() {
        let policy = RateLimitPolicy::from_settings(&settings());

        assert!(policy.quota(Category::Login).skip_successful);
        assert!(policy.quota(Category::Signup).skip_successful);
        assert!(!policy.quota(Category::Global).skip_successful);
        assert!(!policy.quota(Category::Api).skip_successful);
    }
}
