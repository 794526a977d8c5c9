//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{GatekeeperError, Result};

/// Main configuration for the Gatekeeper service.
///
/// Loaded once at process start; invalid values halt startup rather
/// than failing per-request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Session token configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Reverse-proxy addresses whose `X-Forwarded-For` header is
    /// believed. Requests from any other peer are attributed to the
    /// peer address, so clients cannot spoof their origin.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Session token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret the session tokens are signed with. Usually
    /// supplied through `GATEKEEPER_SIGNING_SECRET` rather than a file.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Cookie the credential travels in.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            cookie_name: default_cookie_name(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

fn default_cookie_name() -> String {
    "access_token".to_string()
}

fn default_token_ttl() -> i64 {
    86_400
}

/// Capacity and window for one traffic category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaSettings {
    /// Maximum requests per window
    pub capacity: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Per-IP limit applied to all traffic
    #[serde(default = "default_global_quota")]
    pub global: QuotaSettings,

    /// Per-IP limit on login attempts
    #[serde(default = "default_login_quota")]
    pub login: QuotaSettings,

    /// Per-IP limit on signup attempts
    #[serde(default = "default_signup_quota")]
    pub signup: QuotaSettings,

    /// Per-identity limit on API traffic
    #[serde(default = "default_api_quota")]
    pub api: QuotaSettings,

    /// Base (user-tier) per-identity limit; supervisor and admin tiers
    /// scale this capacity by fixed multipliers
    #[serde(default = "default_tiered_quota")]
    pub tiered: QuotaSettings,

    /// Paths exempt from rate limiting (health checks)
    #[serde(default = "default_health_paths")]
    pub health_paths: Vec<String>,

    /// Source IPs exempt from rate limiting
    #[serde(default)]
    pub trusted_ips: Vec<String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global: default_global_quota(),
            login: default_login_quota(),
            signup: default_signup_quota(),
            api: default_api_quota(),
            tiered: default_tiered_quota(),
            health_paths: default_health_paths(),
            trusted_ips: Vec::new(),
        }
    }
}

fn default_global_quota() -> QuotaSettings {
    QuotaSettings {
        capacity: 1000,
        window_ms: 900_000,
    }
}

fn default_login_quota() -> QuotaSettings {
    QuotaSettings {
        capacity: 5,
        window_ms: 900_000,
    }
}

fn default_signup_quota() -> QuotaSettings {
    QuotaSettings {
        capacity: 3,
        window_ms: 3_600_000,
    }
}

fn default_api_quota() -> QuotaSettings {
    QuotaSettings {
        capacity: 100,
        window_ms: 60_000,
    }
}

fn default_tiered_quota() -> QuotaSettings {
    QuotaSettings {
        capacity: 60,
        window_ms: 60_000,
    }
}

fn default_health_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl GatekeeperConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatekeeperConfig = serde_yaml::from_str(&contents)
            .map_err(|e| GatekeeperError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration: file if given, defaults otherwise, then
    /// environment overrides on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `GATEKEEPER_*` environment overrides.
    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("GATEKEEPER_SIGNING_SECRET") {
            self.auth.signing_secret = Some(secret);
        }
        if let Ok(addr) = std::env::var("GATEKEEPER_HTTP_ADDR") {
            if let Ok(addr) = addr.parse() {
                self.server.http_addr = addr;
            }
        }
    }

    /// Validate the configuration. All capacities and windows must be
    /// positive and the signing secret must be present; violations are
    /// fatal at startup.
    pub fn validate(&self) -> Result<()> {
        match &self.auth.signing_secret {
            Some(s) if !s.is_empty() => {}
            _ => {
                return Err(GatekeeperError::Config(
                    "auth.signing_secret must be set".to_string(),
                ))
            }
        }

        if self.auth.token_ttl_secs <= 0 {
            return Err(GatekeeperError::Config(
                "auth.token_ttl_secs must be positive".to_string(),
            ));
        }

        for (name, quota) in [
            ("global", &self.rate_limits.global),
            ("login", &self.rate_limits.login),
            ("signup", &self.rate_limits.signup),
            ("api", &self.rate_limits.api),
            ("tiered", &self.rate_limits.tiered),
        ] {
            if quota.capacity == 0 {
                return Err(GatekeeperError::Config(format!(
                    "rate_limits.{name}.capacity must be positive"
                )));
            }
            if quota.window_ms == 0 {
                return Err(GatekeeperError::Config(format!(
                    "rate_limits.{name}.window_ms must be positive"
                )));
            }
        }

        for ip in &self.rate_limits.trusted_ips {
            if ip.parse::<std::net::IpAddr>().is_err() {
                return Err(GatekeeperError::Config(format!(
                    "rate_limits.trusted_ips entry is not an IP address: {ip}"
                )));
            }
        }

        for ip in &self.server.trusted_proxies {
            if ip.parse::<std::net::IpAddr>().is_err() {
                return Err(GatekeeperError::Config(format!(
                    "server.trusted_proxies entry is not an IP address: {ip}"
                )));
            }
        }

        Ok(())
    }
}
