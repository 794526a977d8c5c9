//! Session token verification.
//!
//! Tokens are signed JWTs carried in a cookie. Verification is a staged
//! pipeline with a fixed order: credential presence, signing-key sanity,
//! signature/expiry, claim completeness. Each stage failing produces a
//! distinct verdict so the caller can emit a distinct diagnostic.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{GatekeeperError, Result};

/// Claim layout version stamped into every issued token.
pub const SCHEMA_VERSION: u32 = 1;

/// Wire-format claims. Identity fields are optional so that a token with
/// a valid signature but an incomplete payload can be detected and
/// reported as malformed rather than failing deserialization outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireClaims {
    #[serde(default)]
    subject_id: Option<String>,
    #[serde(default)]
    role_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    schema_version: Option<u32>,
    iat: i64,
    exp: i64,
}

/// Fully-populated claims from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub subject_id: String,
    pub role_id: String,
    pub session_id: String,
    pub schema_version: u32,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Outcome of presenting a credential to the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerdict {
    /// Signature checked out and all required claims are present.
    Valid(SessionClaims),
    /// No credential was presented at all.
    NoCredential,
    /// The signing secret is not available to the service.
    ConfigFault,
    /// Signature or expiry verification failed.
    InvalidSignature,
    /// Cryptographically valid but one or more identity claims absent.
    MissingClaims,
}

/// Verifies signed session tokens against a shared secret.
pub struct SessionVerifier {
    secret: Option<String>,
}

impl SessionVerifier {
    /// Create a verifier. A `None` secret is tolerated at construction
    /// and surfaces as a `ConfigFault` verdict on every request rather
    /// than a panic.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Verify a raw credential string.
    ///
    /// Stage order is fixed and observable through the verdict:
    /// presence, key availability, signature/expiry, claim completeness.
    pub fn verify(&self, raw: Option<&str>) -> TokenVerdict {
        let raw = match raw {
            Some(r) if !r.is_empty() => r,
            _ => return TokenVerdict::NoCredential,
        };

        let secret = match &self.secret {
            Some(s) if !s.is_empty() => s,
            _ => {
                debug!("Signing secret unavailable; denying credential check");
                return TokenVerdict::ConfigFault;
            }
        };

        let key = DecodingKey::from_secret(secret.as_bytes());
        let data = match decode::<WireClaims>(raw, &key, &Validation::default()) {
            Ok(data) => data,
            Err(e) => {
                // The concrete cause stays in the logs; clients get a
                // uniform verification failure.
                debug!(error = %e, "Token verification failed");
                return TokenVerdict::InvalidSignature;
            }
        };

        let claims = data.claims;
        match (claims.subject_id, claims.role_id, claims.session_id) {
            (Some(subject_id), Some(role_id), Some(session_id)) => {
                TokenVerdict::Valid(SessionClaims {
                    subject_id,
                    role_id,
                    session_id,
                    schema_version: claims.schema_version.unwrap_or(SCHEMA_VERSION),
                    issued_at: claims.iat,
                    expires_at: claims.exp,
                })
            }
            _ => TokenVerdict::MissingClaims,
        }
    }

    /// Mint a signed token for a subject. Used at login time; the token
    /// is immutable once issued and carries a fresh session id.
    pub fn issue(&self, subject_id: &str, role_id: &str, ttl_secs: i64) -> Result<String> {
        let secret = self
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatekeeperError::Config("signing secret is not set".to_string()))?;

        let now = Utc::now().timestamp();
        let claims = WireClaims {
            subject_id: Some(subject_id.to_string()),
            role_id: Some(role_id.to_string()),
            session_id: Some(Uuid::new_v4().to_string()),
            schema_version: Some(SCHEMA_VERSION),
            iat: now,
            exp: now + ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| GatekeeperError::Token(e.to_string()))
    }
}
