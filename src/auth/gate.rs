//! The authorization gate: token check, identity load, permission check.

use std::sync::Arc;

use tracing::{debug, warn};

use super::identity::Directory;
use super::permission;
use super::token::{SessionVerifier, TokenVerdict};

/// Machine-readable reason for a denied request.
///
/// Every reason maps to HTTP 401 on the wire. The uniform status keeps
/// clients from learning which check failed; the distinct reasons keep
/// the server-side logs diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoCredential,
    MissingSigningKey,
    InvalidToken,
    MissingClaims,
    SubjectNotFound,
    SubjectInactive,
    RoleNotFound,
    RoleInactive,
    InsufficientPermissions,
}

impl DenyReason {
    /// Client-facing reason string. Deliberately terse.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::NoCredential => "no token found",
            DenyReason::MissingSigningKey => "no signing key present",
            DenyReason::InvalidToken => "authentication verification failed",
            DenyReason::MissingClaims => "malformed request: missing fields in token",
            DenyReason::SubjectNotFound => "user not found",
            DenyReason::SubjectInactive => "user is inactive",
            DenyReason::RoleNotFound => "insufficient permissions: role not found",
            DenyReason::RoleInactive => "insufficient permissions: role is inactive",
            DenyReason::InsufficientPermissions => "insufficient permissions",
        }
    }
}

/// Identity attached to the request context once the gate allows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPrincipal {
    pub subject_id: String,
    pub role_id: String,
    /// Populated when the gate loaded the role for a permission check.
    pub role_name: Option<String>,
}

/// Outcome of running a request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationVerdict {
    Allow(RequestPrincipal),
    Deny(DenyReason),
}

/// A permission requirement for a route: a resource domain and the
/// permission bits an operation on it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub domain: String,
    pub required_mask: u32,
}

impl Requirement {
    pub fn new(domain: impl Into<String>, required_mask: u32) -> Self {
        Self {
            domain: domain.into(),
            required_mask,
        }
    }
}

/// Composes the session verifier, identity resolution, and the
/// permission model into a single per-request decision.
///
/// Stateless per call; safe to share across request tasks.
pub struct AuthorizationGate {
    verifier: SessionVerifier,
    directory: Arc<dyn Directory>,
}

impl AuthorizationGate {
    pub fn new(verifier: SessionVerifier, directory: Arc<dyn Directory>) -> Self {
        Self {
            verifier,
            directory,
        }
    }

    pub fn verifier(&self) -> &SessionVerifier {
        &self.verifier
    }

    /// Run the full decision pipeline for one request.
    ///
    /// With `requirement = None` the gate authenticates only; with a
    /// requirement it additionally loads the role named by the token's
    /// `role_id` claim (authoritative from login time) and applies the
    /// permission mask check. Every failure is terminal for the request.
    pub async fn authorize(
        &self,
        raw_credential: Option<&str>,
        requirement: Option<&Requirement>,
    ) -> AuthorizationVerdict {
        let claims = match self.verifier.verify(raw_credential) {
            TokenVerdict::Valid(claims) => claims,
            TokenVerdict::NoCredential => {
                return AuthorizationVerdict::Deny(DenyReason::NoCredential)
            }
            TokenVerdict::ConfigFault => {
                return AuthorizationVerdict::Deny(DenyReason::MissingSigningKey)
            }
            TokenVerdict::InvalidSignature => {
                return AuthorizationVerdict::Deny(DenyReason::InvalidToken)
            }
            TokenVerdict::MissingClaims => {
                return AuthorizationVerdict::Deny(DenyReason::MissingClaims)
            }
        };

        // A lookup failure and a missing subject produce the same deny:
        // callers must not be able to tell a revoked account from a
        // directory outage.
        let identity = match self.directory.find_subject(&claims.subject_id).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!(subject_id = %claims.subject_id, "Subject not found in directory");
                return AuthorizationVerdict::Deny(DenyReason::SubjectNotFound);
            }
            Err(e) => {
                warn!(subject_id = %claims.subject_id, error = %e, "Directory lookup failed");
                return AuthorizationVerdict::Deny(DenyReason::SubjectNotFound);
            }
        };

        if !identity.active {
            debug!(subject_id = %identity.id, "Subject is inactive");
            return AuthorizationVerdict::Deny(DenyReason::SubjectInactive);
        }

        let requirement = match requirement {
            Some(r) => r,
            None => {
                return AuthorizationVerdict::Allow(RequestPrincipal {
                    subject_id: claims.subject_id,
                    role_id: claims.role_id,
                    role_name: None,
                })
            }
        };

        let role = match self.directory.find_role(&claims.role_id).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                debug!(role_id = %claims.role_id, "Role not found in directory");
                return AuthorizationVerdict::Deny(DenyReason::RoleNotFound);
            }
            Err(e) => {
                warn!(role_id = %claims.role_id, error = %e, "Role lookup failed");
                return AuthorizationVerdict::Deny(DenyReason::RoleNotFound);
            }
        };

        if !role.active {
            debug!(role_id = %role.id, "Role is inactive");
            return AuthorizationVerdict::Deny(DenyReason::RoleInactive);
        }

        let granted = role.granted_mask(&requirement.domain);
        if !permission::has_permission(granted, requirement.required_mask) {
            debug!(
                subject_id = %claims.subject_id,
                role_id = %role.id,
                domain = %requirement.domain,
                granted = granted,
                required = requirement.required_mask,
                "Permission check failed"
            );
            return AuthorizationVerdict::Deny(DenyReason::InsufficientPermissions);
        }

        AuthorizationVerdict::Allow(RequestPrincipal {
            subject_id: claims.subject_id,
            role_id: claims.role_id,
            role_name: Some(role.name),
        })
    }
}
