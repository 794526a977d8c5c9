//! Identity and role records, and the directory they are loaded from.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;

/// A resolved subject record. Loaded fresh on every request; owned by
/// the external directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub role_id: String,
    pub active: bool,
}

/// A role with a per-domain permission mask. A domain absent from the
/// map grants permission 0 for that domain (deny by default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub permissions: HashMap<String, u32>,
}

impl Role {
    /// Permission mask granted for a domain.
    pub fn granted_mask(&self, domain: &str) -> u32 {
        self.permissions.get(domain).copied().unwrap_or(0)
    }
}

/// Directory service the gate resolves subjects and roles through.
///
/// Implementations are external collaborators (a user store, an LDAP
/// bridge). `Ok(None)` means the record does not exist; `Err` means the
/// directory itself failed. The gate collapses both into the same deny
/// so callers cannot distinguish a missing subject from an outage.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a subject by id.
    async fn find_subject(&self, id: &str) -> Result<Option<Identity>>;

    /// Look up a role by id.
    async fn find_role(&self, id: &str) -> Result<Option<Role>>;
}

/// In-memory directory. Stands in for the external directory service in
/// tests and the demo binary.
#[derive(Default)]
pub struct MemoryDirectory {
    subjects: DashMap<String, Identity>,
    roles: DashMap<String, Role>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_subject(&self, identity: Identity) {
        self.subjects.insert(identity.id.clone(), identity);
    }

    pub fn insert_role(&self, role: Role) {
        self.roles.insert(role.id.clone(), role);
    }

    /// Convenience constructor returning a shareable handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn find_subject(&self, id: &str) -> Result<Option<Identity>> {
        Ok(self.subjects.get(id).map(|r| r.value().clone()))
    }

    async fn find_role(&self, id: &str) -> Result<Option<Role>> {
        Ok(self.roles.get(id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permission;

    #[test]
    fn test_granted_mask_for_known_domain() {
        let mut permissions = HashMap::new();
        permissions.insert("todo".to_string(), permission::READ | permission::WRITE);
        let role = Role {
            id: "role-1".to_string(),
            name: "user".to_string(),
            active: true,
            permissions,
        };

        assert_eq!(
            role.granted_mask("todo"),
            permission::READ | permission::WRITE
        );
    }

    #[test]
    fn test_absent_domain_grants_nothing() {
        let role = Role {
            id: "role-1".to_string(),
            name: "user".to_string(),
            active: true,
            permissions: HashMap::new(),
        };

        assert_eq!(role.granted_mask("role"), 0);
    }

    #[tokio::test]
    async fn test_memory_directory_lookup() {
        let dir = MemoryDirectory::new();
        dir.insert_subject(Identity {
            id: "subject-1".to_string(),
            role_id: "role-1".to_string(),
            active: true,
        });

        let found = dir.find_subject("subject-1").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().role_id, "role-1");

        let missing = dir.find_subject("subject-2").await.unwrap();
        assert!(missing.is_none());
    }
}
