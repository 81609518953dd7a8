use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainResult, Entity, EntityName, PermissionId, RoleId, Timestamps};

/// Named, reusable bundle of permissions.
///
/// The permission set itself is not stored on the role; it lives in
/// [`RolePermission`] join records so that it can be replaced atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: EntityName,
    pub timestamps: Timestamps,
}

impl Role {
    pub fn new(id: RoleId, name: EntityName, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            timestamps: Timestamps::new(now),
        }
    }

    pub fn rename(&mut self, name: EntityName, now: DateTime<Utc>) {
        self.name = name;
        self.timestamps.touch(now);
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name.as_str())
    }
}

/// Role ↔ permission association row, unique on the pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
}

impl RolePermission {
    pub fn new(role_id: RoleId, permission_id: PermissionId) -> Self {
        Self {
            role_id,
            permission_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Input for creating a role with an initial (possibly empty) permission set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

impl NewRole {
    pub fn new(name: impl Into<String>, permission_ids: Vec<PermissionId>) -> Self {
        Self {
            name: name.into(),
            permission_ids,
        }
    }

    pub fn validated_name(&self) -> DomainResult<EntityName> {
        EntityName::parse(&self.name)
    }
}

/// Input for updating a role.
///
/// `permission_ids: None` leaves the permission set untouched; `Some(ids)`
/// replaces it exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleChanges {
    pub name: String,
    #[serde(default)]
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl RoleChanges {
    pub fn validated_name(&self) -> DomainResult<EntityName> {
        EntityName::parse(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_touches_timestamp() {
        let created = Utc::now();
        let mut role = Role::new(RoleId::new(), EntityName::parse("Editor").unwrap(), created);
        let later = created + chrono::Duration::seconds(1);

        role.rename(EntityName::parse("Publisher").unwrap(), later);

        assert_eq!(role.name.as_str(), "Publisher");
        assert_eq!(role.timestamps.created_at, created);
        assert_eq!(role.timestamps.updated_at, later);
    }

    #[test]
    fn blank_role_name_is_invalid() {
        let cmd = NewRole::new("  ", vec![]);
        assert!(cmd.validated_name().unwrap_err().is_validation());
    }
}
