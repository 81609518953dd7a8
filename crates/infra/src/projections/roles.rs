//! Role catalog listing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_auth::{Permission, Role};
use gatehouse_core::{DomainError, Entity, PermissionId, RoleId};

use crate::services::ServiceResult;
use crate::store::AccessTx;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSummary {
    pub id: PermissionId,
    pub name: String,
}

impl From<&Permission> for PermissionSummary {
    fn from(permission: &Permission) -> Self {
        Self {
            id: permission.id,
            name: permission.name.as_str().to_string(),
        }
    }
}

/// One role with the permissions it grants, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleListing {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<PermissionSummary>,
    pub created_at: DateTime<Utc>,
}

impl RoleListing {
    fn from_role(role: &Role, mut permissions: Vec<PermissionSummary>) -> Self {
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            id: role.id(),
            name: role.name.as_str().to_string(),
            permissions,
            created_at: role.timestamps().created_at,
        }
    }

    pub fn permission_names(&self) -> Vec<&str> {
        self.permissions.iter().map(|p| p.name.as_str()).collect()
    }
}

pub(crate) async fn load_all(tx: &mut dyn AccessTx) -> ServiceResult<Vec<RoleListing>> {
    let permissions: BTreeMap<PermissionId, PermissionSummary> = tx
        .list_permissions()
        .await?
        .iter()
        .map(|p| (p.id, PermissionSummary::from(p)))
        .collect();

    let mut grants: BTreeMap<RoleId, Vec<PermissionSummary>> = BTreeMap::new();
    for link in tx.all_role_permissions().await? {
        if let Some(summary) = permissions.get(&link.permission_id) {
            grants.entry(link.role_id).or_default().push(summary.clone());
        }
    }

    let mut roles = tx.list_roles().await?;
    roles.sort_by_key(|r| r.id);
    Ok(roles
        .iter()
        .map(|role| RoleListing::from_role(role, grants.remove(&role.id).unwrap_or_default()))
        .collect())
}

pub(crate) async fn load_one(tx: &mut dyn AccessTx, role_id: RoleId) -> ServiceResult<RoleListing> {
    let role = tx
        .find_role(role_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("role {role_id} not found")))?;

    let permission_ids: Vec<PermissionId> = tx
        .role_permissions(role_id)
        .await?
        .into_iter()
        .map(|link| link.permission_id)
        .collect();
    let permissions = tx
        .find_permissions(&permission_ids)
        .await?
        .iter()
        .map(PermissionSummary::from)
        .collect();

    Ok(RoleListing::from_role(&role, permissions))
}
