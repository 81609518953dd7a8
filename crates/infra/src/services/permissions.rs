//! Permission vocabulary administration.
//!
//! Permissions are only ever created or deleted; there is no rename.

use chrono::Utc;
use tracing::{info, instrument};

use gatehouse_auth::{CallerContext, Permission};
use gatehouse_core::{DomainError, EntityName, PermissionId};

use crate::store::AccessStore;

use super::ServiceResult;

#[derive(Debug, Clone)]
pub struct PermissionService<S> {
    store: S,
}

impl<S> PermissionService<S>
where
    S: AccessStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id()),
        err
    )]
    pub async fn create(&self, caller: &CallerContext, name: &str) -> ServiceResult<Permission> {
        let name = EntityName::parse(name)?;

        let mut tx = self.store.begin().await?;
        if tx.find_permission_by_name(name.as_str()).await?.is_some() {
            return Err(DomainError::conflict(format!("permission '{name}' already exists")).into());
        }
        let permission = Permission::new(PermissionId::new(), name, Utc::now());
        tx.insert_permission(&permission).await?;
        tx.commit().await?;

        info!(permission_id = %permission.id, permission = %permission.name, "permission created");
        Ok(permission)
    }

    /// Delete a permission and detach it from every role.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), permission_id = %permission_id),
        err
    )]
    pub async fn delete(&self, caller: &CallerContext, permission_id: PermissionId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_permission(permission_id).await? {
            return Err(
                DomainError::not_found(format!("permission {permission_id} not found")).into(),
            );
        }
        tx.commit().await?;

        info!("permission deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gatehouse_auth::{Role, RolePermission};
    use gatehouse_core::RoleId;

    use super::*;
    use crate::store::{AccessTx, InMemoryAccessStore};

    #[tokio::test]
    async fn create_rejects_blank_and_duplicate_names() {
        let store = Arc::new(InMemoryAccessStore::new());
        let svc = PermissionService::new(store.clone());
        let caller = CallerContext::system();

        assert!(svc.create(&caller, "   ").await.unwrap_err().is_validation());
        svc.create(&caller, "view posts").await.unwrap();
        assert!(svc.create(&caller, "view posts").await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn delete_detaches_from_roles() {
        let store = Arc::new(InMemoryAccessStore::new());
        let svc = PermissionService::new(store.clone());
        let caller = CallerContext::system();
        let view = svc.create(&caller, "view posts").await.unwrap();

        let role = Role::new(RoleId::new(), EntityName::parse("Editor").unwrap(), Utc::now());
        let mut tx = store.begin().await.unwrap();
        tx.insert_role(&role).await.unwrap();
        tx.insert_role_permission(RolePermission::new(role.id, view.id)).await.unwrap();
        tx.commit().await.unwrap();

        svc.delete(&caller, view.id).await.unwrap();

        let mut tx = store.begin_read().await.unwrap();
        assert!(tx.role_permissions(role.id).await.unwrap().is_empty());
        assert!(tx.find_role(role.id).await.unwrap().is_some());
        drop(tx);
        assert!(svc.delete(&caller, view.id).await.unwrap_err().is_not_found());
    }
}
