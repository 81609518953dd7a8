//! Role administration: create, rename/resync, delete.

use chrono::Utc;
use tracing::{info, instrument};

use gatehouse_auth::{CallerContext, NewRole, Role, RoleChanges};
use gatehouse_core::{DomainError, RoleId};

use crate::store::{AccessStore, AccessTx};

use super::assignment::sync_role_permissions_in;
use super::ServiceResult;

#[derive(Debug, Clone)]
pub struct RoleService<S> {
    store: S,
}

impl<S> RoleService<S>
where
    S: AccessStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create a role with a unique name and an initial permission set.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id()),
        err
    )]
    pub async fn create(&self, caller: &CallerContext, cmd: NewRole) -> ServiceResult<Role> {
        let name = cmd.validated_name()?;

        let mut tx = self.store.begin().await?;
        ensure_name_free(tx.as_mut(), name.as_str(), None).await?;

        let role = Role::new(RoleId::new(), name, Utc::now());
        tx.insert_role(&role).await?;
        sync_role_permissions_in(tx.as_mut(), role.id, &cmd.permission_ids).await?;
        tx.commit().await?;

        info!(role_id = %role.id, role = %role.name, "role created");
        Ok(role)
    }

    /// Rename a role and, when given, replace its permission set.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), role_id = %role_id),
        err
    )]
    pub async fn update(
        &self,
        caller: &CallerContext,
        role_id: RoleId,
        changes: RoleChanges,
    ) -> ServiceResult<Role> {
        let name = changes.validated_name()?;

        let mut tx = self.store.begin().await?;
        let mut role = tx
            .find_role_for_update(role_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("role {role_id} not found")))?;
        ensure_name_free(tx.as_mut(), name.as_str(), Some(role_id)).await?;

        role.rename(name, Utc::now());
        tx.update_role(&role).await?;
        if let Some(permission_ids) = &changes.permission_ids {
            sync_role_permissions_in(tx.as_mut(), role_id, permission_ids).await?;
        }
        tx.commit().await?;

        info!(role = %role.name, "role updated");
        Ok(role)
    }

    /// Delete a role. Its permission links and user memberships go with it;
    /// users and permissions stay.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), role_id = %role_id),
        err
    )]
    pub async fn delete(&self, caller: &CallerContext, role_id: RoleId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_role(role_id).await? {
            return Err(DomainError::not_found(format!("role {role_id} not found")).into());
        }
        tx.commit().await?;

        info!("role deleted");
        Ok(())
    }
}

async fn ensure_name_free(
    tx: &mut dyn AccessTx,
    name: &str,
    except: Option<RoleId>,
) -> ServiceResult<()> {
    match tx.find_role_by_name(name).await? {
        Some(existing) if Some(existing.id) != except => Err(DomainError::conflict(format!(
            "role name '{name}' is already taken"
        ))
        .into()),
        _ => Ok(()),
    }
}
