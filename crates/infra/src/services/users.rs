//! User administration: create, partial update, delete.

use chrono::Utc;
use tracing::{info, instrument};

use gatehouse_auth::{CallerContext, Credential, NewUser, User, UserChanges};
use gatehouse_core::{DomainError, UserId};

use crate::store::{AccessStore, AccessTx};

use super::assignment::{sync_user_roles_in, RoleSetPolicy};
use super::ServiceResult;

/// User account administration.
///
/// Email uniqueness is checked inside the write transaction (excluding the
/// user being updated) and backed by the store's unique constraint.
#[derive(Debug, Clone)]
pub struct UserService<S> {
    store: S,
    policy: RoleSetPolicy,
}

impl<S> UserService<S>
where
    S: AccessStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: RoleSetPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RoleSetPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Create a user holding exactly the given initial role.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id()),
        err
    )]
    pub async fn create(&self, caller: &CallerContext, cmd: NewUser) -> ServiceResult<User> {
        let profile = cmd.validate()?;
        let credential = Credential::hash(&cmd.password)?;

        let mut tx = self.store.begin().await?;
        ensure_email_free(tx.as_mut(), profile.email.as_str(), None).await?;

        let user = User::new(UserId::new(), profile, credential, Utc::now());
        tx.insert_user(&user).await?;
        sync_user_roles_in(tx.as_mut(), self.policy, user.id, &[cmd.role_id]).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Apply a partial update. Present `roles` replace the user's role set.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), user_id = %user_id),
        err
    )]
    pub async fn update(
        &self,
        caller: &CallerContext,
        user_id: UserId,
        changes: UserChanges,
    ) -> ServiceResult<User> {
        let credential = changes.new_password()?.map(Credential::hash).transpose()?;

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .find_user_for_update(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user {user_id} not found")))?;

        let now = Utc::now();
        user.apply_profile(&changes, now)?;
        if changes.email.is_some() {
            ensure_email_free(tx.as_mut(), user.email.as_str(), Some(user_id)).await?;
        }
        if let Some(credential) = credential {
            user.replace_credential(credential, now);
        }
        tx.update_user(&user).await?;

        if let Some(role_ids) = &changes.roles {
            sync_user_roles_in(tx.as_mut(), self.policy, user_id, role_ids).await?;
        }
        tx.commit().await?;

        info!("user updated");
        Ok(user)
    }

    /// Delete a user and its role associations.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), user_id = %user_id),
        err
    )]
    pub async fn delete(&self, caller: &CallerContext, user_id: UserId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_user(user_id).await? {
            return Err(DomainError::not_found(format!("user {user_id} not found")).into());
        }
        tx.commit().await?;

        info!("user deleted");
        Ok(())
    }

    /// Look up a user by email and check the password.
    ///
    /// Returns `None` for an unknown email or a wrong password alike.
    #[instrument(skip_all, err)]
    pub async fn verify_credentials(&self, email: &str, password: &str) -> ServiceResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let mut tx = self.store.begin_read().await?;
        let user = tx.find_user_by_email(&email).await?;
        Ok(user.filter(|u| u.credential.verify(password)))
    }
}

async fn ensure_email_free(
    tx: &mut dyn AccessTx,
    email: &str,
    except: Option<UserId>,
) -> ServiceResult<()> {
    match tx.find_user_by_email(email).await? {
        Some(existing) if Some(existing.id) != except => Err(DomainError::conflict(format!(
            "email '{email}' is already taken"
        ))
        .into()),
        _ => Ok(()),
    }
}
