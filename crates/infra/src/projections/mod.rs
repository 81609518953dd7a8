//! Query projections over the access-control store.
//!
//! Projections are computed on demand: every call opens one read-only
//! transaction, so a listing reflects a single consistent snapshot and never
//! lags behind a committed write. Nothing is cached.
//!
//! Ordering:
//! - listings are ordered by id (UUIDv7, so roughly creation order)
//! - role and permission names inside a listing are sorted by name

pub mod roles;
pub mod users;

pub use roles::{PermissionSummary, RoleListing};
pub use users::UserListing;

use gatehouse_core::{RoleId, UserId};

use crate::services::ServiceResult;
use crate::store::AccessStore;

/// Read-side entry point for administrative listings.
#[derive(Debug, Clone)]
pub struct AccessQueries<S> {
    store: S,
}

impl<S> AccessQueries<S>
where
    S: AccessStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Every user with the names of the roles they hold.
    pub async fn list_users_with_roles(&self) -> ServiceResult<Vec<UserListing>> {
        let mut tx = self.store.begin_read().await?;
        users::load_all(tx.as_mut()).await
    }

    pub async fn get_user(&self, user_id: UserId) -> ServiceResult<UserListing> {
        let mut tx = self.store.begin_read().await?;
        users::load_one(tx.as_mut(), user_id).await
    }

    /// Every role with the permissions it grants.
    pub async fn list_roles_with_permissions(&self) -> ServiceResult<Vec<RoleListing>> {
        let mut tx = self.store.begin_read().await?;
        roles::load_all(tx.as_mut()).await
    }

    pub async fn get_role(&self, role_id: RoleId) -> ServiceResult<RoleListing> {
        let mut tx = self.store.begin_read().await?;
        roles::load_one(tx.as_mut(), role_id).await
    }

    /// The full permission vocabulary, sorted by name.
    pub async fn list_permissions(&self) -> ServiceResult<Vec<PermissionSummary>> {
        let mut tx = self.store.begin_read().await?;
        let mut summaries: Vec<PermissionSummary> = tx
            .list_permissions()
            .await?
            .iter()
            .map(PermissionSummary::from)
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}
