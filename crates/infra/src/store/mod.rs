//! Transactional access-control storage boundary.
//!
//! Stores expose plain data access over five tables (permissions, roles, users
//! and the two join tables). They know nothing about sync semantics; services
//! orchestrate multi-step changes inside a single [`AccessTx`].
//!
//! ## Transaction semantics
//!
//! - Everything done through one `AccessTx` becomes visible atomically on
//!   [`AccessTx::commit`].
//! - Dropping a transaction without committing discards all of its writes.
//! - `find_*_for_update` serializes concurrent writers of the same role/user.
//! - Unique and foreign-key constraints are enforced by every backend and
//!   reported as [`StoreError::UniqueViolation`] / [`StoreError::ForeignKeyViolation`].

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryAccessStore;
pub use postgres::PostgresAccessStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use gatehouse_auth::{Permission, Role, RolePermission, User, UserRole};
use gatehouse_core::{PermissionId, RoleId, UserId};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors; the service
/// layer folds constraint violations back into the domain taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Entry point to a transactional access-control store.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Start a read-write transaction.
    async fn begin(&self) -> Result<Box<dyn AccessTx + '_>, StoreError>;

    /// Start a read-only transaction that sees one consistent snapshot.
    async fn begin_read(&self) -> Result<Box<dyn AccessTx + '_>, StoreError>;
}

#[async_trait]
impl<S> AccessStore for Arc<S>
where
    S: AccessStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn AccessTx + '_>, StoreError> {
        (**self).begin().await
    }

    async fn begin_read(&self) -> Result<Box<dyn AccessTx + '_>, StoreError> {
        (**self).begin_read().await
    }
}

/// Unit of work over the access-control tables.
#[async_trait]
pub trait AccessTx: Send {
    // Permissions
    async fn insert_permission(&mut self, permission: &Permission) -> Result<(), StoreError>;
    /// Delete a permission and its role associations. Returns `false` if absent.
    async fn delete_permission(&mut self, id: PermissionId) -> Result<bool, StoreError>;
    async fn find_permission_by_name(&mut self, name: &str) -> Result<Option<Permission>, StoreError>;
    /// Fetch the permissions among `ids` that exist (missing ids are skipped).
    async fn find_permissions(&mut self, ids: &[PermissionId]) -> Result<Vec<Permission>, StoreError>;
    async fn list_permissions(&mut self) -> Result<Vec<Permission>, StoreError>;

    // Roles
    async fn insert_role(&mut self, role: &Role) -> Result<(), StoreError>;
    async fn update_role(&mut self, role: &Role) -> Result<(), StoreError>;
    /// Delete a role and both of its association sets. Returns `false` if absent.
    async fn delete_role(&mut self, id: RoleId) -> Result<bool, StoreError>;
    async fn find_role(&mut self, id: RoleId) -> Result<Option<Role>, StoreError>;
    /// Like `find_role`, but also locks the row until the transaction ends.
    async fn find_role_for_update(&mut self, id: RoleId) -> Result<Option<Role>, StoreError>;
    async fn find_role_by_name(&mut self, name: &str) -> Result<Option<Role>, StoreError>;
    /// Fetch the roles among `ids` that exist (missing ids are skipped).
    async fn find_roles(&mut self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError>;
    async fn list_roles(&mut self) -> Result<Vec<Role>, StoreError>;

    // Users
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;
    async fn update_user(&mut self, user: &User) -> Result<(), StoreError>;
    /// Delete a user and its role associations. Returns `false` if absent.
    async fn delete_user(&mut self, id: UserId) -> Result<bool, StoreError>;
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError>;
    /// Like `find_user`, but also locks the row until the transaction ends.
    async fn find_user_for_update(&mut self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&mut self) -> Result<Vec<User>, StoreError>;

    // Role ↔ permission join rows
    async fn role_permissions(&mut self, role_id: RoleId) -> Result<Vec<RolePermission>, StoreError>;
    async fn all_role_permissions(&mut self) -> Result<Vec<RolePermission>, StoreError>;
    async fn insert_role_permission(&mut self, link: RolePermission) -> Result<(), StoreError>;
    async fn delete_role_permission(&mut self, link: RolePermission) -> Result<(), StoreError>;

    // User ↔ role join rows
    async fn user_roles(&mut self, user_id: UserId) -> Result<Vec<UserRole>, StoreError>;
    async fn all_user_roles(&mut self) -> Result<Vec<UserRole>, StoreError>;
    async fn insert_user_role(&mut self, link: UserRole) -> Result<(), StoreError>;
    async fn delete_user_role(&mut self, link: UserRole) -> Result<(), StoreError>;

    /// Make every write of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
