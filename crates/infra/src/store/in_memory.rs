use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use gatehouse_auth::{Permission, Role, RolePermission, User, UserRole};
use gatehouse_core::{PermissionId, RoleId, UserId};

use super::{AccessStore, AccessTx, StoreError};

#[derive(Debug, Clone, Default)]
struct Tables {
    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, Role>,
    users: BTreeMap<UserId, User>,
    role_permissions: BTreeSet<RolePermission>,
    user_roles: BTreeSet<UserRole>,
}

/// In-memory access-control store.
///
/// Intended for tests/dev. A transaction holds the table lock for its whole
/// life and works on a private copy that replaces the shared tables on commit,
/// so transactions are fully serialized and never observe each other's
/// uncommitted writes.
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    tables: Mutex<Tables>,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn open(&self, read_only: bool) -> Box<dyn AccessTx + '_> {
        let guard = self.tables.lock().await;
        let work = (*guard).clone();
        Box::new(InMemoryTx {
            guard,
            work,
            read_only,
        })
    }
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn begin(&self) -> Result<Box<dyn AccessTx + '_>, StoreError> {
        Ok(self.open(false).await)
    }

    async fn begin_read(&self) -> Result<Box<dyn AccessTx + '_>, StoreError> {
        Ok(self.open(true).await)
    }
}

struct InMemoryTx<'a> {
    guard: MutexGuard<'a, Tables>,
    work: Tables,
    read_only: bool,
}

impl InMemoryTx<'_> {
    fn writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::Backend("write in read-only transaction".to_string()));
        }
        Ok(())
    }

    fn role_name_taken(&self, role: &Role) -> bool {
        self.work
            .roles
            .values()
            .any(|r| r.id != role.id && r.name == role.name)
    }

    fn email_taken(&self, user: &User) -> bool {
        self.work
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
    }
}

#[async_trait]
impl AccessTx for InMemoryTx<'_> {
    async fn insert_permission(&mut self, permission: &Permission) -> Result<(), StoreError> {
        self.writable()?;
        if self.work.permissions.contains_key(&permission.id) {
            return Err(StoreError::UniqueViolation("permissions_pkey".to_string()));
        }
        if self
            .work
            .permissions
            .values()
            .any(|p| p.name == permission.name)
        {
            return Err(StoreError::UniqueViolation("permissions_name_key".to_string()));
        }
        self.work.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn delete_permission(&mut self, id: PermissionId) -> Result<bool, StoreError> {
        self.writable()?;
        if self.work.permissions.remove(&id).is_none() {
            return Ok(false);
        }
        self.work.role_permissions.retain(|link| link.permission_id != id);
        Ok(true)
    }

    async fn find_permission_by_name(&mut self, name: &str) -> Result<Option<Permission>, StoreError> {
        Ok(self
            .work
            .permissions
            .values()
            .find(|p| p.name.as_str() == name)
            .cloned())
    }

    async fn find_permissions(&mut self, ids: &[PermissionId]) -> Result<Vec<Permission>, StoreError> {
        let wanted: BTreeSet<_> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| self.work.permissions.get(id).cloned())
            .collect())
    }

    async fn list_permissions(&mut self) -> Result<Vec<Permission>, StoreError> {
        Ok(self.work.permissions.values().cloned().collect())
    }

    async fn insert_role(&mut self, role: &Role) -> Result<(), StoreError> {
        self.writable()?;
        if self.work.roles.contains_key(&role.id) {
            return Err(StoreError::UniqueViolation("roles_pkey".to_string()));
        }
        if self.role_name_taken(role) {
            return Err(StoreError::UniqueViolation("roles_name_key".to_string()));
        }
        self.work.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update_role(&mut self, role: &Role) -> Result<(), StoreError> {
        self.writable()?;
        if self.role_name_taken(role) {
            return Err(StoreError::UniqueViolation("roles_name_key".to_string()));
        }
        if let Some(slot) = self.work.roles.get_mut(&role.id) {
            *slot = role.clone();
        }
        Ok(())
    }

    async fn delete_role(&mut self, id: RoleId) -> Result<bool, StoreError> {
        self.writable()?;
        if self.work.roles.remove(&id).is_none() {
            return Ok(false);
        }
        self.work.role_permissions.retain(|link| link.role_id != id);
        self.work.user_roles.retain(|link| link.role_id != id);
        Ok(true)
    }

    async fn find_role(&mut self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.work.roles.get(&id).cloned())
    }

    async fn find_role_for_update(&mut self, id: RoleId) -> Result<Option<Role>, StoreError> {
        // The store-wide lock is already held.
        self.find_role(id).await
    }

    async fn find_role_by_name(&mut self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self
            .work
            .roles
            .values()
            .find(|r| r.name.as_str() == name)
            .cloned())
    }

    async fn find_roles(&mut self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let wanted: BTreeSet<_> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| self.work.roles.get(id).cloned())
            .collect())
    }

    async fn list_roles(&mut self) -> Result<Vec<Role>, StoreError> {
        Ok(self.work.roles.values().cloned().collect())
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.writable()?;
        if self.work.users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation("users_pkey".to_string()));
        }
        if self.email_taken(user) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        self.work.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.writable()?;
        if self.email_taken(user) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        if let Some(slot) = self.work.users.get_mut(&user.id) {
            *slot = user.clone();
        }
        Ok(())
    }

    async fn delete_user(&mut self, id: UserId) -> Result<bool, StoreError> {
        self.writable()?;
        if self.work.users.remove(&id).is_none() {
            return Ok(false);
        }
        self.work.user_roles.retain(|link| link.user_id != id);
        Ok(true)
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn find_user_for_update(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        self.find_user(id).await
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .work
            .users
            .values()
            .find(|u| u.email.as_str() == email)
            .cloned())
    }

    async fn list_users(&mut self) -> Result<Vec<User>, StoreError> {
        Ok(self.work.users.values().cloned().collect())
    }

    async fn role_permissions(&mut self, role_id: RoleId) -> Result<Vec<RolePermission>, StoreError> {
        Ok(self
            .work
            .role_permissions
            .iter()
            .filter(|link| link.role_id == role_id)
            .copied()
            .collect())
    }

    async fn all_role_permissions(&mut self) -> Result<Vec<RolePermission>, StoreError> {
        Ok(self.work.role_permissions.iter().copied().collect())
    }

    async fn insert_role_permission(&mut self, link: RolePermission) -> Result<(), StoreError> {
        self.writable()?;
        if !self.work.roles.contains_key(&link.role_id) {
            return Err(StoreError::ForeignKeyViolation(
                "role_permissions_role_id_fkey".to_string(),
            ));
        }
        if !self.work.permissions.contains_key(&link.permission_id) {
            return Err(StoreError::ForeignKeyViolation(
                "role_permissions_permission_id_fkey".to_string(),
            ));
        }
        if !self.work.role_permissions.insert(link) {
            return Err(StoreError::UniqueViolation("role_permissions_pkey".to_string()));
        }
        Ok(())
    }

    async fn delete_role_permission(&mut self, link: RolePermission) -> Result<(), StoreError> {
        self.writable()?;
        self.work.role_permissions.remove(&link);
        Ok(())
    }

    async fn user_roles(&mut self, user_id: UserId) -> Result<Vec<UserRole>, StoreError> {
        Ok(self
            .work
            .user_roles
            .iter()
            .filter(|link| link.user_id == user_id)
            .copied()
            .collect())
    }

    async fn all_user_roles(&mut self) -> Result<Vec<UserRole>, StoreError> {
        Ok(self.work.user_roles.iter().copied().collect())
    }

    async fn insert_user_role(&mut self, link: UserRole) -> Result<(), StoreError> {
        self.writable()?;
        if !self.work.users.contains_key(&link.user_id) {
            return Err(StoreError::ForeignKeyViolation("user_roles_user_id_fkey".to_string()));
        }
        if !self.work.roles.contains_key(&link.role_id) {
            return Err(StoreError::ForeignKeyViolation("user_roles_role_id_fkey".to_string()));
        }
        if !self.work.user_roles.insert(link) {
            return Err(StoreError::UniqueViolation("user_roles_pkey".to_string()));
        }
        Ok(())
    }

    async fn delete_user_role(&mut self, link: UserRole) -> Result<(), StoreError> {
        self.writable()?;
        self.work.user_roles.remove(&link);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if this.read_only {
            return Ok(());
        }
        let InMemoryTx { mut guard, work, .. } = this;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use gatehouse_auth::Credential;
    use gatehouse_core::{Email, EntityName};

    use super::*;

    fn role(name: &str) -> Role {
        Role::new(RoleId::new(), EntityName::parse(name).unwrap(), Utc::now())
    }

    fn permission(name: &str) -> Permission {
        Permission::new(PermissionId::new(), EntityName::parse(name).unwrap(), Utc::now())
    }

    fn user(email: &str) -> User {
        User {
            id: UserId::new(),
            first_name: None,
            last_name: None,
            name: EntityName::parse("Test User").unwrap(),
            email: Email::parse(email).unwrap(),
            credential: Credential::hash("password").unwrap(),
            timestamps: gatehouse_core::Timestamps::new(Utc::now()),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = InMemoryAccessStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_role(&role("Editor")).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin_read().await.unwrap();
        assert!(tx.list_roles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryAccessStore::new();
        let editor = role("Editor");

        let mut tx = store.begin().await.unwrap();
        tx.insert_role(&editor).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin_read().await.unwrap();
        assert_eq!(tx.find_role_by_name("Editor").await.unwrap(), Some(editor));
    }

    #[tokio::test]
    async fn duplicate_names_violate_uniqueness() {
        let store = InMemoryAccessStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_role(&role("Editor")).await.unwrap();

        let err = tx.insert_role(&role("Editor")).await.unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation("roles_name_key".to_string()));

        tx.insert_user(&user("a@x.com")).await.unwrap();
        let err = tx.insert_user(&user("a@x.com")).await.unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation("users_email_key".to_string()));
    }

    #[tokio::test]
    async fn join_rows_require_both_ends() {
        let store = InMemoryAccessStore::new();
        let editor = role("Editor");
        let view = permission("view posts");

        let mut tx = store.begin().await.unwrap();
        tx.insert_role(&editor).await.unwrap();

        let err = tx
            .insert_role_permission(RolePermission::new(editor.id, view.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));

        tx.insert_permission(&view).await.unwrap();
        let link = RolePermission::new(editor.id, view.id);
        tx.insert_role_permission(link).await.unwrap();
        let err = tx.insert_role_permission(link).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn deleting_a_role_cascades_join_rows_only() {
        let store = InMemoryAccessStore::new();
        let editor = role("Editor");
        let view = permission("view posts");
        let jane = user("jane@example.com");

        let mut tx = store.begin().await.unwrap();
        tx.insert_role(&editor).await.unwrap();
        tx.insert_permission(&view).await.unwrap();
        tx.insert_user(&jane).await.unwrap();
        tx.insert_role_permission(RolePermission::new(editor.id, view.id)).await.unwrap();
        tx.insert_user_role(UserRole::new(jane.id, editor.id)).await.unwrap();

        assert!(tx.delete_role(editor.id).await.unwrap());
        assert!(!tx.delete_role(editor.id).await.unwrap());

        assert!(tx.all_role_permissions().await.unwrap().is_empty());
        assert!(tx.all_user_roles().await.unwrap().is_empty());
        assert_eq!(tx.list_permissions().await.unwrap().len(), 1);
        assert_eq!(tx.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_transactions_reject_writes() {
        let store = InMemoryAccessStore::new();
        let mut tx = store.begin_read().await.unwrap();
        let err = tx.insert_role(&role("Editor")).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
