//! End-to-end consistency checks for the access-control layer.
//!
//! The in-memory suite always runs. The Postgres suite runs against the
//! database named by `DATABASE_URL` and is skipped when it is unset.

use std::collections::BTreeSet;
use std::sync::Arc;

use gatehouse_auth::{CallerContext, NewRole, NewUser, RoleChanges, UserChanges};
use gatehouse_core::{PermissionId, RoleId};
use gatehouse_infra::{
    AccessQueries, AccessStore, AssignmentService, InMemoryAccessStore, PermissionService,
    PostgresAccessStore, RoleService, UserService,
};

struct Harness<S> {
    permissions: PermissionService<S>,
    roles: RoleService<S>,
    users: UserService<S>,
    assignment: AssignmentService<S>,
    queries: AccessQueries<S>,
    caller: CallerContext,
}

impl<S> Harness<S>
where
    S: AccessStore + Clone,
{
    fn new(store: S) -> Self {
        Self {
            permissions: PermissionService::new(store.clone()),
            roles: RoleService::new(store.clone()),
            users: UserService::new(store.clone()),
            assignment: AssignmentService::new(store.clone()),
            queries: AccessQueries::new(store),
            caller: CallerContext::system(),
        }
    }

    async fn permission(&self, name: &str) -> PermissionId {
        self.permissions.create(&self.caller, name).await.unwrap().id
    }

    async fn role(&self, name: &str, permission_ids: Vec<PermissionId>) -> RoleId {
        self.roles
            .create(&self.caller, NewRole::new(name, permission_ids))
            .await
            .unwrap()
            .id
    }

    async fn permission_names(&self, role_id: RoleId) -> Vec<String> {
        self.queries
            .get_role(role_id)
            .await
            .unwrap()
            .permissions
            .into_iter()
            .map(|p| p.name)
            .collect()
    }
}

fn new_user(first: &str, last: &str, email: &str, role_id: RoleId) -> NewUser {
    NewUser {
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: email.to_string(),
        password: "password".to_string(),
        role_id,
    }
}

fn in_memory() -> Harness<Arc<InMemoryAccessStore>> {
    Harness::new(Arc::new(InMemoryAccessStore::new()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn editor_permissions_are_replaced_not_merged() {
    let h = in_memory();
    let view = h.permission("view posts").await;
    let edit = h.permission("edit posts").await;
    let publish = h.permission("publish posts").await;
    let editor = h.role("Editor", vec![edit, view]).await;

    h.assignment
        .sync_role_permissions(&h.caller, editor, &[view, publish])
        .await
        .unwrap();

    assert_eq!(h.permission_names(editor).await, vec!["publish posts", "view posts"]);
}

#[tokio::test]
async fn duplicate_email_leaves_one_user() {
    let h = in_memory();
    let reader = h.role("User", vec![]).await;
    h.users
        .create(&h.caller, new_user("A", "One", "a@x.com", reader))
        .await
        .unwrap();

    let err = h
        .users
        .create(&h.caller, new_user("A", "Two", "a@x.com", reader))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    let users = h.queries.list_users_with_roles().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "A One");
}

#[tokio::test]
async fn assigning_missing_admin_role_changes_nothing() {
    let h = in_memory();
    let editor = h.role("Editor", vec![]).await;
    let user = h
        .users
        .create(&h.caller, new_user("Jane", "Smith", "jane@example.com", editor))
        .await
        .unwrap();

    let err = h
        .assignment
        .assign_single_role(&h.caller, user.id, "Admin")
        .await
        .unwrap_err();

    assert!(err.is_reference());
    let listing = h.queries.get_user(user.id).await.unwrap();
    assert_eq!(listing.roles, vec!["Editor"]);
}

#[tokio::test]
async fn deleting_a_role_keeps_users_and_permissions() {
    let h = in_memory();
    let view = h.permission("view posts").await;
    let editor = h.role("Editor", vec![view]).await;
    let reader = h.role("User", vec![view]).await;
    let user = h
        .users
        .create(&h.caller, new_user("Jane", "Smith", "jane@example.com", editor))
        .await
        .unwrap();
    h.assignment
        .sync_user_roles(&h.caller, user.id, &[editor, reader])
        .await
        .unwrap();

    h.roles.delete(&h.caller, editor).await.unwrap();

    let listing = h.queries.get_user(user.id).await.unwrap();
    assert_eq!(listing.roles, vec!["User"]);
    assert_eq!(h.queries.list_permissions().await.unwrap().len(), 1);
    let roles = h.queries.list_roles_with_permissions().await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].permission_names(), vec!["view posts"]);
    assert!(h.queries.get_role(editor).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn listings_reflect_writes_immediately() {
    let h = in_memory();
    let admin = h.role("Admin", vec![]).await;
    let editor = h.role("Editor", vec![]).await;
    let user = h
        .users
        .create(&h.caller, new_user("Jane", "Smith", "jane@example.com", editor))
        .await
        .unwrap();

    let changes = UserChanges {
        roles: Some(vec![editor, admin]),
        ..Default::default()
    };
    h.users.update(&h.caller, user.id, changes).await.unwrap();

    let users = h.queries.list_users_with_roles().await.unwrap();
    assert_eq!(users[0].roles, vec!["Admin", "Editor"]);
    assert_eq!(users[0].role_summary(), "Admin, Editor");
}

#[tokio::test]
async fn role_rename_respects_uniqueness() {
    let h = in_memory();
    let editor = h.role("Editor", vec![]).await;
    h.role("Admin", vec![]).await;

    let clash = RoleChanges {
        name: "Admin".to_string(),
        permission_ids: None,
    };
    assert!(h.roles.update(&h.caller, editor, clash).await.unwrap_err().is_conflict());

    let same = RoleChanges {
        name: "Editor".to_string(),
        permission_ids: Some(vec![]),
    };
    h.roles.update(&h.caller, editor, same).await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_syncs_never_mix_sets() {
    let store = Arc::new(InMemoryAccessStore::new());
    let h = Harness::new(store.clone());
    let a: Vec<PermissionId> = vec![h.permission("a1").await, h.permission("a2").await];
    let b: Vec<PermissionId> = vec![h.permission("b1").await, h.permission("b2").await];
    let role = h.role("Contested", vec![]).await;

    let assignment = Arc::new(AssignmentService::new(store.clone()));
    let mut handles = Vec::new();
    for i in 0..32 {
        let assignment = assignment.clone();
        let set = if i % 2 == 0 { a.clone() } else { b.clone() };
        handles.push(tokio::spawn(async move {
            assignment
                .sync_role_permissions(&CallerContext::system(), role, &set)
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let listing = AccessQueries::new(store).get_role(role).await.unwrap();
    let got: BTreeSet<PermissionId> = listing.permissions.iter().map(|p| p.id).collect();
    let a: BTreeSet<PermissionId> = a.into_iter().collect();
    let b: BTreeSet<PermissionId> = b.into_iter().collect();
    assert!(got == a || got == b, "mixed permission set: {got:?}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Postgres
// ─────────────────────────────────────────────────────────────────────────────

async fn postgres() -> Option<Harness<Arc<PostgresAccessStore>>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let store = PostgresAccessStore::connect(&url, 5).await.unwrap();
    store.install_schema().await.unwrap();
    Some(Harness::new(Arc::new(store)))
}

fn unique(name: &str) -> String {
    format!("{name} {}", uuid::Uuid::now_v7().simple())
}

#[tokio::test]
async fn postgres_sync_and_uniqueness() {
    let Some(h) = postgres().await else {
        eprintln!("DATABASE_URL not set; skipping postgres suite");
        return;
    };

    let view = h.permission(&unique("view posts")).await;
    let edit = h.permission(&unique("edit posts")).await;
    let publish = h.permission(&unique("publish posts")).await;
    let editor = h.role(&unique("Editor"), vec![edit, view]).await;

    let report = h
        .assignment
        .sync_role_permissions(&h.caller, editor, &[view, publish])
        .await
        .unwrap();
    assert_eq!(report.added, vec![publish]);
    assert_eq!(report.removed, vec![edit]);

    let ghost = h
        .assignment
        .sync_role_permissions(&h.caller, editor, &[PermissionId::new()])
        .await
        .unwrap_err();
    assert!(ghost.is_reference());
    assert_eq!(h.permission_names(editor).await.len(), 2);

    let email = format!("{}@example.com", uuid::Uuid::now_v7().simple());
    let user = h
        .users
        .create(&h.caller, new_user("Jane", "Smith", &email, editor))
        .await
        .unwrap();
    let dup = h
        .users
        .create(&h.caller, new_user("Jane", "Again", &email.to_uppercase(), editor))
        .await
        .unwrap_err();
    assert!(dup.is_conflict());

    h.roles.delete(&h.caller, editor).await.unwrap();
    assert!(h.queries.get_user(user.id).await.unwrap().roles.is_empty());

    h.users.delete(&h.caller, user.id).await.unwrap();
    for id in [view, edit, publish] {
        h.permissions.delete(&h.caller, id).await.unwrap();
    }
}
