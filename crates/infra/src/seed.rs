//! Demo data for development databases.
//!
//! Seeding is idempotent: permissions and roles are reused by name and users
//! whose email already exists are skipped, so it can run on every start.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument};

use gatehouse_auth::{CallerContext, NewRole, NewUser, Permission, Role};
use gatehouse_core::{DomainError, PermissionId};

use crate::services::{PermissionService, RoleService, RoleSetPolicy, ServiceResult, UserService};
use crate::store::AccessStore;

pub const PERMISSION_NAMES: [&str; 8] = [
    "view posts",
    "create posts",
    "edit posts",
    "delete posts",
    "publish posts",
    "unpublish posts",
    "manage users",
    "manage roles",
];

pub const ROLE_NAMES: [&str; 3] = ["Admin", "Editor", "User"];

pub const ADMIN_ROLE: &str = "Admin";

const FIRST_NAMES: [&str; 10] = [
    "John", "Jane", "Michael", "Emily", "David", "Sarah", "Robert", "Jennifer", "William", "Lisa",
];

const LAST_NAMES: [&str; 10] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Miller", "Davis", "Garcia", "Rodriguez",
    "Wilson",
];

const DEMO_PASSWORD: &str = "password";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "password123";

/// How many of each record a seeding run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub users_created: usize,
}

/// Populates the permission and role vocabularies, demo users and an admin.
pub struct Seeder<S> {
    store: S,
    users: UserService<S>,
    roles: RoleService<S>,
    permissions: PermissionService<S>,
    demo_users: usize,
}

impl<S> Seeder<S>
where
    S: AccessStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            users: UserService::new(store.clone()),
            roles: RoleService::new(store.clone()),
            permissions: PermissionService::new(store.clone()),
            store,
            demo_users: 20,
        }
    }

    pub fn with_demo_users(mut self, count: usize) -> Self {
        self.demo_users = count;
        self
    }

    pub fn with_policy(mut self, policy: RoleSetPolicy) -> Self {
        self.users = self.users.with_policy(policy);
        self
    }

    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id()),
        err
    )]
    pub async fn run<R>(&self, caller: &CallerContext, rng: &mut R) -> ServiceResult<SeedReport>
    where
        R: Rng + ?Sized,
    {
        let mut report = SeedReport::default();

        let mut permission_ids = Vec::with_capacity(PERMISSION_NAMES.len());
        for name in PERMISSION_NAMES {
            let permission = match self.find_permission(name).await? {
                Some(existing) => existing,
                None => {
                    report.permissions_created += 1;
                    self.permissions.create(caller, name).await?
                }
            };
            permission_ids.push(permission.id);
        }

        let mut roles = Vec::with_capacity(ROLE_NAMES.len());
        for name in ROLE_NAMES {
            // Drawn even for existing roles so one seed always yields one stream.
            let grants = if name == ADMIN_ROLE {
                permission_ids.clone()
            } else {
                random_subset(&permission_ids, rng)
            };
            let role = match self.find_role(name).await? {
                Some(existing) => existing,
                None => {
                    report.roles_created += 1;
                    self.roles.create(caller, NewRole::new(name, grants)).await?
                }
            };
            roles.push(role);
        }

        // The admin is written last, so its presence marks a finished demo batch.
        if self.user_exists(ADMIN_EMAIL).await? {
            info!("demo users already seeded");
        } else {
            for i in 0..self.demo_users {
                let first = pick(&FIRST_NAMES, rng)?;
                let last = pick(&LAST_NAMES, rng)?;
                let role = roles
                    .choose(rng)
                    .ok_or_else(|| DomainError::validation("no roles to assign"))?;
                let suffix = if i > 0 { i.to_string() } else { String::new() };
                let email = format!(
                    "{}.{}{}@example.com",
                    first.to_lowercase(),
                    last.to_lowercase(),
                    suffix
                );

                if self.create_user_if_absent(caller, first, last, &email, DEMO_PASSWORD, role).await? {
                    report.users_created += 1;
                }
            }
        }

        let admin = roles
            .iter()
            .find(|r| r.name.as_str() == ADMIN_ROLE)
            .ok_or_else(|| DomainError::validation("admin role missing"))?;
        if self
            .create_user_if_absent(caller, "Admin", "User", ADMIN_EMAIL, ADMIN_PASSWORD, admin)
            .await?
        {
            report.users_created += 1;
        }

        info!(
            permissions_created = report.permissions_created,
            roles_created = report.roles_created,
            users_created = report.users_created,
            "seeding finished"
        );
        Ok(report)
    }

    async fn find_permission(&self, name: &str) -> ServiceResult<Option<Permission>> {
        let mut tx = self.store.begin_read().await?;
        Ok(tx.find_permission_by_name(name).await?)
    }

    async fn find_role(&self, name: &str) -> ServiceResult<Option<Role>> {
        let mut tx = self.store.begin_read().await?;
        Ok(tx.find_role_by_name(name).await?)
    }

    async fn user_exists(&self, email: &str) -> ServiceResult<bool> {
        let mut tx = self.store.begin_read().await?;
        Ok(tx.find_user_by_email(email).await?.is_some())
    }

    async fn create_user_if_absent(
        &self,
        caller: &CallerContext,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        role: &Role,
    ) -> ServiceResult<bool> {
        if self.user_exists(email).await? {
            return Ok(false);
        }

        let cmd = NewUser {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role_id: role.id,
        };
        self.users.create(caller, cmd).await?;
        Ok(true)
    }
}

fn pick<'a, R>(names: &[&'a str], rng: &mut R) -> ServiceResult<&'a str>
where
    R: Rng + ?Sized,
{
    names
        .choose(rng)
        .copied()
        .ok_or_else(|| DomainError::validation("empty name list").into())
}

/// A random non-empty subset (when `ids` is non-empty), in vocabulary order.
fn random_subset<R>(ids: &[PermissionId], rng: &mut R) -> Vec<PermissionId>
where
    R: Rng + ?Sized,
{
    if ids.is_empty() {
        return Vec::new();
    }
    let count = rng.gen_range(1..=ids.len());
    let mut chosen: Vec<PermissionId> = ids.choose_multiple(rng, count).copied().collect();
    chosen.sort_by_key(|id| ids.iter().position(|p| p == id));
    chosen
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::projections::AccessQueries;
    use crate::store::InMemoryAccessStore;

    #[test]
    fn random_subset_is_never_empty() {
        let ids: Vec<PermissionId> = (0..8).map(|_| PermissionId::new()).collect();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let subset = random_subset(&ids, &mut rng);
            assert!(!subset.is_empty());
            assert!(subset.iter().all(|id| ids.contains(id)));
        }
    }

    #[tokio::test]
    async fn seeds_vocabulary_users_and_admin() {
        let store = Arc::new(InMemoryAccessStore::new());
        let seeder = Seeder::new(store.clone()).with_demo_users(4);
        let mut rng = StdRng::seed_from_u64(42);

        let report = seeder.run(&CallerContext::system(), &mut rng).await.unwrap();

        assert_eq!(report.permissions_created, PERMISSION_NAMES.len());
        assert_eq!(report.roles_created, ROLE_NAMES.len());
        assert_eq!(report.users_created, 5);

        let queries = AccessQueries::new(store.clone());
        let roles = queries.list_roles_with_permissions().await.unwrap();
        let admin = roles.iter().find(|r| r.name == ADMIN_ROLE).unwrap();
        assert_eq!(admin.permissions.len(), PERMISSION_NAMES.len());
        assert!(roles.iter().all(|r| !r.permissions.is_empty()));

        let users = queries.list_users_with_roles().await.unwrap();
        assert!(users.iter().all(|u| u.roles.len() == 1));
        let admin_user = users.iter().find(|u| u.email == ADMIN_EMAIL).unwrap();
        assert_eq!(admin_user.name, "Admin User");
        assert_eq!(admin_user.roles, vec![ADMIN_ROLE.to_string()]);
        assert!(users.iter().any(|u| u.email.ends_with("3@example.com")));
    }

    #[tokio::test]
    async fn seeding_twice_writes_nothing_new() {
        let store = Arc::new(InMemoryAccessStore::new());
        let seeder = Seeder::new(store.clone()).with_demo_users(3);
        let caller = CallerContext::system();

        seeder.run(&caller, &mut StdRng::seed_from_u64(1)).await.unwrap();
        let second = seeder.run(&caller, &mut StdRng::seed_from_u64(1)).await.unwrap();

        assert_eq!(second, SeedReport::default());
    }

    #[tokio::test]
    async fn reseeding_with_another_rng_adds_no_users() {
        let store = Arc::new(InMemoryAccessStore::new());
        let seeder = Seeder::new(store.clone()).with_demo_users(20);
        let caller = CallerContext::system();

        let first = seeder.run(&caller, &mut StdRng::seed_from_u64(1)).await.unwrap();
        let second = seeder.run(&caller, &mut StdRng::seed_from_u64(2)).await.unwrap();

        assert_eq!(first.users_created, 21);
        assert_eq!(second, SeedReport::default());
        let users = AccessQueries::new(store).list_users_with_roles().await.unwrap();
        assert_eq!(users.len(), 21);
    }

    #[tokio::test]
    async fn same_seed_gives_same_names_and_grants() {
        async fn snapshot(seed: u64) -> (Vec<(String, Vec<String>)>, Vec<String>) {
            let store = Arc::new(InMemoryAccessStore::new());
            Seeder::new(store.clone())
                .with_demo_users(5)
                .run(&CallerContext::system(), &mut StdRng::seed_from_u64(seed))
                .await
                .unwrap();

            let queries = AccessQueries::new(store);
            let mut roles: Vec<(String, Vec<String>)> = queries
                .list_roles_with_permissions()
                .await
                .unwrap()
                .into_iter()
                .map(|r| {
                    let names = r.permission_names().iter().map(|n| n.to_string()).collect();
                    (r.name, names)
                })
                .collect();
            roles.sort();
            let mut emails: Vec<String> = queries
                .list_users_with_roles()
                .await
                .unwrap()
                .into_iter()
                .map(|u| u.email)
                .collect();
            emails.sort();
            (roles, emails)
        }

        assert_eq!(snapshot(9).await, snapshot(9).await);
    }
}
