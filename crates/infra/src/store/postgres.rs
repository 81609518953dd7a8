//! Postgres-backed access-control store.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|-----------------|----------|
//! | `23505` | `UniqueViolation` | Duplicate name/email or duplicate join row raced in by another writer |
//! | `23503` | `ForeignKeyViolation` | Join row references a role/user/permission deleted concurrently |
//! | Any other / non-database | `Backend` | Network errors, pool closed, corrupt rows, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresAccessStore` is `Send + Sync` and can be shared across tasks. Each
//! `AccessTx` owns one pooled connection for the life of its transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use gatehouse_auth::{Credential, Permission, Role, RolePermission, User, UserRole};
use gatehouse_core::{Email, EntityName, PermissionId, RoleId, Timestamps, UserId};

use super::{AccessStore, AccessTx, StoreError};

/// DDL for the five access-control tables. Safe to run repeatedly.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS permissions (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE CHECK (name <> ''),
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS roles (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE CHECK (name <> ''),
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id          UUID PRIMARY KEY,
    first_name  TEXT,
    last_name   TEXT,
    name        TEXT NOT NULL CHECK (name <> ''),
    email       TEXT NOT NULL UNIQUE CHECK (email <> ''),
    credential  TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id       UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission_id UUID NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id  UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id  UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);

CREATE INDEX IF NOT EXISTS role_permissions_permission_idx ON role_permissions (permission_id);
CREATE INDEX IF NOT EXISTS user_roles_role_idx ON user_roles (role_id);
"#;

const PERMISSION_COLUMNS: &str = "id, name, created_at, updated_at";
const ROLE_COLUMNS: &str = "id, name, created_at, updated_at";
const USER_COLUMNS: &str =
    "id, first_name, last_name, name, email, credential, created_at, updated_at";

/// Postgres-backed access-control store.
///
/// Transactions run at `READ COMMITTED`; writers that replace an association
/// set lock the owning row first (`SELECT ... FOR UPDATE`), so concurrent syncs
/// of the same set serialize. Read transactions use `REPEATABLE READ, READ ONLY`
/// so a projection sees a single snapshot.
#[derive(Debug, Clone)]
pub struct PostgresAccessStore {
    pool: Arc<PgPool>,
}

impl PostgresAccessStore {
    /// Create a new PostgresAccessStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool and wrap it.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the access-control tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn install_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("install_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccessStore for PostgresAccessStore {
    async fn begin(&self) -> Result<Box<dyn AccessTx + '_>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn begin_read(&self) -> Result<Box<dyn AccessTx + '_>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn fetch_permissions(
        &mut self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Permission>, StoreError> {
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| PermissionRow::from_row(row).map_err(|e| map_sqlx_error(operation, e))?.into_permission())
            .collect()
    }

    async fn fetch_roles(
        &mut self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Role>, StoreError> {
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| RoleRow::from_row(row).map_err(|e| map_sqlx_error(operation, e))?.into_role())
            .collect()
    }

    async fn fetch_users(
        &mut self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<User>, StoreError> {
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| UserRow::from_row(row).map_err(|e| map_sqlx_error(operation, e))?.into_user())
            .collect()
    }

    async fn execute(
        &mut self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<u64, StoreError> {
        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AccessTx for PgTx {
    async fn insert_permission(&mut self, permission: &Permission) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO permissions (id, name, created_at, updated_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(*permission.id.as_uuid())
        .bind(permission.name.as_str().to_string())
        .bind(permission.timestamps.created_at)
        .bind(permission.timestamps.updated_at);
        self.execute("insert_permission", query).await?;
        Ok(())
    }

    async fn delete_permission(&mut self, id: PermissionId) -> Result<bool, StoreError> {
        let query = sqlx::query("DELETE FROM permissions WHERE id = $1").bind(*id.as_uuid());
        Ok(self.execute("delete_permission", query).await? > 0)
    }

    async fn find_permission_by_name(&mut self, name: &str) -> Result<Option<Permission>, StoreError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = $1");
        let query = sqlx::query(&sql).bind(name.to_string());
        Ok(self.fetch_permissions("find_permission_by_name", query).await?.pop())
    }

    async fn find_permissions(&mut self, ids: &[PermissionId]) -> Result<Vec<Permission>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ANY($1) ORDER BY id"
        );
        let query = sqlx::query(&sql).bind(ids);
        self.fetch_permissions("find_permissions", query).await
    }

    async fn list_permissions(&mut self) -> Result<Vec<Permission>, StoreError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY id");
        let query = sqlx::query(&sql);
        self.fetch_permissions("list_permissions", query).await
    }

    async fn insert_role(&mut self, role: &Role) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO roles (id, name, created_at, updated_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(*role.id.as_uuid())
        .bind(role.name.as_str().to_string())
        .bind(role.timestamps.created_at)
        .bind(role.timestamps.updated_at);
        self.execute("insert_role", query).await?;
        Ok(())
    }

    async fn update_role(&mut self, role: &Role) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE roles SET name = $2, updated_at = $3 WHERE id = $1")
            .bind(*role.id.as_uuid())
            .bind(role.name.as_str().to_string())
            .bind(role.timestamps.updated_at);
        self.execute("update_role", query).await?;
        Ok(())
    }

    async fn delete_role(&mut self, id: RoleId) -> Result<bool, StoreError> {
        let query = sqlx::query("DELETE FROM roles WHERE id = $1").bind(*id.as_uuid());
        Ok(self.execute("delete_role", query).await? > 0)
    }

    async fn find_role(&mut self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let query = sqlx::query(&sql).bind(*id.as_uuid());
        Ok(self.fetch_roles("find_role", query).await?.pop())
    }

    async fn find_role_for_update(&mut self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 FOR UPDATE");
        let query = sqlx::query(&sql).bind(*id.as_uuid());
        Ok(self.fetch_roles("find_role_for_update", query).await?.pop())
    }

    async fn find_role_by_name(&mut self, name: &str) -> Result<Option<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1");
        let query = sqlx::query(&sql).bind(name.to_string());
        Ok(self.fetch_roles("find_role_by_name", query).await?.pop())
    }

    async fn find_roles(&mut self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ANY($1) ORDER BY id");
        let query = sqlx::query(&sql).bind(ids);
        self.fetch_roles("find_roles", query).await
    }

    async fn list_roles(&mut self) -> Result<Vec<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY id");
        let query = sqlx::query(&sql);
        self.fetch_roles("list_roles", query).await
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO users (
                id, first_name, last_name, name, email, credential, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*user.id.as_uuid())
        .bind(user.first_name.clone())
        .bind(user.last_name.clone())
        .bind(user.name.as_str().to_string())
        .bind(user.email.as_str().to_string())
        .bind(user.credential.as_phc().to_string())
        .bind(user.timestamps.created_at)
        .bind(user.timestamps.updated_at);
        self.execute("insert_user", query).await?;
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE users SET
                first_name = $2,
                last_name = $3,
                name = $4,
                email = $5,
                credential = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(*user.id.as_uuid())
        .bind(user.first_name.clone())
        .bind(user.last_name.clone())
        .bind(user.name.as_str().to_string())
        .bind(user.email.as_str().to_string())
        .bind(user.credential.as_phc().to_string())
        .bind(user.timestamps.updated_at);
        self.execute("update_user", query).await?;
        Ok(())
    }

    async fn delete_user(&mut self, id: UserId) -> Result<bool, StoreError> {
        let query = sqlx::query("DELETE FROM users WHERE id = $1").bind(*id.as_uuid());
        Ok(self.execute("delete_user", query).await? > 0)
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let query = sqlx::query(&sql).bind(*id.as_uuid());
        Ok(self.fetch_users("find_user", query).await?.pop())
    }

    async fn find_user_for_update(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        let query = sqlx::query(&sql).bind(*id.as_uuid());
        Ok(self.fetch_users("find_user_for_update", query).await?.pop())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let query = sqlx::query(&sql).bind(email.to_string());
        Ok(self.fetch_users("find_user_by_email", query).await?.pop())
    }

    async fn list_users(&mut self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let query = sqlx::query(&sql);
        self.fetch_users("list_users", query).await
    }

    async fn role_permissions(&mut self, role_id: RoleId) -> Result<Vec<RolePermission>, StoreError> {
        let rows = sqlx::query(
            "SELECT role_id, permission_id FROM role_permissions WHERE role_id = $1 ORDER BY permission_id",
        )
        .bind(*role_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("role_permissions", e))?;
        rows.iter().map(role_permission_from_row).collect()
    }

    async fn all_role_permissions(&mut self) -> Result<Vec<RolePermission>, StoreError> {
        let rows = sqlx::query(
            "SELECT role_id, permission_id FROM role_permissions ORDER BY role_id, permission_id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("all_role_permissions", e))?;
        rows.iter().map(role_permission_from_row).collect()
    }

    async fn insert_role_permission(&mut self, link: RolePermission) -> Result<(), StoreError> {
        let query =
            sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
                .bind(*link.role_id.as_uuid())
                .bind(*link.permission_id.as_uuid());
        self.execute("insert_role_permission", query).await?;
        Ok(())
    }

    async fn delete_role_permission(&mut self, link: RolePermission) -> Result<(), StoreError> {
        let query =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
                .bind(*link.role_id.as_uuid())
                .bind(*link.permission_id.as_uuid());
        self.execute("delete_role_permission", query).await?;
        Ok(())
    }

    async fn user_roles(&mut self, user_id: UserId) -> Result<Vec<UserRole>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, role_id FROM user_roles WHERE user_id = $1 ORDER BY role_id",
        )
        .bind(*user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("user_roles", e))?;
        rows.iter().map(user_role_from_row).collect()
    }

    async fn all_user_roles(&mut self) -> Result<Vec<UserRole>, StoreError> {
        let rows = sqlx::query("SELECT user_id, role_id FROM user_roles ORDER BY user_id, role_id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("all_user_roles", e))?;
        rows.iter().map(user_role_from_row).collect()
    }

    async fn insert_user_role(&mut self, link: UserRole) -> Result<(), StoreError> {
        let query = sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(*link.user_id.as_uuid())
            .bind(*link.role_id.as_uuid());
        self.execute("insert_user_role", query).await?;
        Ok(())
    }

    async fn delete_user_role(&mut self, link: UserRole) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(*link.user_id.as_uuid())
            .bind(*link.role_id.as_uuid());
        self.execute("delete_user_role", query).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(constraint),
                Some("23503") => StoreError::ForeignKeyViolation(constraint),
                _ => StoreError::Backend(format!(
                    "database error in {}: {}",
                    operation,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn corrupt(table: &str, detail: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {table} row: {detail}"))
}

fn role_permission_from_row(row: &PgRow) -> Result<RolePermission, StoreError> {
    let role_id: Uuid = row
        .try_get("role_id")
        .map_err(|e| map_sqlx_error("decode_role_permission", e))?;
    let permission_id: Uuid = row
        .try_get("permission_id")
        .map_err(|e| map_sqlx_error("decode_role_permission", e))?;
    Ok(RolePermission::new(
        RoleId::from_uuid(role_id),
        PermissionId::from_uuid(permission_id),
    ))
}

fn user_role_from_row(row: &PgRow) -> Result<UserRole, StoreError> {
    let user_id: Uuid = row
        .try_get("user_id")
        .map_err(|e| map_sqlx_error("decode_user_role", e))?;
    let role_id: Uuid = row
        .try_get("role_id")
        .map_err(|e| map_sqlx_error("decode_user_role", e))?;
    Ok(UserRole::new(UserId::from_uuid(user_id), RoleId::from_uuid(role_id)))
}

// SQLx row types

#[derive(Debug)]
struct PermissionRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PermissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PermissionRow {
    fn into_permission(self) -> Result<Permission, StoreError> {
        Ok(Permission {
            id: PermissionId::from_uuid(self.id),
            name: EntityName::parse(&self.name).map_err(|e| corrupt("permissions", e))?,
            timestamps: Timestamps {
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }
}

#[derive(Debug)]
struct RoleRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl RoleRow {
    fn into_role(self) -> Result<Role, StoreError> {
        Ok(Role {
            id: RoleId::from_uuid(self.id),
            name: EntityName::parse(&self.name).map_err(|e| corrupt("roles", e))?,
            timestamps: Timestamps {
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }
}

struct UserRow {
    id: Uuid,
    first_name: Option<String>,
    last_name: Option<String>,
    name: String,
    email: String,
    credential: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            credential: row.try_get("credential")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl UserRow {
    fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            id: UserId::from_uuid(self.id),
            first_name: self.first_name,
            last_name: self.last_name,
            name: EntityName::parse(&self.name).map_err(|e| corrupt("users", e))?,
            email: Email::parse(&self.email).map_err(|e| corrupt("users", e))?,
            credential: Credential::from_phc(self.credential).map_err(|e| corrupt("users", e))?,
            timestamps: Timestamps {
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }
}
