//! `gatehouse-auth`: access-control records and caller identity.
//!
//! This crate is intentionally decoupled from storage: it defines what users,
//! roles, permissions and their associations look like, and validates input.

pub mod credential;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use credential::{Credential, CredentialError, MIN_PASSWORD_LEN};
pub use permissions::Permission;
pub use principal::{Actor, CallerContext};
pub use roles::{NewRole, Role, RoleChanges, RolePermission};
pub use user::{derive_name, NewUser, User, UserChanges, UserProfile, UserRole};
