//! Application services over the access-control store.
//!
//! Each public operation runs in exactly one store transaction. Composite
//! operations ("create user + assign role", "update role + sync permissions")
//! reuse the transaction-scoped assignment functions so they commit or roll
//! back as one unit.

pub mod assignment;
pub mod permissions;
pub mod roles;
pub mod sync;
pub mod users;

pub use assignment::{AssignmentService, RoleSetPolicy};
pub use permissions::PermissionService;
pub use roles::RoleService;
pub use sync::{SyncPlan, SyncReport};
pub use users::UserService;

use thiserror::Error;

use gatehouse_auth::CredentialError;
use gatehouse_core::DomainError;

use crate::store::StoreError;

/// Error returned by every service operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Validation, reference, conflict or not-found failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage failure that is not a constraint violation.
    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UniqueViolation(constraint) => ServiceError::Domain(
                DomainError::conflict(format!("already exists ({constraint})")),
            ),
            StoreError::ForeignKeyViolation(constraint) => ServiceError::Domain(
                DomainError::reference(format!("referenced record is missing ({constraint})")),
            ),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_validation)
    }

    pub fn is_reference(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_reference)
    }

    pub fn is_conflict(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_conflict)
    }

    pub fn is_not_found(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violations_fold_into_domain_errors() {
        let unique: ServiceError = StoreError::UniqueViolation("users_email_key".into()).into();
        assert!(unique.is_conflict());
        assert!(unique.to_string().contains("users_email_key"));

        let fk: ServiceError = StoreError::ForeignKeyViolation("user_roles_role_id_fkey".into()).into();
        assert!(fk.is_reference());
    }

    #[test]
    fn backend_failures_stay_store_errors() {
        let err: ServiceError = StoreError::Backend("pool closed".into()).into();
        assert!(matches!(err, ServiceError::Store(_)));
        assert!(err.as_domain().is_none());
    }
}
