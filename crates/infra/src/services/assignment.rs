//! Role/permission assignment: total replacement of association sets.
//!
//! ## Sync algorithm
//!
//! ```text
//! lock owner row (role or user)
//!   ↓
//! resolve every desired id (unknown id → Reference, nothing written)
//!   ↓
//! removals = current - desired, additions = desired - current
//!   ↓
//! delete removals, insert additions, commit
//! ```
//!
//! Any failure drops the transaction, so the previous set stays intact.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use gatehouse_auth::{CallerContext, RolePermission, UserRole};
use gatehouse_core::{DomainError, DomainResult, PermissionId, RoleId, UserId};

use crate::store::{AccessStore, AccessTx};

use super::sync::{SyncPlan, SyncReport};
use super::ServiceResult;

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Whether an explicit user role assignment may leave the user with no roles.
///
/// Applied uniformly to every user role sync. Role deletion is not an
/// assignment and can still leave a user without roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSetPolicy {
    #[default]
    AtLeastOne,
    AllowEmpty,
}

impl RoleSetPolicy {
    pub fn check(self, desired: &BTreeSet<RoleId>) -> DomainResult<()> {
        match self {
            RoleSetPolicy::AtLeastOne if desired.is_empty() => Err(DomainError::validation(
                "a user must keep at least one role",
            )),
            _ => Ok(()),
        }
    }
}

impl FromStr for RoleSetPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at_least_one" => Ok(RoleSetPolicy::AtLeastOne),
            "allow_empty" => Ok(RoleSetPolicy::AllowEmpty),
            other => Err(DomainError::validation(format!(
                "unknown role set policy '{other}' (expected at_least_one or allow_empty)"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Replaces role permission sets and user role sets atomically.
#[derive(Debug, Clone)]
pub struct AssignmentService<S> {
    store: S,
    policy: RoleSetPolicy,
}

impl<S> AssignmentService<S>
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

    pub fn policy(&self) -> RoleSetPolicy {
        self.policy
    }

    /// Make the role's permission set exactly `permission_ids`.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), role_id = %role_id),
        err
    )]
    pub async fn sync_role_permissions(
        &self,
        caller: &CallerContext,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> ServiceResult<SyncReport<PermissionId>> {
        let mut tx = self.store.begin().await?;
        let report = sync_role_permissions_in(tx.as_mut(), role_id, permission_ids).await?;
        tx.commit().await?;

        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            "role permissions synced"
        );
        Ok(report)
    }

    /// Make the user's role set exactly `role_ids`, subject to the role set policy.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), user_id = %user_id),
        err
    )]
    pub async fn sync_user_roles(
        &self,
        caller: &CallerContext,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> ServiceResult<SyncReport<RoleId>> {
        let mut tx = self.store.begin().await?;
        let report = sync_user_roles_in(tx.as_mut(), self.policy, user_id, role_ids).await?;
        tx.commit().await?;

        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            "user roles synced"
        );
        Ok(report)
    }

    /// Give the user exactly one role, looked up by name.
    #[instrument(
        skip_all,
        fields(actor = %caller.actor(), correlation_id = %caller.correlation_id(), user_id = %user_id),
        err
    )]
    pub async fn assign_single_role(
        &self,
        caller: &CallerContext,
        user_id: UserId,
        role_name: &str,
    ) -> ServiceResult<SyncReport<RoleId>> {
        let mut tx = self.store.begin().await?;
        let report = assign_single_role_in(tx.as_mut(), self.policy, user_id, role_name).await?;
        tx.commit().await?;

        info!(role = role_name.trim(), "single role assigned");
        Ok(report)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction-scoped operations
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) async fn sync_role_permissions_in(
    tx: &mut dyn AccessTx,
    role_id: RoleId,
    permission_ids: &[PermissionId],
) -> ServiceResult<SyncReport<PermissionId>> {
    tx.find_role_for_update(role_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("role {role_id} not found")))?;

    let desired: BTreeSet<PermissionId> = permission_ids.iter().copied().collect();
    let wanted: Vec<PermissionId> = desired.iter().copied().collect();
    let found: BTreeSet<PermissionId> = tx
        .find_permissions(&wanted)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    ensure_all_found("permission", &desired, &found)?;

    let current = tx
        .role_permissions(role_id)
        .await?
        .into_iter()
        .map(|link| link.permission_id);
    let plan = SyncPlan::between(current, desired);

    for permission_id in &plan.removals {
        tx.delete_role_permission(RolePermission::new(role_id, *permission_id))
            .await?;
    }
    for permission_id in &plan.additions {
        tx.insert_role_permission(RolePermission::new(role_id, *permission_id))
            .await?;
    }
    Ok(plan.into())
}

pub(crate) async fn sync_user_roles_in(
    tx: &mut dyn AccessTx,
    policy: RoleSetPolicy,
    user_id: UserId,
    role_ids: &[RoleId],
) -> ServiceResult<SyncReport<RoleId>> {
    tx.find_user_for_update(user_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("user {user_id} not found")))?;

    let desired: BTreeSet<RoleId> = role_ids.iter().copied().collect();
    policy.check(&desired)?;

    let wanted: Vec<RoleId> = desired.iter().copied().collect();
    let found: BTreeSet<RoleId> = tx
        .find_roles(&wanted)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();
    ensure_all_found("role", &desired, &found)?;

    let current = tx
        .user_roles(user_id)
        .await?
        .into_iter()
        .map(|link| link.role_id);
    let plan = SyncPlan::between(current, desired);

    for role_id in &plan.removals {
        tx.delete_user_role(UserRole::new(user_id, *role_id)).await?;
    }
    for role_id in &plan.additions {
        tx.insert_user_role(UserRole::new(user_id, *role_id)).await?;
    }
    Ok(plan.into())
}

pub(crate) async fn assign_single_role_in(
    tx: &mut dyn AccessTx,
    policy: RoleSetPolicy,
    user_id: UserId,
    role_name: &str,
) -> ServiceResult<SyncReport<RoleId>> {
    tx.find_user_for_update(user_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("user {user_id} not found")))?;

    let name = role_name.trim();
    let role = tx
        .find_role_by_name(name)
        .await?
        .ok_or_else(|| DomainError::reference(format!("role '{name}' does not exist")))?;

    sync_user_roles_in(tx, policy, user_id, &[role.id]).await
}

fn ensure_all_found<T>(kind: &str, desired: &BTreeSet<T>, found: &BTreeSet<T>) -> DomainResult<()>
where
    T: Ord + core::fmt::Display,
{
    let missing: Vec<String> = desired.difference(found).map(ToString::to_string).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DomainError::reference(format!(
            "unknown {kind} id(s): {}",
            missing.join(", ")
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
