//! User directory listing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_auth::User;
use gatehouse_core::{DomainError, Entity, RoleId, UserId};

use crate::services::ServiceResult;
use crate::store::AccessTx;

// ─────────────────────────────────────────────────────────────────────────────
// Read Model
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the user directory. Never carries the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListing {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserListing {
    fn from_user(user: &User, roles: Vec<String>) -> Self {
        let timestamps = user.timestamps();
        Self {
            id: user.id(),
            name: user.name.as_str().to_string(),
            email: user.email.as_str().to_string(),
            roles,
            created_at: timestamps.created_at,
            updated_at: timestamps.updated_at,
        }
    }

    /// Role names flattened into one display string, e.g. `"Admin, Editor"`.
    pub fn role_summary(&self) -> String {
        self.roles.join(", ")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) async fn load_all(tx: &mut dyn AccessTx) -> ServiceResult<Vec<UserListing>> {
    let role_names: BTreeMap<RoleId, String> = tx
        .list_roles()
        .await?
        .into_iter()
        .map(|r| (r.id, r.name.as_str().to_string()))
        .collect();

    let mut memberships: BTreeMap<UserId, BTreeSet<String>> = BTreeMap::new();
    for link in tx.all_user_roles().await? {
        if let Some(name) = role_names.get(&link.role_id) {
            memberships.entry(link.user_id).or_default().insert(name.clone());
        }
    }

    let mut users = tx.list_users().await?;
    users.sort_by_key(|u| u.id);
    Ok(users
        .iter()
        .map(|user| {
            let roles = memberships
                .remove(&user.id)
                .map(|names| names.into_iter().collect())
                .unwrap_or_default();
            UserListing::from_user(user, roles)
        })
        .collect())
}

pub(crate) async fn load_one(tx: &mut dyn AccessTx, user_id: UserId) -> ServiceResult<UserListing> {
    let user = tx
        .find_user(user_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("user {user_id} not found")))?;

    let role_ids: Vec<RoleId> = tx
        .user_roles(user_id)
        .await?
        .into_iter()
        .map(|link| link.role_id)
        .collect();
    let mut roles: Vec<String> = tx
        .find_roles(&role_ids)
        .await?
        .into_iter()
        .map(|r| r.name.as_str().to_string())
        .collect();
    roles.sort();

    Ok(UserListing::from_user(&user, roles))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn role_summary_joins_names() {
        let now = Utc::now();
        let mut listing = UserListing {
            id: UserId::new(),
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            roles: vec!["Admin".to_string(), "Editor".to_string()],
            created_at: now,
            updated_at: now,
        };
        assert_eq!(listing.role_summary(), "Admin, Editor");

        listing.roles.clear();
        assert_eq!(listing.role_summary(), "");
    }

    #[test]
    fn listing_serializes_without_credential() {
        let now = Utc::now();
        let listing = UserListing {
            id: UserId::new(),
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            roles: vec!["User".to_string()],
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&listing).unwrap();
        assert!(json.get("credential").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["roles"][0], "User");
    }
}
