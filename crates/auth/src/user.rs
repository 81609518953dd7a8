//! User account records.
//!
//! A user's roles live in [`UserRole`] join records, never on the record itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{
    DomainError, DomainResult, Email, Entity, EntityName, RoleId, Timestamps, UserId, MAX_TEXT_LEN,
};

use crate::credential::Credential;

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// Account record (identity + credential).
///
/// # Invariants
/// - `email` is unique across all users (enforced by the store layer).
/// - `name` is `"{first_name} {last_name}"` whenever both parts are known.
/// - `credential` only ever holds a one-way hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: EntityName,
    pub email: Email,
    pub credential: Credential,
    pub timestamps: Timestamps,
}

/// Validated profile fields, ready to become (part of) a [`User`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub name: EntityName,
    pub email: Email,
}

impl User {
    pub fn new(id: UserId, profile: UserProfile, credential: Credential, now: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name: Some(profile.first_name),
            last_name: Some(profile.last_name),
            name: profile.name,
            email: profile.email,
            credential,
            timestamps: Timestamps::new(now),
        }
    }

    /// Apply the profile part of a partial update (names, email).
    ///
    /// Validates everything before mutating, so an error leaves `self` untouched.
    /// `updated_at` only moves when a field actually changes.
    pub fn apply_profile(&mut self, changes: &UserChanges, now: DateTime<Utc>) -> DomainResult<()> {
        let first = changes
            .first_name
            .as_deref()
            .map(|raw| person_name("first name", raw))
            .transpose()?;
        let last = changes
            .last_name
            .as_deref()
            .map(|raw| person_name("last name", raw))
            .transpose()?;
        let email = changes.email.as_deref().map(Email::parse).transpose()?;

        let mut changed = false;
        if first.is_some() || last.is_some() {
            let first = first.or_else(|| self.first_name.clone()).unwrap_or_default();
            let last = last.or_else(|| self.last_name.clone()).unwrap_or_default();
            let name = derive_name(&first, &last)?;
            changed |= self.first_name.as_deref() != Some(first.as_str())
                || self.last_name.as_deref() != Some(last.as_str())
                || self.name != name;
            self.name = name;
            self.first_name = Some(first);
            self.last_name = Some(last);
        }
        if let Some(email) = email {
            changed |= self.email != email;
            self.email = email;
        }
        if changed {
            self.timestamps.touch(now);
        }
        Ok(())
    }

    pub fn replace_credential(&mut self, credential: Credential, now: DateTime<Utc>) {
        self.credential = credential;
        self.timestamps.touch(now);
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

/// User ↔ role association row, unique on the pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
}

impl UserRole {
    pub fn new(user_id: UserId, role_id: RoleId) -> Self {
        Self { user_id, role_id }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Input for creating a user with exactly one initial role.
#[derive(Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role_id: RoleId,
}

impl NewUser {
    /// Validate every field except the role reference (resolved by the store).
    pub fn validate(&self) -> DomainResult<UserProfile> {
        let first_name = person_name("first name", &self.first_name)?;
        let last_name = person_name("last name", &self.last_name)?;
        let email = Email::parse(&self.email)?;
        Credential::check_policy(&self.password)?;
        let name = derive_name(&first_name, &last_name)?;

        Ok(UserProfile {
            first_name,
            last_name,
            name,
            email,
        })
    }
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role_id", &self.role_id)
            .finish()
    }
}

/// Partial update of a user. `None` fields are left as they are.
///
/// An empty `password` is treated as "unchanged".
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UserChanges {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<RoleId>>,
}

impl UserChanges {
    /// The new password, if one was supplied and it passes policy.
    pub fn new_password(&self) -> DomainResult<Option<&str>> {
        match self.password.as_deref() {
            None | Some("") => Ok(None),
            Some(pw) => {
                Credential::check_policy(pw)?;
                Ok(Some(pw))
            }
        }
    }
}

impl core::fmt::Debug for UserChanges {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserChanges")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("roles", &self.roles)
            .finish()
    }
}

fn person_name(field: &str, raw: &str) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(DomainError::validation(format!(
            "{field} cannot exceed {MAX_TEXT_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Display name derived from the two name parts.
pub fn derive_name(first: &str, last: &str) -> DomainResult<EntityName> {
    EntityName::parse(format!("{first} {last}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: "Jane".to_string(),
            last_name: "Smith".to_string(),
            email: email.to_string(),
            password: "password".to_string(),
            role_id: RoleId::new(),
        }
    }

    fn existing_user() -> User {
        let profile = new_user("jane@example.com").validate().unwrap();
        let credential = Credential::hash("password").unwrap();
        User::new(UserId::new(), profile, credential, Utc::now())
    }

    #[test]
    fn validate_derives_name_and_normalizes_email() {
        let profile = new_user("Jane.Smith@Example.com").validate().unwrap();
        assert_eq!(profile.name.as_str(), "Jane Smith");
        assert_eq!(profile.email.as_str(), "jane.smith@example.com");
    }

    #[test]
    fn validate_rejects_missing_names() {
        let mut cmd = new_user("jane@example.com");
        cmd.last_name = " ".to_string();
        let err = cmd.validate().unwrap_err();
        assert!(err.to_string().contains("last name"));
    }

    #[test]
    fn validate_rejects_short_password() {
        let mut cmd = new_user("jane@example.com");
        cmd.password = "abc".to_string();
        assert!(cmd.validate().unwrap_err().is_validation());
    }

    #[test]
    fn partial_name_change_rederives_display_name() {
        let mut user = existing_user();
        let changes = UserChanges {
            last_name: Some("Doe".to_string()),
            ..Default::default()
        };

        user.apply_profile(&changes, Utc::now()).unwrap();

        assert_eq!(user.name.as_str(), "Jane Doe");
        assert_eq!(user.first_name.as_deref(), Some("Jane"));
        assert_eq!(user.email.as_str(), "jane@example.com");
    }

    #[test]
    fn unchanged_profile_keeps_updated_at() {
        let mut user = existing_user();
        let before = user.timestamps;
        let later = before.updated_at + chrono::Duration::seconds(60);

        user.apply_profile(&UserChanges::default(), later).unwrap();
        let same_email = UserChanges {
            first_name: Some("Jane".to_string()),
            email: Some("JANE@example.com".to_string()),
            ..Default::default()
        };
        user.apply_profile(&same_email, later).unwrap();
        assert_eq!(user.timestamps, before);

        let renamed = UserChanges {
            last_name: Some("Doe".to_string()),
            ..Default::default()
        };
        user.apply_profile(&renamed, later).unwrap();
        assert_eq!(user.timestamps.updated_at, later);
    }

    #[test]
    fn invalid_change_leaves_user_untouched() {
        let mut user = existing_user();
        let before = user.clone();
        let changes = UserChanges {
            first_name: Some("Janet".to_string()),
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };

        assert!(user.apply_profile(&changes, Utc::now()).is_err());
        assert_eq!(user, before);
    }

    #[test]
    fn empty_password_means_unchanged() {
        let changes = UserChanges {
            password: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(changes.new_password().unwrap(), None);
    }

    #[test]
    fn debug_output_hides_passwords() {
        let rendered = format!("{:?}", new_user("jane@example.com"));
        assert!(!rendered.contains("\"password\""));
        assert!(rendered.contains("<redacted>"));
    }
}
