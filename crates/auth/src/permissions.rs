use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{Entity, EntityName, PermissionId, Timestamps};

/// Named capability record (e.g. "edit posts").
///
/// Permissions are never renamed; they are created and deleted. Deleting one
/// drops it from every role that held it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: EntityName,
    pub timestamps: Timestamps,
}

impl Permission {
    pub fn new(id: PermissionId, name: EntityName, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            timestamps: Timestamps::new(now),
        }
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name.as_str())
    }
}
