//! Profile rows used for coarse authorization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
/// The authorization view of a `profiles` row, 1:1 with the identity
/// provider's user.
pub struct Profile {
    /// Identity provider user id.
    pub id: String,
    pub role: UserRole,
}

/// Every column of a `profiles` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullProfile {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FullProfile> for Profile {
    fn from(full: FullProfile) -> Self {
        Profile {
            id: full.id,
            role: full.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Roles stored on a profile. Anything other than `admin` is a regular member.
pub enum UserRole {
    #[default]
    Member,
    Admin,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Member => "member",
            UserRole::Admin => "admin",
        }
    }

    /// Maps the raw `role` column. Only the exact value `admin` grants admin;
    /// case variants, padding and NULL are members.
    pub fn from_db(raw: Option<&str>) -> Self {
        match raw {
            Some("admin") => UserRole::Admin,
            _ => UserRole::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(UserRole::from_db(raw.as_deref()))
    }
}
