//! Profile store used by the request gate.
//!
//! Lookups are issued fresh for every request; nothing is memoized so a role
//! change takes effect on the very next request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::Instrument;

use crate::models::profile::{FullProfile, Profile, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile lookup failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Point lookup of a profile by identity provider user id.
///
/// Use `MockProfileStore` in tests to mock the behavior.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns at most one profile. `Ok(None)` when no row exists.
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>, ProfileError>;

    /// Same point lookup, returning every column of the row.
    async fn find_full_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<FullProfile>, ProfileError>;
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: String,
    role: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            role: UserRole::from_db(row.role.as_deref()),
        }
    }
}

#[derive(Debug, FromRow)]
struct FullProfileRow {
    id: String,
    full_name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FullProfileRow> for FullProfile {
    fn from(row: FullProfileRow) -> Self {
        FullProfile {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            role: UserRole::from_db(row.role.as_deref()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>, ProfileError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id::text AS id, role FROM profiles WHERE id = $1::uuid",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .instrument(tracing::debug_span!("profile_find_by_user_id", user_id))
        .await?;

        Ok(row.map(Profile::from))
    }

    async fn find_full_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<FullProfile>, ProfileError> {
        let row = sqlx::query_as::<_, FullProfileRow>(
            "SELECT id::text AS id, full_name, email, role, created_at, updated_at \
             FROM profiles WHERE id = $1::uuid",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .instrument(tracing::debug_span!("profile_find_full_by_user_id", user_id))
        .await?;

        Ok(row.map(FullProfile::from))
    }
}
