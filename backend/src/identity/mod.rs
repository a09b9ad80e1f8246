//! Identity provider seam.
//!
//! The gate never talks to the provider directly; it goes through
//! [`IdentityProvider`] so tests can substitute a mock and deployments can
//! swap the backing service.

pub mod gotrue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::cookies::{CookieToSet, RequestCookies};

pub use gotrue::GoTrueClient;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider returned unexpected status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("invalid identity provider url: {0}")]
    Url(#[from] url::ParseError),
    /// A later call failed after the session had already been rotated; the
    /// new cookies must still reach the browser.
    #[error("{source}")]
    WithRotatedCookies {
        source: Box<IdentityError>,
        cookies_to_set: Vec<CookieToSet>,
    },
}

impl IdentityError {
    /// Cookie writes that must survive this error, if any.
    pub fn take_rotated_cookies(&mut self) -> Vec<CookieToSet> {
        match self {
            IdentityError::WithRotatedCookies { cookies_to_set, .. } => {
                std::mem::take(cookies_to_set)
            }
            _ => Vec::new(),
        }
    }
}

/// Authenticated principal as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session credentials carried in the request cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// A provider answer plus the cookie writes it wants on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply<T> {
    pub value: T,
    pub cookies_to_set: Vec<CookieToSet>,
}

impl<T> ProviderReply<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            cookies_to_set: Vec::new(),
        }
    }

    pub fn with_cookies(value: T, cookies_to_set: Vec<CookieToSet>) -> Self {
        Self {
            value,
            cookies_to_set,
        }
    }
}

/// Use `MockIdentityProvider` in tests to mock the behavior.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current authenticated principal, validated by the provider.
    async fn get_user(
        &self,
        cookies: &RequestCookies,
    ) -> Result<ProviderReply<Option<AuthUser>>, IdentityError>;

    /// Current session as stored in cookies, refreshed when close to expiry.
    async fn get_session(
        &self,
        cookies: &RequestCookies,
    ) -> Result<ProviderReply<Option<Session>>, IdentityError>;
}
