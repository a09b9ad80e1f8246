//! GoTrue-compatible identity provider client.
//!
//! Sessions live in two cookies (access and refresh token). When the access
//! token is missing or about to expire the client exchanges the refresh token
//! at `POST {base}/token?grant_type=refresh_token` and reports the rotated
//! cookies back to the caller instead of writing them anywhere itself.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{AuthUser, IdentityError, IdentityProvider, ProviderReply, Session};
use crate::config::{IdentityConfig, SessionCookieConfig};
use crate::utils::cookies::{CookieToSet, RequestCookies};
use crate::utils::jwt::decode_unverified;

const APIKEY_HEADER: &str = "apikey";
const DEFAULT_ACCESS_TTL_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    cookies: SessionCookieConfig,
    refresh_leeway_secs: i64,
}

impl GoTrueClient {
    pub fn new(
        identity: &IdentityConfig,
        cookies: SessionCookieConfig,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(identity.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: with_trailing_slash(identity.url.clone()),
            anon_key: identity.anon_key.clone(),
            cookies,
            refresh_leeway_secs: identity.refresh_leeway_secs,
        })
    }

    fn with_apikey(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.anon_key.is_empty() {
            request
        } else {
            request.header(APIKEY_HEADER, &self.anon_key)
        }
    }

    fn needs_refresh(&self, access_token: &str) -> bool {
        decode_unverified(access_token)
            .map(|claims| claims.expires_within(self.refresh_leeway_secs))
            .unwrap_or(true)
    }

    fn clear_session_cookies(&self) -> Vec<CookieToSet> {
        vec![
            CookieToSet::removal(&self.cookies.access_name),
            CookieToSet::removal(&self.cookies.refresh_name),
        ]
    }

    async fn resolve_session(
        &self,
        cookies: &RequestCookies,
    ) -> Result<ProviderReply<Option<Session>>, IdentityError> {
        let access = cookies.get(&self.cookies.access_name);
        let refresh = cookies.get(&self.cookies.refresh_name);
        // At most one refresh per request: a token issued earlier in this
        // request is used as is, even inside the leeway.
        let stale = access.map_or(true, |token| {
            !cookies.was_issued(&self.cookies.access_name) && self.needs_refresh(token)
        });

        match (access, refresh) {
            (None, None) => Ok(ProviderReply::new(None)),
            (Some(access), refresh) if !stale => Ok(ProviderReply::new(Some(Session {
                access_token: access.to_string(),
                refresh_token: refresh.map(str::to_string),
            }))),
            (_, Some(refresh)) => self.refresh_session(refresh).await,
            (Some(_), None) => {
                tracing::debug!("Access token expired and no refresh token present; clearing session");
                Ok(ProviderReply::with_cookies(
                    None,
                    vec![CookieToSet::removal(&self.cookies.access_name)],
                ))
            }
        }
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<ProviderReply<Option<Session>>, IdentityError> {
        let url = self.base_url.join("token")?;
        let response = self
            .with_apikey(self.http.post(url))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            tracing::info!(%status, "Refresh token rejected; clearing session cookies");
            return Ok(ProviderReply::with_cookies(None, self.clear_session_cookies()));
        }
        if !status.is_success() {
            return Err(IdentityError::UnexpectedStatus(status));
        }

        let tokens: TokenResponse = response.json().await?;
        let access_max_age =
            Duration::from_secs(tokens.expires_in.unwrap_or(DEFAULT_ACCESS_TTL_SECS));
        tracing::debug!(expires_in = access_max_age.as_secs(), "Session refreshed");

        let cookies_to_set = vec![
            CookieToSet::new(
                &self.cookies.access_name,
                &tokens.access_token,
                access_max_age,
            ),
            CookieToSet::new(
                &self.cookies.refresh_name,
                &tokens.refresh_token,
                self.cookies.refresh_max_age,
            ),
        ];

        Ok(ProviderReply::with_cookies(
            Some(Session {
                access_token: tokens.access_token,
                refresh_token: Some(tokens.refresh_token),
            }),
            cookies_to_set,
        ))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Option<AuthUser>, IdentityError> {
        let url = self.base_url.join("user")?;
        let response = self
            .with_apikey(self.http.get(url))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json::<AuthUser>().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(IdentityError::UnexpectedStatus(status)),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn get_user(
        &self,
        cookies: &RequestCookies,
    ) -> Result<ProviderReply<Option<AuthUser>>, IdentityError> {
        let ProviderReply {
            value: session,
            cookies_to_set,
        } = self.resolve_session(cookies).await?;

        let Some(session) = session else {
            return Ok(ProviderReply::with_cookies(None, cookies_to_set));
        };

        match self.fetch_user(&session.access_token).await {
            Ok(user) => Ok(ProviderReply::with_cookies(user, cookies_to_set)),
            Err(err) if cookies_to_set.is_empty() => Err(err),
            Err(err) => Err(IdentityError::WithRotatedCookies {
                source: Box::new(err),
                cookies_to_set,
            }),
        }
    }

    async fn get_session(
        &self,
        cookies: &RequestCookies,
    ) -> Result<ProviderReply<Option<Session>>, IdentityError> {
        self.resolve_session(cookies).await
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
