#![allow(dead_code)]
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use academy_gate::{
    identity::{AuthUser, IdentityError, IdentityProvider, ProviderReply, Session},
    middleware::policy::RoutePolicy,
    models::profile::{FullProfile, Profile, UserRole},
    repositories::profile::{ProfileError, ProfileStore},
    state::GateState,
    utils::cookies::{CookieOptions, CookieToSet, RequestCookies, SameSite},
};
use async_trait::async_trait;
use axum::http::StatusCode;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

pub const TEST_SIGNING_SECRET: &[u8] = b"identity-provider-test-secret";

/// Mints an access token the way the identity provider would.
pub fn access_token(user_id: &str, methods: &[&str], expires_in_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let amr: Vec<_> = methods
        .iter()
        .map(|method| json!({ "method": method, "timestamp": now }))
        .collect();
    encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "sub": user_id,
            "aud": "authenticated",
            "role": "authenticated",
            "iat": now,
            "exp": now + expires_in_secs,
            "amr": amr,
        }),
        &EncodingKey::from_secret(TEST_SIGNING_SECRET),
    )
    .expect("encode access token")
}

pub fn learner() -> AuthUser {
    AuthUser {
        id: "4f1c6a2e-9a51-4f7e-8d36-2f6d0c1b7a10".into(),
        email: Some("learner@example.com".into()),
    }
}

pub fn test_cookie_options() -> CookieOptions {
    CookieOptions {
        secure: false,
        same_site: SameSite::Lax,
    }
}

/// Identity provider double that counts calls and can rotate cookies.
#[derive(Default)]
pub struct FakeIdentity {
    pub user: Option<AuthUser>,
    pub access_token: Option<String>,
    pub rotate: Vec<CookieToSet>,
    pub fail_session: bool,
    pub calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(methods: &[&str]) -> Self {
        let user = learner();
        Self {
            access_token: Some(access_token(&user.id, methods, 3600)),
            user: Some(user),
            ..Default::default()
        }
    }

    pub fn rotating(mut self, cookies: Vec<CookieToSet>) -> Self {
        self.rotate = cookies;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_user(
        &self,
        _cookies: &RequestCookies,
    ) -> Result<ProviderReply<Option<AuthUser>>, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderReply::with_cookies(
            self.user.clone(),
            self.rotate.clone(),
        ))
    }

    async fn get_session(
        &self,
        _cookies: &RequestCookies,
    ) -> Result<ProviderReply<Option<Session>>, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_session {
            return Err(IdentityError::UnexpectedStatus(
                StatusCode::SERVICE_UNAVAILABLE,
            ));
        }
        Ok(ProviderReply::new(self.access_token.clone().map(
            |access_token| Session {
                access_token,
                refresh_token: Some("refresh-token".into()),
            },
        )))
    }
}

/// Profile store double backed by a single optional role.
#[derive(Default)]
pub struct FakeProfiles {
    pub role: Option<UserRole>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeProfiles {
    pub fn with_role(role: UserRole) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    /// Stores `raw` the way the `role` column would hold it.
    pub fn with_raw_role(raw: &str) -> Self {
        Self::with_role(UserRole::from_db(Some(raw)))
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>, ProfileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProfileError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.role.map(|role| Profile {
            id: user_id.to_string(),
            role,
        }))
    }

    async fn find_full_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<FullProfile>, ProfileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProfileError::Database(sqlx::Error::PoolTimedOut));
        }
        let now = chrono::Utc::now();
        Ok(self.role.map(|role| FullProfile {
            id: user_id.to_string(),
            full_name: None,
            email: learner().email,
            role,
            created_at: now,
            updated_at: now,
        }))
    }
}

pub fn gate_state(identity: Arc<FakeIdentity>, profiles: Arc<FakeProfiles>) -> GateState {
    GateState::new(
        identity,
        profiles,
        RoutePolicy::default(),
        test_cookie_options(),
    )
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve test app");
    });
    format!("http://{}", addr)
}
