//! Request gate: session refresh, recovery lockout and path-based
//! authorization in front of every page.
//!
//! Rules are evaluated in order and the first match wins:
//! exempt paths pass untouched, a recovery-scoped session is confined to the
//! password-update flow, admin paths require a profile with role `admin`,
//! authenticated paths require a user, everything else passes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    error::AppError,
    identity::{AuthUser, IdentityError, ProviderReply},
    middleware::policy::RouteClass,
    state::GateState,
    utils::{
        cookies::{CookieToSet, PendingCookies, RequestCookies},
        jwt::is_recovery_token,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect(String),
}

pub async fn request_gate(
    State(state): State<GateState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let mut cookies = RequestCookies::from_headers(request.headers());
    let mut pending = PendingCookies::default();

    let decision = evaluate(&state, &path, &mut cookies, &mut pending).await;

    let mut response = match decision {
        Ok(GateDecision::Pass) => {
            if !pending.is_empty() {
                cookies.write_to(request.headers_mut());
            }
            next.run(request).await
        }
        Ok(GateDecision::Redirect(target)) => {
            tracing::debug!(path = %path, target = %target, "Request redirected by gate");
            Redirect::temporary(&target).into_response()
        }
        Err(err) => {
            tracing::error!(path = %path, error = %err, "Identity provider call failed");
            AppError::from(err).into_response()
        }
    };

    pending.apply_to(response.headers_mut(), state.cookie_options);
    response
}

/// Decides the fate of one request. Cookie writes requested by the identity
/// provider are replayed onto `cookies` and collected in `pending`, on every
/// path including the error path.
pub async fn evaluate(
    state: &GateState,
    path: &str,
    cookies: &mut RequestCookies,
    pending: &mut PendingCookies,
) -> Result<GateDecision, IdentityError> {
    let policy = &state.policy;
    let class = policy.classify(path);
    if class == RouteClass::Exempt {
        return Ok(GateDecision::Pass);
    }

    let user = absorb(state.identity.get_user(cookies).await, cookies, pending)?;
    let session = absorb(state.identity.get_session(cookies).await, cookies, pending)?;

    if let Some(session) = &session {
        if is_recovery_token(&session.access_token) && !policy.is_recovery_allowed(path) {
            tracing::info!(path, "Recovery session confined to password update");
            return Ok(GateDecision::Redirect(policy.update_password_path.clone()));
        }
    }

    match (class, user) {
        (RouteClass::Admin, None) | (RouteClass::Authenticated, None) => {
            Ok(GateDecision::Redirect(policy.login_redirect(path)))
        }
        (RouteClass::Admin, Some(user)) => {
            if is_admin(state, &user).await {
                Ok(GateDecision::Pass)
            } else {
                tracing::info!(path, user_id = %user.id, "Admin access denied");
                Ok(GateDecision::Redirect(policy.admin_denied_redirect.clone()))
            }
        }
        _ => Ok(GateDecision::Pass),
    }
}

/// Lookup errors and missing rows both deny.
async fn is_admin(state: &GateState, user: &AuthUser) -> bool {
    match state.profiles.find_by_user_id(&user.id).await {
        Ok(Some(profile)) => profile.role.is_admin(),
        Ok(None) => {
            tracing::debug!(user_id = %user.id, "No profile row for user");
            false
        }
        Err(err) => {
            tracing::warn!(user_id = %user.id, error = %err, "Profile lookup failed; denying admin access");
            false
        }
    }
}

fn absorb<T>(
    result: Result<ProviderReply<T>, IdentityError>,
    cookies: &mut RequestCookies,
    pending: &mut PendingCookies,
) -> Result<T, IdentityError> {
    match result {
        Ok(reply) => {
            replay(reply.cookies_to_set, cookies, pending);
            Ok(reply.value)
        }
        Err(mut err) => {
            replay(err.take_rotated_cookies(), cookies, pending);
            Err(err)
        }
    }
}

fn replay(
    cookies_to_set: Vec<CookieToSet>,
    cookies: &mut RequestCookies,
    pending: &mut PendingCookies,
) {
    for cookie in &cookies_to_set {
        cookies.apply(cookie);
    }
    pending.extend(cookies_to_set);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    use crate::{
        identity::{MockIdentityProvider, Session},
        middleware::policy::RoutePolicy,
        models::profile::{Profile, UserRole},
        repositories::profile::{MockProfileStore, ProfileError},
        utils::cookies::CookieOptions,
    };

    fn token(methods: &[&str]) -> String {
        let amr: Vec<_> = methods.iter().map(|m| json!({ "method": m })).collect();
        encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "user-1", "exp": 4_102_444_800i64, "amr": amr }),
            &EncodingKey::from_secret(b"secret"),
        )
        .expect("encode token")
    }

    fn user() -> AuthUser {
        AuthUser {
            id: "user-1".into(),
            email: Some("learner@example.com".into()),
        }
    }

    fn state(identity: MockIdentityProvider, profiles: MockProfileStore) -> GateState {
        GateState::new(
            Arc::new(identity),
            Arc::new(profiles),
            RoutePolicy::default(),
            CookieOptions::default(),
        )
    }

    fn signed_in(methods: &[&str]) -> MockIdentityProvider {
        let access = token(methods);
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_get_user()
            .returning(|_| Ok(ProviderReply::new(Some(user()))));
        identity.expect_get_session().returning(move |_| {
            Ok(ProviderReply::new(Some(Session {
                access_token: access.clone(),
                refresh_token: Some("refresh".into()),
            })))
        });
        identity
    }

    fn anonymous() -> MockIdentityProvider {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_get_user()
            .returning(|_| Ok(ProviderReply::new(None)));
        identity
            .expect_get_session()
            .returning(|_| Ok(ProviderReply::new(None)));
        identity
    }

    fn profile_with_role(role: UserRole) -> MockProfileStore {
        let mut profiles = MockProfileStore::new();
        profiles
            .expect_find_by_user_id()
            .times(1)
            .returning(move |id| {
                Ok(Some(Profile {
                    id: id.to_string(),
                    role,
                }))
            });
        profiles
    }

    async fn run(state: &GateState, path: &str) -> (GateDecision, PendingCookies) {
        let mut cookies = RequestCookies::default();
        let mut pending = PendingCookies::default();
        let decision = evaluate(state, path, &mut cookies, &mut pending)
            .await
            .expect("gate evaluation");
        (decision, pending)
    }

    #[tokio::test]
    async fn exempt_paths_make_no_provider_calls() {
        let state = state(MockIdentityProvider::new(), MockProfileStore::new());
        for path in ["/api/webhook/payment", "/_next/static/app.js", "/favicon.ico", "/logo.svg"] {
            let (decision, pending) = run(&state, path).await;
            assert_eq!(decision, GateDecision::Pass, "{path}");
            assert!(pending.is_empty());
        }
    }

    #[tokio::test]
    async fn anonymous_admin_request_redirects_to_login() {
        let state = state(anonymous(), MockProfileStore::new());
        let (decision, _) = run(&state, "/admin/users").await;
        assert_eq!(
            decision,
            GateDecision::Redirect("/auth/login?redirect=%2Fadmin%2Fusers".into())
        );
    }

    #[tokio::test]
    async fn admin_profile_passes() {
        let state = state(signed_in(&["password"]), profile_with_role(UserRole::Admin));
        let (decision, _) = run(&state, "/admin").await;
        assert_eq!(decision, GateDecision::Pass);
    }

    #[tokio::test]
    async fn member_profile_is_denied_admin() {
        let state = state(signed_in(&["password"]), profile_with_role(UserRole::Member));
        let (decision, _) = run(&state, "/admin/courses").await;
        assert_eq!(decision, GateDecision::Redirect("/unauthorized".into()));
    }

    #[tokio::test]
    async fn capitalized_admin_role_is_denied_admin() {
        let role = UserRole::from_db(Some("Admin"));
        let state = state(signed_in(&["password"]), profile_with_role(role));
        let (decision, _) = run(&state, "/admin").await;
        assert_eq!(decision, GateDecision::Redirect("/unauthorized".into()));
    }

    #[tokio::test]
    async fn missing_profile_is_denied_admin() {
        let mut profiles = MockProfileStore::new();
        profiles
            .expect_find_by_user_id()
            .returning(|_| Ok(None));
        let state = state(signed_in(&["password"]), profiles);
        let (decision, _) = run(&state, "/admin").await;
        assert_eq!(decision, GateDecision::Redirect("/unauthorized".into()));
    }

    #[tokio::test]
    async fn profile_lookup_error_fails_closed() {
        let mut profiles = MockProfileStore::new();
        profiles
            .expect_find_by_user_id()
            .returning(|_| Err(ProfileError::Database(sqlx::Error::PoolTimedOut)));
        let state = state(signed_in(&["password"]), profiles);
        let (decision, _) = run(&state, "/admin").await;
        assert_eq!(decision, GateDecision::Redirect("/unauthorized".into()));
    }

    #[tokio::test]
    async fn configured_denial_target_is_used() {
        let state = GateState::new(
            Arc::new(signed_in(&["password"])),
            Arc::new(profile_with_role(UserRole::Member)),
            RoutePolicy {
                admin_denied_redirect: "/".into(),
                ..Default::default()
            },
            CookieOptions::default(),
        );
        let (decision, _) = run(&state, "/admin").await;
        assert_eq!(decision, GateDecision::Redirect("/".into()));
    }

    #[tokio::test]
    async fn anonymous_dashboard_request_redirects_to_login() {
        let state = state(anonymous(), MockProfileStore::new());
        let (decision, _) = run(&state, "/learn/rust-101").await;
        assert_eq!(
            decision,
            GateDecision::Redirect("/auth/login?redirect=%2Flearn%2Frust-101".into())
        );
    }

    #[tokio::test]
    async fn anonymous_public_page_passes() {
        let state = state(anonymous(), MockProfileStore::new());
        let (decision, _) = run(&state, "/courses/rust-101").await;
        assert_eq!(decision, GateDecision::Pass);
    }

    #[tokio::test]
    async fn recovery_session_is_locked_to_password_update() {
        let state = state(signed_in(&["recovery"]), MockProfileStore::new());
        for path in ["/dashboard", "/admin/users", "/", "/courses", "/auth/login"] {
            let (decision, _) = run(&state, path).await;
            assert_eq!(
                decision,
                GateDecision::Redirect("/auth/update-password".into()),
                "{path}"
            );
        }
    }

    #[tokio::test]
    async fn recovery_session_may_use_allow_listed_paths() {
        let state = state(signed_in(&["password", "recovery"]), MockProfileStore::new());
        for path in ["/auth/update-password", "/auth/signout", "/auth/callback", "/api/auth/session"] {
            let (decision, _) = run(&state, path).await;
            assert_eq!(decision, GateDecision::Pass, "{path}");
        }
    }

    #[tokio::test]
    async fn undecodable_token_fails_open_for_lockout_only() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_get_user()
            .returning(|_| Ok(ProviderReply::new(Some(user()))));
        identity.expect_get_session().returning(|_| {
            Ok(ProviderReply::new(Some(Session {
                access_token: "garbage".into(),
                refresh_token: None,
            })))
        });
        let state = state(identity, profile_with_role(UserRole::Member));

        let (decision, _) = run(&state, "/admin").await;
        assert_eq!(decision, GateDecision::Redirect("/unauthorized".into()));
    }

    #[tokio::test]
    async fn rotated_cookies_are_replayed_and_collected() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_get_user().returning(|_| {
            Ok(ProviderReply::with_cookies(
                None,
                vec![CookieToSet::new("access_token", "rotated", Duration::from_secs(3600))],
            ))
        });
        identity
            .expect_get_session()
            .withf(|cookies: &RequestCookies| cookies.get("access_token") == Some("rotated"))
            .returning(|_| Ok(ProviderReply::new(None)));
        let state = state(identity, MockProfileStore::new());

        let (decision, pending) = run(&state, "/dashboard").await;
        assert!(matches!(decision, GateDecision::Redirect(_)));
        assert_eq!(pending.cookies_to_set.len(), 1);
        assert_eq!(pending.cookies_to_set[0].value, "rotated");
    }

    #[tokio::test]
    async fn provider_failure_keeps_already_rotated_cookies() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_get_user().returning(|_| {
            Ok(ProviderReply::with_cookies(
                Some(user()),
                vec![CookieToSet::new("refresh_token", "r2", Duration::from_secs(60))],
            ))
        });
        identity
            .expect_get_session()
            .returning(|_| Err(IdentityError::UnexpectedStatus(StatusCode::BAD_GATEWAY)));
        let state = state(identity, MockProfileStore::new());

        let mut cookies = RequestCookies::default();
        let mut pending = PendingCookies::default();
        let result = evaluate(&state, "/dashboard", &mut cookies, &mut pending).await;
        assert!(result.is_err());
        assert_eq!(pending.cookies_to_set.len(), 1);
        assert_eq!(cookies.get("refresh_token"), Some("r2"));
    }

    #[tokio::test]
    async fn decision_is_stable_for_unchanged_session() {
        let state = state(signed_in(&["password"]), {
            let mut profiles = MockProfileStore::new();
            profiles.expect_find_by_user_id().times(2).returning(|id| {
                Ok(Some(Profile {
                    id: id.to_string(),
                    role: UserRole::Member,
                }))
            });
            profiles
        });
        let first = run(&state, "/admin").await;
        let second = run(&state, "/admin").await;
        assert_eq!(first, second);
    }
}
