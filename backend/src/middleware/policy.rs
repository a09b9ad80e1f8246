//! Route classification and redirect targets for the request gate.

use url::form_urlencoded;

pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";
pub const DEFAULT_UPDATE_PASSWORD_PATH: &str = "/auth/update-password";
pub const DEFAULT_ADMIN_DENIED_REDIRECT: &str = "/unauthorized";
/// Where pages send a user whose session lapsed mid-flow.
pub const SESSION_EXPIRED_REDIRECT: &str = "/dashboard?expired=true";
pub const LOGIN_REDIRECT_PARAM: &str = "redirect";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Bypasses the gate entirely.
    Exempt,
    /// Requires an authenticated user whose profile role is `admin`.
    Admin,
    /// Requires an authenticated user.
    Authenticated,
    /// Only the recovery lockout applies.
    Default,
}

/// The single canonical policy table. Every list holds path prefixes matched
/// on segment boundaries, except `exempt_extensions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    pub exempt_prefixes: Vec<String>,
    pub exempt_extensions: Vec<String>,
    pub admin_prefixes: Vec<String>,
    pub authenticated_prefixes: Vec<String>,
    pub recovery_allowed_prefixes: Vec<String>,
    pub login_path: String,
    pub update_password_path: String,
    pub admin_denied_redirect: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            exempt_prefixes: to_strings(&[
                "/api/webhook",
                "/api/create-preference",
                "/_next/static",
                "/_next/image",
                "/favicon.ico",
            ]),
            exempt_extensions: to_strings(&["svg", "png", "jpg", "jpeg", "gif", "webp", "ico"]),
            admin_prefixes: to_strings(&["/admin"]),
            authenticated_prefixes: to_strings(&["/dashboard", "/learn", "/checkout"]),
            recovery_allowed_prefixes: to_strings(&[
                DEFAULT_UPDATE_PASSWORD_PATH,
                "/auth/signout",
                "/auth/callback",
                "/_next",
                "/api/auth",
            ]),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            update_password_path: DEFAULT_UPDATE_PASSWORD_PATH.to_string(),
            admin_denied_redirect: DEFAULT_ADMIN_DENIED_REDIRECT.to_string(),
        }
    }
}

impl RoutePolicy {
    /// First match wins: exempt, admin, authenticated, default.
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.is_exempt(path) {
            RouteClass::Exempt
        } else if matches_any(path, &self.admin_prefixes) {
            RouteClass::Admin
        } else if matches_any(path, &self.authenticated_prefixes) {
            RouteClass::Authenticated
        } else {
            RouteClass::Default
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        matches_any(path, &self.exempt_prefixes) || self.has_exempt_extension(path)
    }

    pub fn is_recovery_allowed(&self, path: &str) -> bool {
        matches_prefix(path, &self.update_password_path)
            || matches_any(path, &self.recovery_allowed_prefixes)
    }

    /// `/auth/login?redirect=<form-encoded original path>`
    pub fn login_redirect(&self, original_path: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(original_path.as_bytes()).collect();
        format!("{}?{}={}", self.login_path, LOGIN_REDIRECT_PARAM, encoded)
    }

    fn has_exempt_extension(&self, path: &str) -> bool {
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .exempt_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

/// `/admin` matches `/admin` and `/admin/users`, never `/administrator`.
pub fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn matches_any(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| matches_prefix(path, prefix))
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
