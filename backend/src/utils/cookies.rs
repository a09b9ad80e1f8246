use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lax" => Some(SameSite::Lax),
            "strict" => Some(SameSite::Strict),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieOptions {
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const SESSION_COOKIE_PATH: &str = "/";

/// A cookie write requested by the identity provider while it resolved the
/// session. A zero `max_age` removes the cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieToSet {
    pub name: String,
    pub value: String,
    pub max_age: Duration,
    pub path: String,
}

impl CookieToSet {
    pub fn new(name: impl Into<String>, value: impl Into<String>, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age,
            path: SESSION_COOKIE_PATH.to_string(),
        }
    }

    pub fn removal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            max_age: Duration::ZERO,
            path: SESSION_COOKIE_PATH.to_string(),
        }
    }

    pub fn is_removal(&self) -> bool {
        self.max_age.is_zero()
    }

    pub fn to_header_string(&self, options: CookieOptions) -> String {
        if self.is_removal() {
            build_clear_cookie(&self.name, &self.path, options)
        } else {
            build_auth_cookie(&self.name, &self.value, self.max_age, &self.path, options)
        }
    }
}

/// Accumulates every cookie mutation requested during one gate evaluation.
/// Applied once, onto whichever response is finally returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCookies {
    pub cookies_to_set: Vec<CookieToSet>,
}

impl PendingCookies {
    pub fn is_empty(&self) -> bool {
        self.cookies_to_set.is_empty()
    }

    pub fn extend(&mut self, cookies: impl IntoIterator<Item = CookieToSet>) {
        self.cookies_to_set.extend(cookies);
    }

    /// Appends one `Set-Cookie` header per accumulated mutation.
    pub fn apply_to(&self, headers: &mut HeaderMap, options: CookieOptions) {
        for cookie in &self.cookies_to_set {
            match HeaderValue::from_str(&cookie.to_header_string(options)) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(err) => {
                    tracing::error!(cookie = %cookie.name, error = %err, "Dropping unencodable session cookie");
                }
            }
        }
    }
}

/// Mutable view of the cookies an inbound request carried. Provider cookie
/// mutations are replayed onto it so later lookups (and the upstream) see
/// rotated values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookies {
    values: BTreeMap<String, String>,
    /// Names written by the provider while handling this request.
    issued: BTreeSet<String>,
}

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut values = BTreeMap::new();
        for raw in headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
        {
            for (name, value) in parse_cookie_header(raw) {
                values.entry(name).or_insert(value);
            }
        }
        Self {
            values,
            issued: BTreeSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn apply(&mut self, cookie: &CookieToSet) {
        if cookie.is_removal() {
            self.values.remove(&cookie.name);
            self.issued.remove(&cookie.name);
        } else {
            self.values.insert(cookie.name.clone(), cookie.value.clone());
            self.issued.insert(cookie.name.clone());
        }
    }

    /// True when `name` holds a value the provider issued during this request
    /// rather than one the client sent.
    pub fn was_issued(&self, name: &str) -> bool {
        self.issued.contains(name)
    }

    pub fn to_header_value(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Replaces the request's `Cookie` header with the current view.
    pub fn write_to(&self, headers: &mut HeaderMap) {
        headers.remove(header::COOKIE);
        if self.values.is_empty() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&self.to_header_value()) {
            headers.insert(header::COOKIE, value);
        }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for RequestCookies {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            issued: BTreeSet::new(),
        }
    }
}

pub fn build_auth_cookie(
    name: &str,
    value: &str,
    max_age: Duration,
    path: &str,
    options: CookieOptions,
) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite={}",
        name,
        value,
        path,
        max_age.as_secs(),
        same_site_value(options.same_site)
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn build_clear_cookie(name: &str, path: &str, options: CookieOptions) -> String {
    let mut cookie = format!(
        "{}=; Path={}; Max-Age=0; HttpOnly; SameSite={}",
        name,
        path,
        same_site_value(options.same_site)
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn parse_cookie_header(header: &str) -> impl Iterator<Item = (String, String)> + '_ {
    header.split(';').map(str::trim).filter_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.to_string()))
    })
}

fn same_site_value(same_site: SameSite) -> &'static str {
    match same_site {
        SameSite::Lax => "Lax",
        SameSite::Strict => "Strict",
        SameSite::None => "None",
    }
}
