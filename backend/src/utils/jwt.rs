//! Access-token claim inspection.
//!
//! The gate only reads claims to drive UX decisions (refresh timing and the
//! password-recovery lockout). Signatures are NOT checked here: the identity
//! provider validates the token when it serves `/user`, and admin access is
//! decided against the profile store. Never use these claims to grant access.

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

pub const RECOVERY_METHOD: &str = "recovery";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    /// Authentication methods reference, in the order they were granted.
    #[serde(default)]
    pub amr: Vec<AmrEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmrEntry {
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl AccessClaims {
    pub fn is_recovery(&self) -> bool {
        self.amr.iter().any(|entry| entry.method == RECOVERY_METHOD)
    }

    /// True when the token is expired or will be within `leeway_secs`.
    /// Tokens without `exp` never expire from the gate's point of view.
    pub fn expires_within(&self, leeway_secs: i64) -> bool {
        match self.exp {
            Some(exp) => exp - leeway_secs <= Utc::now().timestamp(),
            None => false,
        }
    }
}

/// Decodes the payload segment of a JWT without verifying its signature.
pub fn decode_unverified(token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(token_data.claims)
}

/// Recovery-scope check for the lockout. A token that cannot be decoded is
/// treated as a normal session.
pub fn is_recovery_token(token: &str) -> bool {
    match decode_unverified(token) {
        Ok(claims) => claims.is_recovery(),
        Err(err) => {
            tracing::debug!(error = %err, "Access token payload could not be decoded; skipping recovery lockout");
            false
        }
    }
}
