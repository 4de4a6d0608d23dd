use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::{Error, Result};
use crate::users::models::User;
use crate::viewer::ViewerContext;

/// Explicit resolver configuration. Passed in by the embedding application at
/// construction time; the core holds no process-wide signing state.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub token_ttl_secs: i64,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>, token_ttl_secs: i64) -> Self {
        AuthConfig {
            secret: secret.into(),
            token_ttl_secs,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: i32,
    username: String,
    iat: i64,
    exp: i64,
}

/// Turns the raw `Authorization` header value (or its absence) into a
/// [`ViewerContext`].
///
/// Two call modes, one contract: "optional" authentication means the token may
/// be *absent*, never that it may be garbage. A malformed or unverifiable
/// token fails the request in both modes.
pub struct AuthResolver {
    secret: Vec<u8>,
    token_ttl_secs: i64,
    clock: fn() -> DateTime<Utc>,
}

const TOKEN_SCHEME: &str = "token";

impl AuthResolver {
    pub fn new(config: AuthConfig) -> Self {
        AuthResolver {
            secret: config.secret.into_bytes(),
            token_ttl_secs: config.token_ttl_secs,
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock, for expiry tests.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn key(&self) -> Hmac<Sha256> {
        // HMAC admits keys of any length.
        Hmac::new_from_slice(&self.secret).expect("hmac key")
    }

    /// Signs a fresh token for a just-registered or just-logged-in user.
    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = (self.clock)();
        let claims = TokenClaims {
            sub: user.id,
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.token_ttl_secs,
        };
        claims.sign_with_key(&self.key()).map_err(|_| Error::Internal)
    }

    /// Fails closed: any outcome other than a verified identity is an error.
    pub fn resolve_required(&self, header: Option<&str>) -> Result<ViewerContext> {
        match header {
            None => Err(Error::Unauthorized),
            Some(raw) => self.verify(raw),
        }
    }

    /// Fails open to `Anonymous` only when no credential was presented at all.
    pub fn resolve_optional(&self, header: Option<&str>) -> Result<ViewerContext> {
        match header {
            None => Ok(ViewerContext::Anonymous),
            Some(raw) => self.verify(raw),
        }
    }

    fn verify(&self, header: &str) -> Result<ViewerContext> {
        let token = extract_token(header)?;
        let claims: TokenClaims = token
            .verify_with_key(&self.key())
            .map_err(|_| Error::InvalidCredential)?;
        if claims.exp <= (self.clock)().timestamp() {
            debug!(sub = claims.sub, "rejecting expired token");
            return Err(Error::InvalidCredential);
        }
        Ok(ViewerContext::authenticated(claims.sub, claims.username))
    }
}

/// Header format must be `Token <jwt>`; anything else present is malformed,
/// never silently anonymous.
fn extract_token(header: &str) -> Result<&str> {
    let mut parts = header.split_whitespace();
    let scheme = parts.next().ok_or(Error::MalformedCredential)?;
    let token = parts.next().ok_or(Error::MalformedCredential)?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case(TOKEN_SCHEME) {
        return Err(Error::MalformedCredential);
    }
    // A compact JWS is exactly three dot-separated segments.
    if token.split('.').count() != 3 {
        return Err(Error::MalformedCredential);
    }
    Ok(token)
}
