//! Session token minting and verification (HS256).

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use super::AuthError;
use crate::models::auth::{SessionUser, TokenClaims};

/// Default token lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Minimum accepted signing secret length.
pub const MIN_SECRET_LEN: usize = 32;

/// Development placeholder that must never be used as a real secret.
pub const DEV_PLACEHOLDER_SECRET: &str = "nexus-dev-secret-change-in-production-32chars";

/// Signs and verifies session tokens with a process-wide symmetric secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    /// Build a token service. The secret is expected to have passed boot-time
    /// validation already.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Token lifetime shared by every mint.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `session`, issued now.
    pub fn mint(&self, session: &SessionUser) -> Result<String, AuthError> {
        self.mint_at(session, Utc::now())
    }

    /// Mint a token for `session` as if issued at `issued_at`.
    pub fn mint_at(
        &self,
        session: &SessionUser,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::TokenError("token expiry out of range".into()))?;
        let claims = TokenClaims {
            sub: session.id.clone(),
            username: session.username.clone(),
            name: session.name.clone(),
            is_admin: session.is_admin,
            must_change_password: session.must_change_password,
            apps: session.apps.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
    }

    /// Verify signature, expiry and claim shape. Any failure yields `None`.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        match decode::<TokenClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(kind = ?e.kind(), "session token rejected");
                None
            }
        }
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}
