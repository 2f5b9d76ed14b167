use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AuthError},
    models::{Identity, Role},
};

/// Claims
///
/// Payload signed into every session token. The role claim is authoritative for the
/// token's lifetime; it is not re-checked against the store on each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the username.
    pub sub: String,
    /// Account id, carried so ownership checks need no lookup.
    pub uid: Uuid,
    pub role: Role,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiration (seconds since epoch). The token is invalid once `now >= exp`.
    pub exp: i64,
    /// Unique token id; two tokens never share a signature.
    pub jti: Uuid,
}

/// An issued session token and its validity window.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// TokenService
///
/// Issues and verifies HMAC-SHA256 signed session tokens. Verification is a pure
/// function of the signature and the expiry claim.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked in `verify_at` so that `now == exp` already counts as expired.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.token_ttl_hours)
    }

    pub fn issue(&self, identity: &Identity) -> Result<SessionToken, AppError> {
        self.issue_at(identity, Utc::now())
    }

    /// Signs a token for `identity` valid from `now` for the configured window.
    pub fn issue_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, AppError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: identity.username.clone(),
            uid: identity.user_id,
            role: identity.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode session token: {e}")))?;

        Ok(SessionToken {
            token,
            issued_at: now,
            expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Checks the signature, then the expiry against `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::MalformedToken,
            }
        })?;

        let claims = data.claims;
        if now.timestamp() >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }
        if claims.sub.is_empty() {
            return Err(AuthError::MalformedToken);
        }

        Ok(Identity {
            user_id: claims.uid,
            username: claims.sub,
            role: claims.role,
        })
    }
}
