use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::error::{KeeperError, Result};
use crate::models::Claims;

pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 5;

/// Issues and validates stateless HS256 tokens.
///
/// Nothing is stored server-side: a token is valid while its signature checks
/// out and `exp` lies in the future. Tokens are never revoked.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    /// # Errors
    /// [`KeeperError::Config`] if `ttl_minutes` is negative or too large to
    /// add to a timestamp.
    pub fn new(secret: impl AsRef<[u8]>, ttl_minutes: i64) -> Result<Self> {
        let secret = secret.as_ref();
        let ttl = Duration::try_minutes(ttl_minutes)
            .filter(|ttl| *ttl >= Duration::zero())
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| {
                KeeperError::Config(format!("token ttl of {} minutes is out of range", ttl_minutes))
            })?;

        // Expiry is checked by hand so that an expired token can be told apart
        // from a forged one; `exp <= now` counts as expired, with no leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    pub fn issue(&self, subject: &str) -> Result<String> {
        self.issue_with_ttl(subject, self.ttl)
    }

    pub fn issue_with_ttl(&self, subject: &str, ttl: Duration) -> Result<String> {
        let expires = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| KeeperError::Config("token expiry out of range".into()))?;
        let claims = Claims {
            sub: subject.to_owned(),
            exp: expires.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Returns the subject of a valid token.
    pub fn validate(&self, token: &str) -> Result<String> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!("token rejected: {}", e);
            KeeperError::InvalidToken
        })?;

        if data.claims.exp <= Utc::now().timestamp() {
            return Err(KeeperError::ExpiredToken);
        }
        Ok(data.claims.sub)
    }
}
