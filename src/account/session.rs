/// HS256 session tokens issued after a successful sign-in
use crate::{
    account::{User, UserRole},
    config::SessionConfig,
    error::{AppError, AppResult},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ten years
const MAX_EXPIRATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Session token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn user_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Authentication("Invalid token subject".to_string()))
    }
}

/// Issues and validates session tokens
pub struct SessionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: Duration,
}

impl SessionTokenIssuer {
    pub fn new(secret: &str, expiration: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        let secs = config.jwt_expiration_secs.min(MAX_EXPIRATION_SECS) as i64;
        Self::new(&config.jwt_secret, Duration::seconds(secs))
    }

    pub fn issue(&self, user: &User) -> AppResult<String> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> AppResult<String> {
        self.sign(SessionClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.expiration).timestamp(),
        })
    }

    /// Verify signature and expiry
    pub fn validate(&self, token: &str) -> AppResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("Session token rejected: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        AppError::Authentication("Token has expired".to_string())
                    }
                    ErrorKind::InvalidSignature => {
                        AppError::Authentication("Invalid token signature".to_string())
                    }
                    _ => AppError::Authentication(format!("Invalid token: {}", e)),
                }
            })
    }

    /// Exchange a still-valid token for one with a fresh expiry
    pub fn refresh(&self, token: &str) -> AppResult<String> {
        let claims = self.validate(token)?;
        let now = Utc::now();

        self.sign(SessionClaims {
            iat: now.timestamp(),
            exp: (now + self.expiration).timestamp(),
            ..claims
        })
    }

    fn sign(&self, claims: SessionClaims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }
}
