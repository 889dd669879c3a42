//! JWT verification
//!
//! Tokens are issued by the account service. The gateway only checks them: HS256 with a
//! shared secret, or RS256 with the issuer's public key.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use watch_core::UserId;

use crate::config::JwtConfig;
use crate::error::AppError;

/// Turns an opaque bearer token into a user identity
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, AppError>;
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    /// Numeric user id, used by older issuers instead of `sub`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Get the user ID
    ///
    /// # Errors
    /// Returns an error if neither `id` nor `sub` holds a non-zero id
    pub fn user_id(&self) -> Result<UserId, AppError> {
        let id = match self.id {
            Some(id) => UserId::new(id),
            None => UserId::parse(&self.sub).map_err(|_| AppError::InvalidToken)?,
        };

        if id.is_zero() {
            return Err(AppError::InvalidToken);
        }
        Ok(id)
    }

    /// Check if the token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// JWT service for decoding tokens (and issuing them when holding a shared secret)
#[derive(Clone)]
pub struct JwtService {
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtService {
    /// HS256 service that can both issue and verify
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding_key: Some(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
        }
    }

    /// RS256 verify-only service from a PEM encoded public key
    ///
    /// # Errors
    /// Returns an error if the key cannot be parsed
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, AppError> {
        let decoding_key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| AppError::Config(format!("invalid JWT public key: {e}")))?;

        Ok(Self {
            encoding_key: None,
            decoding_key,
            algorithm: Algorithm::RS256,
        })
    }

    /// Build the service described by the configuration
    ///
    /// # Errors
    /// Returns an error if the public key file cannot be read or parsed, or nothing is configured
    pub fn from_config(config: &JwtConfig) -> Result<Self, AppError> {
        if let Some(path) = &config.public_key_path {
            let pem = std::fs::read(path)
                .map_err(|e| AppError::Config(format!("cannot read JWT public key {path}: {e}")))?;
            return Self::from_rsa_pem(&pem);
        }

        config
            .secret
            .as_deref()
            .map(Self::from_secret)
            .ok_or_else(|| AppError::Config("no JWT secret or public key configured".to_string()))
    }

    /// Issue a token for a user
    ///
    /// # Errors
    /// Returns an error for verify-only services or if encoding fails
    pub fn issue(&self, user_id: UserId, ttl_secs: i64) -> Result<String, AppError> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| AppError::Config("JWT service cannot issue tokens".to_string()))?;

        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            id: None,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, key)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to encode JWT")))
    }

    /// Decode and validate a JWT token
    ///
    /// # Errors
    /// Returns an error if the token is invalid or expired
    pub fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::new(self.algorithm);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::InvalidToken,
            }
        })?;

        Ok(token_data.claims)
    }
}

impl TokenVerifier for JwtService {
    fn verify(&self, token: &str) -> Result<UserId, AppError> {
        if token.is_empty() {
            return Err(AppError::MissingAuth);
        }
        self.decode_token(token)?.user_id()
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.algorithm)
            .field("can_issue", &self.encoding_key.is_some())
            .finish_non_exhaustive()
    }
}
