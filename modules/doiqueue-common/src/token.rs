use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Login tokens are effectively permanent.
pub const TOKEN_DURATION_DAYS: i64 = 999;

/// Claims carried by a profile login token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub picture: Option<String>,
}

/// Signs and verifies HS256 login tokens with the shared `JWT_KEY`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Build from the configured `JWT_KEY`. An empty key counts as missing.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let secret = config
            .jwt_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .context("JWT_KEY is required to issue login tokens")?;
        Ok(Self::new(secret))
    }

    /// Issue a token whose subject is the person's email.
    pub fn create_token(&self, email: &str, picture: Option<&str>) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::days(TOKEN_DURATION_DAYS);

        let claims = TokenClaims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            picture: picture.map(String::from),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    pub fn verify_token(&self, token: &str) -> Result<TokenClaims> {
        decode::<TokenClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}
