use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::Settings;
use crate::models::api::AuthContext;
use crate::routes::ApiError;

/// Clock drift tolerated on `exp`, in seconds.
const LEEWAY_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Invalid Authorization header format")]
    MalformedHeader,
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Token validation failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::unauthorized(e.to_string())
    }
}

/// Claims accepted in bearer tokens. The caller is `user_id`, else `sub`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// HMAC bearer token verifier.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, AuthError> {
        let algorithm = match algorithm {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(AuthError::UnsupportedAlgorithm(other.to_string())),
        };
        let mut validation = Validation::new(algorithm);
        validation.leeway = LEEWAY_SECS;
        validation.required_spec_claims = HashSet::new();

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<AuthContext, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.key, &self.validation)?.claims;
        Ok(AuthContext {
            user_id: claims
                .user_id
                .or(claims.sub)
                .unwrap_or_else(|| "unknown".to_string()),
            app_id: claims.app_id,
        })
    }
}

/// Resolve the caller from an `Authorization: Bearer <jwt>` header value.
///
/// In bypass mode every request runs as `dev_user_id` and the header is ignored.
pub fn extract_auth_from_header(
    auth_header: Option<&str>,
    secret: &str,
    algorithm: &str,
    bypass_mode: bool,
    dev_user_id: &str,
) -> Result<AuthContext, AuthError> {
    if bypass_mode {
        return Ok(AuthContext {
            user_id: dev_user_id.to_string(),
            app_id: None,
        });
    }

    let token = auth_header
        .ok_or(AuthError::MissingHeader)?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MalformedHeader)?;

    JwtVerifier::new(secret, algorithm)?.verify(token)
}

pub fn require_auth(headers: &HeaderMap, settings: &Settings) -> Result<AuthContext, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    Ok(extract_auth_from_header(
        header,
        &settings.jwt_secret_key,
        &settings.jwt_algorithm,
        settings.bypass_auth_mode,
        &settings.dev_user_id,
    )?)
}
