//! Bearer-token gate for protected routes.
//!
//! Tokens are HMAC-signed JWTs issued elsewhere with the shared
//! `POCKETBASE_TOKEN_SECRET`. Only tokens whose `type` claim is `"auth"` get
//! through; refresh tokens and the like are turned away even when their
//! signature is fine.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::AppState;
use crate::error::AppError;

pub const AUTH_TOKEN_TYPE: &str = "auth";

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingHeader,

    #[error("authorization header is not of the form `Bearer <token>`")]
    MalformedHeader,

    #[error("token rejected: {0}")]
    InvalidSignatureOrExpired(#[source] jsonwebtoken::errors::Error),

    #[error("token type is {0:?}, expected \"auth\"")]
    WrongTokenType(Option<String>),

    #[error("token signing secret is not configured")]
    ServerMisconfigured,
}

impl AuthError {
    /// Stable code for logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::InvalidSignatureOrExpired(_) => "invalid_token",
            AuthError::WrongTokenType(_) => "wrong_token_type",
            AuthError::ServerMisconfigured => "server_misconfigured",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::ServerMisconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "Missing or malformed JWT",
            AuthError::MalformedHeader => "Malformed Authorization header",
            AuthError::InvalidSignatureOrExpired(_) => "Invalid or expired JWT",
            AuthError::WrongTokenType(_) => "Invalid token type",
            AuthError::ServerMisconfigured => "Server configuration error",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    #[serde(default, deserialize_with = "string_or_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "string_or_none")]
    pub token_type: Option<String>,
}

/// Identity of the caller, stored in the request extensions once the token
/// has been accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Option<String>,
}

// Non-string claim values are treated as absent rather than failing decode,
// so a numeric `type` still ends up as a token-type rejection.
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_str().map(str::to_string)))
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = match headers.get(AUTHORIZATION) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AuthError::MissingHeader),
    };
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(*token),
        _ => Err(AuthError::MalformedHeader),
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = HMAC_ALGORITHMS.to_vec();
    // `exp` is checked when present but not required, with no grace period.
    validation.required_spec_claims.clear();
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(AuthError::InvalidSignatureOrExpired)?;

    let claims = data.claims;
    if claims.token_type.as_deref() != Some(AUTH_TOKEN_TYPE) {
        return Err(AuthError::WrongTokenType(claims.token_type));
    }

    Ok(claims)
}

/// Middleware for routes that need a valid auth token.
///
/// The header shape is checked before the secret is looked up, so a request
/// without credentials is a 401 even on a misconfigured server.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let secret = state
        .config
        .token_secret()
        .map_err(|_| AuthError::ServerMisconfigured)?;
    let claims = verify_token(token, secret)?;

    tracing::debug!(user_id = claims.id.as_deref().unwrap_or(""), "JWT accepted");
    request
        .extensions_mut()
        .insert(AuthenticatedUser { id: claims.id });

    Ok(next.run(request).await)
}
