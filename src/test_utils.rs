use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::Value;

use crate::config::Config;

pub const TEST_SECRET: &str = "test-token-secret";
pub const TEST_API_KEY: &str = "sk-test";

/// Config with no environment behind it, secrets filled in.
pub fn test_config() -> Config {
    Config::from_lookup(|_| None)
        .unwrap()
        .with_token_secret(TEST_SECRET)
        .with_api_key(TEST_API_KEY)
}

pub fn sign_token(claims: Value, secret: &str) -> String {
    sign_token_with(Algorithm::HS256, claims, secret)
}

pub fn sign_token_with(alg: Algorithm, claims: Value, secret: &str) -> String {
    encode(
        &Header::new(alg),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn expires_in(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}

/// Token the gate accepts: signed with [`TEST_SECRET`], `type = "auth"`.
pub fn auth_token() -> String {
    sign_token(
        serde_json::json!({ "id": "user_123", "type": "auth", "exp": expires_in(3600) }),
        TEST_SECRET,
    )
}
