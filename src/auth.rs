use anyhow::{anyhow, Context};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{errors::ServerError, types::User, AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> anyhow::Result<i64> {
        self.sub
            .parse()
            .with_context(|| format!("Invalid user id in token: {}", self.sub))
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .context("Failed to generate access token")
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .context("Could not validate credentials")
    }

    pub fn extract_token_from_header(authorization: &str) -> anyhow::Result<&str> {
        authorization
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("Invalid Authorization header format"))
    }
}

/// bcrypt is slow on purpose, so hashing runs on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("Password hashing task failed")?
        .context("Failed to hash password")
}

pub async fn verify_password(password: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("Password verification task failed")?
        .context("Failed to verify password")
}

pub fn validate_signup(username: &str, email: &str, password: &str) -> Result<(), String> {
    let username_len = username.chars().count();
    if !(3..=50).contains(&username_len) {
        return Err("Username must be between 3 and 50 characters".into());
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
        _ => return Err("Invalid email address".into()),
    }
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".into());
    }
    Ok(())
}

/// The caller behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| ServerError::Unauthorized(anyhow!("Not authenticated")))?
            .to_str()
            .map_err(|_| ServerError::Unauthorized(anyhow!("Invalid Authorization header")))?;

        let token = JwtService::extract_token_from_header(header).map_err(ServerError::Unauthorized)?;
        let claims = state.jwt.verify(token).map_err(ServerError::Unauthorized)?;
        let user_id = claims.user_id().map_err(ServerError::Unauthorized)?;

        let user = state
            .db
            .select_user(user_id)
            .await
            .context("Failed to select user")
            .map_err(ServerError::DbError)?
            .ok_or_else(|| ServerError::Unauthorized(anyhow!("Could not validate credentials")))?;
        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 42,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let jwt = JwtService::new("secret", Duration::minutes(30));
        let token = jwt.issue(&user()).unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn rejects_foreign_and_expired_tokens() {
        let token = JwtService::new("secret", Duration::minutes(30))
            .issue(&user())
            .unwrap();
        assert!(JwtService::new("other", Duration::minutes(30))
            .verify(&token)
            .is_err());

        let expired = JwtService::new("secret", Duration::minutes(-5));
        let token = expired.issue(&user()).unwrap();
        assert!(expired.verify(&token).is_err());
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(
            JwtService::extract_token_from_header("Bearer abc.def").unwrap(),
            "abc.def"
        );
        assert!(JwtService::extract_token_from_header("Basic abc").is_err());
        assert!(JwtService::extract_token_from_header("Bearer ").is_err());
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hash = hash_password("correct horse".into(), 4).await.unwrap();
        assert!(verify_password("correct horse".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong horse".into(), hash).await.unwrap());
    }

    #[test]
    fn signup_validation() {
        assert!(validate_signup("alice", "alice@example.com", "password1").is_ok());
        assert!(validate_signup("al", "alice@example.com", "password1").is_err());
        assert!(validate_signup(&"a".repeat(51), "alice@example.com", "password1").is_err());
        assert!(validate_signup("alice", "alice.example.com", "password1").is_err());
        assert!(validate_signup("alice", "a@b@c", "password1").is_err());
        assert!(validate_signup("alice", "@example.com", "password1").is_err());
        assert!(validate_signup("alice", "alice@example.com", "short").is_err());
    }
}
