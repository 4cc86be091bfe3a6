//! Access token verification for the marketplace service
//!
//! Sign-up and sign-in happen against the hosted auth service directly. This
//! crate only answers one question: which user does a bearer token belong to.
//! Tokens are either checked locally with the project's JWT secret, or handed
//! to the auth service's `/auth/v1/user` endpoint.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Audience the auth service puts in tokens of signed-in users
pub const DEFAULT_AUDIENCE: &str = "authenticated";

/// Error type
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing token")]
    MissingToken,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AuthError {
    /// Whether the caller's credentials were at fault, as opposed to the auth service
    pub fn is_credential_error(&self) -> bool {
        matches!(self, AuthError::InvalidToken(_) | AuthError::MissingToken)
    }
}

/// User record returned by the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub exp: usize,
}

/// The identity a request acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Extract the token from an `Authorization` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Auth client
#[derive(Debug, Clone)]
pub struct AuthClient {
    url: String,
    key: String,
    http_client: Client,
    jwt_secret: Option<String>,
    audience: String,
}

impl AuthClient {
    /// Create a client that asks the auth service about every token
    pub fn new(url: &str, key: &str, http_client: Client) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            jwt_secret: None,
            audience: DEFAULT_AUDIENCE.to_string(),
        }
    }

    /// Verify tokens locally with the project's JWT secret instead of calling the service
    pub fn with_jwt_secret(mut self, secret: &str) -> Self {
        self.jwt_secret = Some(secret.to_string());
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audience = audience.to_string();
        self
    }

    pub fn verifies_locally(&self) -> bool {
        self.jwt_secret.is_some()
    }

    /// Fetch the user owning `access_token` from the auth service
    pub async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        let url = format!("{}/auth/v1/user", self.url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::InvalidToken(error_text));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::ApiError(format!(
                "Failed to get user ({}): {}",
                status, error_text
            )));
        }

        let user_data = response.json::<serde_json::Value>().await?;
        let user = serde_json::from_value::<User>(user_data)?;
        Ok(user)
    }

    /// Check signature, expiry and audience of `access_token` locally
    pub fn verify_token(&self, access_token: &str) -> Result<Claims, AuthError> {
        let secret = self.jwt_secret.as_deref().ok_or_else(|| {
            AuthError::ApiError("no JWT secret configured for local verification".to_string())
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);

        let token_data = decode::<Claims>(
            access_token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }

    /// Resolve `access_token` to the user it identifies
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthenticatedUser, AuthError> {
        if access_token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        let (subject, email) = if self.verifies_locally() {
            let claims = self.verify_token(access_token)?;
            (claims.sub, claims.email)
        } else {
            let user = self.get_user(access_token).await?;
            (user.id, user.email)
        };

        let id = Uuid::parse_str(&subject).map_err(|_| {
            log::warn!("token subject {:?} is not a user id", subject);
            AuthError::InvalidToken("token subject is not a user id".to_string())
        })?;

        Ok(AuthenticatedUser { id, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn token(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn local_client() -> AuthClient {
        AuthClient::new("http://localhost:54321", "anon", Client::new()).with_jwt_secret(SECRET)
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_verify_token_accepts_valid_token() {
        let user_id = Uuid::new_v4();
        let jwt = token(
            json!({
                "sub": user_id.to_string(),
                "email": "seller@example.com",
                "role": "authenticated",
                "aud": "authenticated",
                "exp": now() + 3600,
            }),
            SECRET,
        );

        let claims = local_client().verify_token(&jwt).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("seller@example.com"));
    }

    #[test]
    fn test_verify_token_rejects_wrong_secret() {
        let jwt = token(
            json!({ "sub": Uuid::new_v4().to_string(), "aud": "authenticated", "exp": now() + 3600 }),
            "some-other-secret-that-is-long-enough-too",
        );
        let err = local_client().verify_token(&jwt).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn test_verify_token_rejects_expired_token() {
        let jwt = token(
            json!({ "sub": Uuid::new_v4().to_string(), "aud": "authenticated", "exp": now() - 3600 }),
            SECRET,
        );
        let err = local_client().verify_token(&jwt).unwrap_err();
        assert!(err.is_credential_error());
    }

    #[test]
    fn test_verify_token_rejects_anon_audience() {
        let jwt = token(
            json!({ "sub": Uuid::new_v4().to_string(), "aud": "anon", "exp": now() + 3600 }),
            SECRET,
        );
        assert!(local_client().verify_token(&jwt).is_err());
    }

    #[tokio::test]
    async fn test_authenticate_locally() {
        let user_id = Uuid::new_v4();
        let jwt = token(
            json!({ "sub": user_id.to_string(), "aud": "authenticated", "exp": now() + 3600 }),
            SECRET,
        );

        let user = local_client().authenticate(&jwt).await.unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.email, None);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_non_uuid_subject() {
        let jwt = token(
            json!({ "sub": "service", "aud": "authenticated", "exp": now() + 3600 }),
            SECRET,
        );
        let err = local_client().authenticate(&jwt).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_blank_token() {
        let err = local_client().authenticate("  ").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }
}
