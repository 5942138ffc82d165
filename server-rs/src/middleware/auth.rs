use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub token_type: Option<String>, // "access" or "refresh"
    pub exp: i64,
    pub iat: i64,
}

/// The verified caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: Option<String>,
}

impl AuthUser {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Player")
    }
}

/// Token verification is owned by the identity service; the API only checks.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, bearer: &str) -> AppResult<AuthUser>;
}

/// HS256 tokens signed with the shared secret.
pub struct JwtIdentity {
    secret: String,
}

impl JwtIdentity {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentity {
    async fn verify(&self, bearer: &str) -> AppResult<AuthUser> {
        let data = decode::<Claims>(
            bearer,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        let claims = data.claims;

        if claims.token_type.as_deref() == Some("refresh") {
            return Err(AppError::Unauthorized("Access token required".into()));
        }
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token subject".into()))?;
        Ok(AuthUser {
            id,
            name: claims.name,
        })
    }
}

/// Mints an access token. Issuance normally lives in the identity service;
/// this is for local tooling and tests.
pub fn issue_access_token(
    user_id: Uuid,
    name: Option<&str>,
    secret: &str,
    ttl_secs: i64,
) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        name: name.map(String::from),
        token_type: Some("access".to_string()),
        exp: now + ttl_secs,
        iat: now,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Middleware: requires a valid bearer token. Sets AuthUser in extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;

    let user = state.identity.verify(bearer.token()).await?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[tokio::test]
    async fn access_tokens_verify() {
        let user = Uuid::new_v4();
        let token = issue_access_token(user, Some("Ann"), SECRET, 60).unwrap();
        let auth = JwtIdentity::new(SECRET).verify(&token).await.unwrap();
        assert_eq!(auth.id, user);
        assert_eq!(auth.display_name(), "Ann");
    }

    #[tokio::test]
    async fn refresh_tokens_and_wrong_secrets_are_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            name: None,
            token_type: Some("refresh".into()),
            exp: now + 60,
            iat: now,
        };
        let refresh = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let err = JwtIdentity::new(SECRET).verify(&refresh).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let token = issue_access_token(Uuid::new_v4(), None, "other", 60).unwrap();
        let err = JwtIdentity::new(SECRET).verify(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Jwt(_)));
    }
}
