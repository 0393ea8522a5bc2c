//! Bearer token auth. Tokens are signed by the identity service with the shared secret.

use crate::{now, AppState, Error, Result};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("{0}")]
    Invalid(&'static str),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JwtToken {
    // issued at
    pub iat: i64,
    // expiration
    pub exp: i64,
    pub username: String,
}

impl JwtToken {
    pub fn from_str(token: &str, secret: &[u8]) -> Result<Self, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Ok(
            jsonwebtoken::decode::<JwtToken>(
                token,
                &DecodingKey::from_secret(secret),
                &validation,
            )?
            .claims,
        )
    }

    pub fn generate(username: &str, expiry: usize, secret: &[u8]) -> Result<String, AuthError> {
        let now = now() as i64;
        let payload = JwtToken {
            iat: now,
            exp: now + expiry as i64,
            username: username.to_owned(),
        };

        Ok(jsonwebtoken::encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(secret),
        )?)
    }
}

#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub username: String,
}

impl AuthedUser {
    pub fn from_token(token: &str, state: &AppState) -> Result<Self, Error> {
        let token = JwtToken::from_str(token, state.setting.auth.secret.as_bytes())?;
        if token.username.is_empty() {
            return Err(AuthError::Invalid("empty username").into());
        }
        Ok(Self {
            username: token.username,
        })
    }
}

impl FromRequest for AuthedUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<AuthedUser>>>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            if let Some(state) = req.app_data::<web::Data<AppState>>() {
                if let Some(auth) = req.headers().get(AUTHORIZATION) {
                    if let Ok(auth) = auth.to_str() {
                        if auth.starts_with("bearer") || auth.starts_with("Bearer") {
                            let token = auth[6..auth.len()].trim();
                            return AuthedUser::from_token(token, state);
                        }
                    }
                }
            }
            Err(AuthError::Invalid("missing auth token").into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token() -> anyhow::Result<()> {
        let token = JwtToken::generate("alice", 3600, b"secret")?;
        let auth = JwtToken::from_str(&token, b"secret")?;
        assert_eq!(auth.username, "alice");
        // wrong secret
        assert!(JwtToken::from_str(&token, b"other").is_err());
        // expired
        let token = JwtToken::generate("alice", 1, b"secret")?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let res = JwtToken::from_str(&token, b"secret");
        assert!(res.is_err());
        Ok(())
    }
}
