use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub roles: Vec<Role>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("JWT_SECRET not set")]
    MissingSecret,
    #[error("token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

fn secret() -> Result<String, AuthError> {
    env::var("JWT_SECRET").map_err(|_| AuthError::MissingSecret)
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, AuthError> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`. The subject is the caller id handed to the engine.
pub struct Auth(pub Claims);

impl Auth {
    pub fn caller_id(&self) -> &str {
        &self.0.sub
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.0.roles.contains(&role)
    }
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return match decode_jwt(bearer.token()) {
                Ok(claims) => ready(Ok(Auth(claims))),
                Err(e) => {
                    tracing::debug!("rejected bearer token: {e}");
                    ready(Err(ApiError::Unauthorized.into()))
                }
            };
        }
        ready(Err(ApiError::Unauthorized.into()))
    }
}

/// Role guard for handlers returning `Result<_, ApiError>`.
#[macro_export]
macro_rules! require_role {
    ($auth:expr, $role:expr) => {
        if !$auth.has_role($role) {
            return Err($crate::error::ApiError::Forbidden);
        }
    };
}

/// Issue a token for `subject`, valid for `ttl`.
pub fn create_jwt(subject: &str, roles: Vec<Role>, ttl: chrono::Duration) -> Result<String, AuthError> {
    let secret = secret()?;
    let expiration = (chrono::Utc::now() + ttl).timestamp().max(0) as usize;
    let claims = Claims { sub: subject.to_string(), exp: expiration, roles };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}
