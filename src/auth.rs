use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::models::{Claims, User};

pub const DISTRIBUTOR_KEY_HEADER: &str = "X-API-Key";

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(AppError::from)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(AppError::from)
}

pub fn issue_token(user: &User, secret: &str, ttl_hours: i64) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        exp: (now + Duration::hours(ttl_hours)).timestamp() as usize,
        iat: now.timestamp() as usize,
        is_admin: user.is_admin,
        is_artist: user.is_artist,
        is_distributor: user.is_distributor,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(AppError::from)
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// The verified caller of a request, built once from the token claims.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub is_admin: bool,
    pub is_artist: bool,
    pub is_distributor: bool,
}

impl AuthContext {
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            is_admin: claims.is_admin,
            is_artist: claims.is_artist,
            is_distributor: claims.is_distributor,
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

fn app_state(req: &HttpRequest) -> Result<&web::Data<AppState>> {
    req.app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("Application state missing".to_string()))
}

fn authenticate(req: &HttpRequest, token: &str) -> Result<AuthContext> {
    let state = app_state(req)?;
    let claims = validate_token(token, &state.config.jwt_secret).map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;
    Ok(AuthContext::from_claims(claims))
}

impl FromRequest for AuthContext {
    type Error = AppError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match bearer_token(req) {
            Some(token) => authenticate(req, token),
            None => Err(AppError::Unauthorized("Authentication required".to_string())),
        };
        ready(result)
    }
}

/// Caller identity for routes that also serve anonymous visitors.
///
/// A missing header means anonymous; a present but invalid token is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<AuthContext>);

impl OptionalAuth {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|ctx| ctx.user_id.as_str())
    }
}

impl FromRequest for OptionalAuth {
    type Error = AppError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match bearer_token(req) {
            Some(token) => authenticate(req, token).map(|ctx| OptionalAuth(Some(ctx))),
            None => Ok(OptionalAuth(None)),
        };
        ready(result)
    }
}

/// Proof that the request carried the configured distributor API key.
#[derive(Debug, Clone, Copy)]
pub struct DistributorKey;

impl FromRequest for DistributorKey {
    type Error = AppError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = app_state(req).and_then(|state| {
            let provided = req
                .headers()
                .get(DISTRIBUTOR_KEY_HEADER)
                .and_then(|h| h.to_str().ok());
            match (state.config.distributor_api_key.as_deref(), provided) {
                (Some(expected), Some(given)) if expected == given => Ok(DistributorKey),
                _ => Err(AppError::Unauthorized("Invalid API key".to_string())),
            }
        });
        ready(result)
    }
}
