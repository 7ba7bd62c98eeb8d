//! Admin access gate: password hashing, JWT issuing/validation, and the axum
//! extractors that guard staff endpoints.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::engine::new_id;
use crate::error::AppError;
use crate::models::AdminUser;
use crate::schema::admin_users;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtKeys {
    inner: Arc<KeysInner>,
}

struct KeysInner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            inner: Arc::new(KeysInner {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
                ttl: Duration::minutes(config.jwt_expire_minutes),
            }),
        }
    }

    pub fn issue(&self, username: &str, role: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + self.inner.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.inner.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("token encoding failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.inner.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Unauthorized("Token expired".to_string()),
                _ => AppError::Unauthorized("Invalid token".to_string()),
            })
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    if password.is_empty() {
        return false;
    }
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

fn bad_credentials() -> AppError {
    AppError::Unauthorized("Invalid username or password".to_string())
}

/// Unknown users, inactive users and wrong passwords are indistinguishable
/// to the caller.
pub async fn authenticate(conn: &mut AsyncPgConnection, username: &str, password: &str) -> Result<AdminUser, AppError> {
    let user = admin_users::table
        .filter(admin_users::username.eq(username.trim()))
        .first::<AdminUser>(conn)
        .await
        .optional()?
        .ok_or_else(bad_credentials)?;

    if !user.is_active || !verify_password(password, &user.password_hash) {
        tracing::warn!(username = %user.username, "rejected admin login");
        return Err(bad_credentials());
    }
    Ok(user)
}

pub async fn find_active_user(conn: &mut AsyncPgConnection, username: &str) -> Result<AdminUser, AppError> {
    admin_users::table
        .filter(admin_users::username.eq(username))
        .filter(admin_users::is_active.eq(true))
        .first::<AdminUser>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::Unauthorized("User no longer active".to_string()))
}

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: String,
}

impl NewAdmin {
    fn validate(&self) -> Result<(), AppError> {
        if self.username.trim().is_empty() {
            return Err(AppError::InvalidInput("username is required".to_string()));
        }
        if self.password.chars().count() < 8 {
            return Err(AppError::InvalidInput("password must be at least 8 characters".to_string()));
        }
        if self.role.trim().is_empty() {
            return Err(AppError::InvalidInput("role is required".to_string()));
        }
        Ok(())
    }
}

pub async fn create_admin(conn: &mut AsyncPgConnection, input: NewAdmin) -> Result<AdminUser, AppError> {
    input.validate()?;
    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;

    let user = AdminUser {
        id: new_id("ADM"),
        username: input.username.trim().to_string(),
        full_name: input.full_name.filter(|n| !n.trim().is_empty()),
        password_hash,
        role: input.role.trim().to_string(),
        is_active: true,
        created_at: Utc::now(),
    };
    Ok(diesel::insert_into(admin_users::table)
        .values(&user)
        .get_result::<AdminUser>(conn)
        .await?)
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".to_string()))
}

/// Any caller holding a valid token.
#[derive(Debug, Clone)]
pub struct Staff {
    pub username: String,
    pub role: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Staff
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = JwtKeys::from_ref(state).verify(token).map_err(|e| {
            tracing::warn!(uri = %parts.uri, error = %e, "rejected staff token");
            e
        })?;
        Ok(Staff { username: claims.sub, role: claims.role })
    }
}

/// Caller with role `admin`; required by every mutating endpoint.
#[derive(Debug, Clone)]
pub struct AdminOnly(pub Staff);

#[async_trait]
impl<S> FromRequestParts<S> for AdminOnly
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let staff = Staff::from_request_parts(parts, state).await?;
        if staff.role != ADMIN_ROLE {
            return Err(AppError::Forbidden("Admin only".to_string()));
        }
        Ok(AdminOnly(staff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::auth_config;

    #[test]
    fn issued_tokens_verify() {
        let keys = JwtKeys::new(&auth_config());
        let token = keys.issue("admin", ADMIN_ROLE).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, ADMIN_ROLE);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let keys = JwtKeys::new(&auth_config());
        let mut other = auth_config();
        other.jwt_secret = "ffffffffffffffffffffffffffffffff".into();
        let foreign = JwtKeys::new(&other).issue("admin", ADMIN_ROLE).unwrap();

        assert!(matches!(keys.verify(&foreign), Err(AppError::Unauthorized(_))));
        assert!(matches!(keys.verify("not-a-jwt"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut cfg = auth_config();
        cfg.jwt_expire_minutes = -10;
        let keys = JwtKeys::new(&cfg);
        let token = keys.issue("admin", ADMIN_ROLE).unwrap();
        match keys.verify(&token) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "Token expired"),
            other => panic!("expected expiry rejection, got {other:?}"),
        }
    }

    #[test]
    fn new_admin_input_is_checked() {
        let admin = NewAdmin {
            username: "owner".into(),
            password: "long-enough".into(),
            full_name: None,
            role: ADMIN_ROLE.into(),
        };
        assert!(admin.validate().is_ok());
        assert!(NewAdmin { username: " ".into(), ..admin.clone() }.validate().is_err());
        assert!(NewAdmin { password: "short".into(), ..admin.clone() }.validate().is_err());
        assert!(NewAdmin { role: "".into(), ..admin }.validate().is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-phc-string"));
    }
}
