use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::{ADMIN_ROLE, User},
    repository::RepositoryState,
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "lumina_session";

/// Sessions last thirty days.
pub const SESSION_DAYS: i64 = 30;

/// Claims
///
/// Payload of the HS256 session token. The role is embedded for clients, but
/// authorization always re-reads the account so that deactivated users and
/// role changes take effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account id.
    pub sub: Uuid,
    pub role: String,
    /// Expiration (UTC Unix timestamp).
    pub exp: i64,
    /// Issued at (UTC Unix timestamp).
    pub iat: i64,
}

/// Sign a session token for `user`.
pub fn issue_token(user: &User, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        role: user.role.clone(),
        exp: (now + Duration::days(SESSION_DAYS)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify signature and expiry of a session token.
pub fn read_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

/// HttpOnly cookie holding a freshly issued token.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie value used to clear the session on logout.
pub fn cleared_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Hash a plaintext password with Argon2id and a random salt (PHC string).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch; `Err` only for an unreadable stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// AuthUser
///
/// The resolved identity behind a request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// RequestContext
///
/// Request-scoped `{identity, role}`. Extraction never rejects an anonymous
/// or badly authenticated caller: a missing, malformed, expired or revoked
/// session simply yields no identity, and each operation decides whether
/// that is enough. Only a storage failure while resolving the account
/// rejects the request (500).
///
/// Resolution order:
/// 1. Local only: an `x-user-id` header naming an existing account.
/// 2. `Authorization: Bearer <token>`.
/// 3. The `lumina_session` cookie.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<AuthUser>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().is_some_and(AuthUser::is_admin)
    }

    /// Gate for every mutating CMS operation.
    pub fn require_admin(&self) -> Result<&AuthUser, ApiError> {
        match &self.identity {
            Some(user) if user.is_admin() => Ok(user),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

fn active(user: Option<User>) -> Option<AuthUser> {
    user.filter(|u| u.is_active).map(|u| AuthUser {
        id: u.id,
        role: u.role,
    })
}

fn bearer_or_cookie(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    bearer.or_else(|| {
        CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
    })
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let header_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = header_id {
                if let Some(identity) = active(repo.get_user(user_id).await?) {
                    return Ok(Self {
                        identity: Some(identity),
                    });
                }
            }
        }

        let Some(token) = bearer_or_cookie(parts) else {
            return Ok(Self::anonymous());
        };

        let claims = match read_token(&token, &config.session_secret) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring invalid session token");
                return Ok(Self::anonymous());
            }
        };

        Ok(Self {
            identity: active(repo.get_user(claims.sub).await?),
        })
    }
}

/// AdminUser
///
/// Extractor for endpoints that are admin-only in their entirety. Rejects
/// with 401 before the handler body runs.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = RequestContext::from_request_parts(parts, state).await?;
        context.require_admin().cloned().map(AdminUser)
    }
}
