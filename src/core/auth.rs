//! 认证与授权：JWT 签发/校验、密码哈希、请求提取器
//!
//! 提取器每次请求都会按令牌中的用户 id 读取账号，角色以存储为准。

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::error::{CoreError, CoreResult};
use crate::app::account::repository::UserRepository;

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Employee,
    Admin,
}

impl Role {
    /// 可以打卡的角色
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Employee | Role::Admin)
    }
}

/// JWT 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// JWT 密钥与有效期
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: u32) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_seconds: i64::from(ttl_hours) * 3600,
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// 为用户签发访问令牌
    pub fn issue(&self, user_id: Uuid, email: &str, name: &str, role: Role) -> CoreResult<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            name: name.to_string(),
            role,
            iat: now,
            exp: now + self.ttl_seconds,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CoreError::InternalServerError(format!("JWT 签发失败: {}", e)))
    }

    pub fn verify(&self, token: &str) -> CoreResult<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| CoreError::Unauthorized)
    }
}

/// 使用 argon2id 生成密码哈希
pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CoreError::InternalServerError(format!("密码哈希失败: {}", e)))
}

/// 校验密码与 argon2id 哈希
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// 校验令牌后按账号当前状态刷新载荷；账号不存在或已停用视为未认证
async fn authenticate<S>(token: &str, state: &S) -> CoreResult<Claims>
where
    JwtKeys: FromRef<S>,
    Arc<dyn UserRepository>: FromRef<S>,
    S: Send + Sync,
{
    let mut claims = JwtKeys::from_ref(state).verify(token)?;
    let users = <Arc<dyn UserRepository> as FromRef<S>>::from_ref(state);
    let user = users
        .find_by_id(claims.sub)
        .await?
        .filter(|user| user.active)
        .ok_or(CoreError::Unauthorized)?;
    claims.role = user.role;
    claims.email = user.email;
    claims.name = user.name;
    Ok(claims)
}

/// 已登录用户
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    JwtKeys: FromRef<S>,
    Arc<dyn UserRepository>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(CoreError::Unauthorized)?;
        authenticate(token, state).await.map(AuthUser)
    }
}

/// 管理员
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    JwtKeys: FromRef<S>,
    Arc<dyn UserRepository>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            return Err(CoreError::Forbidden);
        }
        Ok(AdminUser(claims))
    }
}

/// 可选登录：没有令牌时为 None，令牌无效时仍然拒绝
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Claims>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    JwtKeys: FromRef<S>,
    Arc<dyn UserRepository>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => authenticate(token, state)
                .await
                .map(|claims| MaybeAuthUser(Some(claims))),
        }
    }
}
