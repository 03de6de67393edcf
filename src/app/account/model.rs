//! 账户数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::core::{auth::Role, PageQuery};
use crate::utils::not_blank;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(
        length(min = 1, max = 100, message = "姓名长度必须在 1 到 100 之间"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[validate(length(min = 8, max = 128, message = "密码长度必须在 8 到 128 之间"))]
    pub password: String,
    #[validate(length(max = 50, message = "电话过长"))]
    pub phone: Option<String>,
    #[validate(length(max = 200, message = "公司名称过长"))]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 1, message = "密码不能为空"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(
        length(min = 1, max = 100, message = "姓名长度必须在 1 到 100 之间"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,
    #[validate(length(max = 50, message = "电话过长"))]
    pub phone: Option<String>,
    #[validate(length(max = 200, message = "公司名称过长"))]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "密码长度必须在 8 到 128 之间"))]
    pub new_password: String,
}

/// 管理员创建用户
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(
        length(min = 1, max = 100, message = "姓名长度必须在 1 到 100 之间"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[validate(length(min = 8, max = 128, message = "密码长度必须在 8 到 128 之间"))]
    pub password: String,
    pub role: Role,
    #[validate(length(max = 100, message = "部门名称过长"))]
    pub department: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

/// 管理员更新用户
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(
        length(min = 1, max = 100, message = "姓名长度必须在 1 到 100 之间"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,
    pub role: Option<Role>,
    #[validate(length(max = 100, message = "部门名称过长"))]
    pub department: Option<String>,
    pub active: Option<bool>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub department: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl UserQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub department: Option<String>,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(role) = self.role {
            if user.role != role {
                return false;
            }
        }
        if let Some(department) = &self.department {
            if user.department.as_deref() != Some(department.as_str()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !user.name.to_lowercase().contains(&needle)
                && !user.email.contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}
