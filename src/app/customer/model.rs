//! 客户档案模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::core::PageQuery;
use crate::utils::not_blank;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(
        length(min = 1, max = 32, message = "客户编码长度必须在 1 到 32 之间"),
        custom(function = "not_blank")
    )]
    pub code: String,
    #[validate(
        length(min = 1, max = 200, message = "客户名称长度必须在 1 到 200 之间"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[validate(length(max = 100, message = "联系人过长"))]
    pub contact_person: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    #[validate(length(max = 50, message = "电话过长"))]
    pub phone: Option<String>,
    #[validate(length(max = 500, message = "地址过长"))]
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCustomerRequest {
    #[validate(
        length(min = 1, max = 32, message = "客户编码长度必须在 1 到 32 之间"),
        custom(function = "not_blank")
    )]
    pub code: Option<String>,
    #[validate(
        length(min = 1, max = 200, message = "客户名称长度必须在 1 到 200 之间"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,
    #[validate(length(max = 100, message = "联系人过长"))]
    pub contact_person: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    #[validate(length(max = 50, message = "电话过长"))]
    pub phone: Option<String>,
    #[validate(length(max = 500, message = "地址过长"))]
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl CustomerQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// 按编码、名称、联系人模糊匹配
pub fn customer_matches(customer: &Customer, search: Option<&str>) -> bool {
    let Some(search) = search else {
        return true;
    };
    let needle = search.to_lowercase();
    customer.code.to_lowercase().contains(&needle)
        || customer.name.to_lowercase().contains(&needle)
        || customer
            .contact_person
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains(&needle))
}
