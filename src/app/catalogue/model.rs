//! 产品目录数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::core::PageQuery;
use crate::utils::not_blank;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub cas_number: Option<String>,
    pub category: String,
    pub description: String,
    pub purity: Option<String>,
    pub grade: Option<String>,
    pub package_size: Option<String>,
    pub unit: String,
    /// 为空表示询价
    pub price: Option<f64>,
    pub stock: i32,
    pub low_stock_threshold: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }
}

/// 校验 CAS 登记号，例如 `7732-18-5`
///
/// 第一段 2 到 7 位数字，第二段 2 位，最后一位为校验位。
/// 校验位 = 从右往左第 i 位数字乘以 i 之和，对 10 取余。
pub fn is_valid_cas_number(cas: &str) -> bool {
    let parts: Vec<&str> = cas.split('-').collect();
    let [first, second, check] = parts.as_slice() else {
        return false;
    };
    if !(2..=7).contains(&first.len()) || second.len() != 2 || check.len() != 1 {
        return false;
    }
    if !first
        .chars()
        .chain(second.chars())
        .chain(check.chars())
        .all(|c| c.is_ascii_digit())
    {
        return false;
    }

    let sum: u32 = first
        .chars()
        .chain(second.chars())
        .rev()
        .enumerate()
        .filter_map(|(i, c)| c.to_digit(10).map(|d| d * (i as u32 + 1)))
        .sum();

    check.chars().next().and_then(|c| c.to_digit(10)) == Some(sum % 10)
}

fn validate_cas(cas: &str) -> Result<(), ValidationError> {
    if is_valid_cas_number(cas.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("cas_number");
        err.message = Some("CAS 号格式或校验位不正确".into());
        Err(err)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(
        length(min = 1, max = 64, message = "SKU 长度必须在 1 到 64 之间"),
        custom(function = "not_blank")
    )]
    pub sku: String,
    #[validate(
        length(min = 1, max = 200, message = "产品名称长度必须在 1 到 200 之间"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[validate(custom(function = "validate_cas"))]
    pub cas_number: Option<String>,
    #[validate(
        length(min = 1, max = 100, message = "分类不能为空"),
        custom(function = "not_blank")
    )]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub purity: Option<String>,
    pub grade: Option<String>,
    pub package_size: Option<String>,
    #[validate(
        length(min = 1, max = 20, message = "单位不能为空"),
        custom(function = "not_blank")
    )]
    pub unit: String,
    #[validate(range(min = 0.0, message = "价格不能为负"))]
    pub price: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0, message = "库存不能为负"))]
    pub stock: i32,
    #[serde(default)]
    #[validate(range(min = 0, message = "库存预警值不能为负"))]
    pub low_stock_threshold: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// 部分更新，未提供的字段保持不变
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(
        length(min = 1, max = 200, message = "产品名称长度必须在 1 到 200 之间"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,
    #[validate(custom(function = "validate_cas"))]
    pub cas_number: Option<String>,
    #[validate(
        length(min = 1, max = 100, message = "分类不能为空"),
        custom(function = "not_blank")
    )]
    pub category: Option<String>,
    pub description: Option<String>,
    pub purity: Option<String>,
    pub grade: Option<String>,
    pub package_size: Option<String>,
    #[validate(
        length(min = 1, max = 20, message = "单位不能为空"),
        custom(function = "not_blank")
    )]
    pub unit: Option<String>,
    #[validate(range(min = 0.0, message = "价格不能为负"))]
    pub price: Option<f64>,
    /// 显式清除价格，改为询价
    #[serde(default)]
    pub clear_price: bool,
    #[validate(range(min = 0, message = "库存预警值不能为负"))]
    pub low_stock_threshold: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustStockRequest {
    pub delta: i32,
    #[validate(length(max = 200, message = "原因过长"))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub include_inactive: bool,
    pub low_stock_only: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.active {
            return false;
        }
        if self.low_stock_only && !product.is_low_stock() {
            return false;
        }
        if let Some(category) = &self.category {
            if !product.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = product.name.to_lowercase().contains(&needle)
                || product.sku.to_lowercase().contains(&needle)
                || product
                    .cas_number
                    .as_deref()
                    .is_some_and(|cas| cas.contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_check_digit() {
        assert!(is_valid_cas_number("7732-18-5")); // 水
        assert!(is_valid_cas_number("64-17-5")); // 乙醇
        assert!(is_valid_cas_number("7647-01-0")); // 盐酸
        assert!(!is_valid_cas_number("7732-18-4"));
        assert!(!is_valid_cas_number("64-17"));
        assert!(!is_valid_cas_number("12345678-17-5"));
        assert!(!is_valid_cas_number("77a2-18-5"));
    }

    #[test]
    fn test_create_request_rejects_bad_cas() {
        let req: CreateProductRequest = serde_json::from_value(serde_json::json!({
            "sku": "ETH-500",
            "name": "Ethanol",
            "cas_number": "64-17-6",
            "category": "Solvents",
            "unit": "bottle"
        }))
        .unwrap();
        assert!(req.validate().is_err());
        assert!(req.active);
    }

    #[test]
    fn test_whitespace_only_fields_rejected() {
        let req: CreateProductRequest = serde_json::from_value(serde_json::json!({
            "sku": "ETH-500",
            "name": "   ",
            "category": "Solvents",
            "unit": "bottle"
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));

        let update = UpdateProductRequest {
            category: Some(" \t ".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
