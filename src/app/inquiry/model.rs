//! 询价单数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::core::PageQuery;
use crate::utils::not_blank;

/// 询价单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    Pending,
    Processing,
    Quoted,
    Closed,
    Cancelled,
}

impl InquiryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InquiryStatus::Closed | InquiryStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: InquiryStatus) -> bool {
        use InquiryStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Quoted)
                | (Pending, Cancelled)
                | (Processing, Quoted)
                | (Processing, Cancelled)
                | (Quoted, Closed)
                | (Quoted, Cancelled)
        )
    }
}

/// 询价行，保存提交时的产品快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InquiryItem {
    pub product_id: Uuid,
    pub sku: String,
    pub product_name: String,
    pub quantity: u32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Inquiry {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Option<Uuid>,
    pub contact_name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    #[cfg_attr(feature = "database", sqlx(json))]
    pub items: Vec<InquiryItem>,
    pub status: InquiryStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inquiry {
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

/// 询价编号：INQ-日期-随机后缀
pub fn make_reference(id: Uuid, at: DateTime<Utc>) -> String {
    let suffix: String = id.simple().to_string().chars().take(6).collect();
    format!("INQ-{}-{}", at.format("%Y%m%d"), suffix.to_uppercase())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InquiryLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub note: Option<String>,
}

pub const MAX_LINE_QUANTITY: u32 = 100_000;

/// 合并购物车中重复的产品行：数量相加，备注用分号连接，保留首次出现的顺序
pub fn merge_lines(lines: &[InquiryLineRequest]) -> Vec<MergedLine> {
    let mut merged: Vec<MergedLine> = Vec::with_capacity(lines.len());
    for line in lines {
        let note = line
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
                existing.note = match (existing.note.take(), note) {
                    (Some(a), Some(b)) => Some(format!("{}; {}", a, b)),
                    (a, b) => a.or(b),
                };
            }
            None => merged.push(MergedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                note,
            }),
        }
    }
    merged
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitInquiryRequest {
    #[validate(
        length(min = 1, max = 100, message = "联系人不能为空"),
        custom(function = "not_blank")
    )]
    pub contact_name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(max = 200, message = "公司名称过长"))]
    pub company: Option<String>,
    #[validate(length(max = 50, message = "电话过长"))]
    pub phone: Option<String>,
    #[validate(length(max = 2000, message = "留言过长"))]
    pub message: Option<String>,
    #[validate(length(min = 1, max = 50, message = "询价单必须包含 1 到 50 个产品"))]
    pub items: Vec<InquiryLineRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInquiryStatusRequest {
    pub status: InquiryStatus,
    #[validate(length(max = 2000, message = "备注过长"))]
    pub admin_note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InquiryQuery {
    pub status: Option<InquiryStatus>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl InquiryQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InquiryFilter {
    pub status: Option<InquiryStatus>,
    pub user_id: Option<Uuid>,
    pub search: Option<String>,
}

impl InquiryFilter {
    pub fn matches(&self, inquiry: &Inquiry) -> bool {
        if let Some(status) = self.status {
            if inquiry.status != status {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if inquiry.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = inquiry.reference.to_lowercase().contains(&needle)
                || inquiry.contact_name.to_lowercase().contains(&needle)
                || inquiry.email.contains(&needle)
                || inquiry
                    .company
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}
