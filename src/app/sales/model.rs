//! 销售单据清洗模型
//!
//! 外部导入的发票、现金销售单和报价单格式不统一，
//! 入库前统一单据类型、日期格式、客户名称和金额。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::core::{CoreError, CoreResult, PageQuery};
use crate::utils::{clean_optional, collapse_whitespace, round2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Invoice,
    CashSale,
    Quotation,
}

impl DocType {
    /// 识别单据类型别名，忽略大小写和标点
    pub fn parse_alias(raw: &str) -> Option<DocType> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "invoice" | "inv" | "si" | "taxinvoice" => Some(DocType::Invoice),
            "cashsale" | "cash" | "cs" => Some(DocType::CashSale),
            "quotation" | "quote" | "qt" | "qo" => Some(DocType::Quotation),
            _ => None,
        }
    }

    /// 计入营收的单据类型
    pub fn is_revenue(self) -> bool {
        matches!(self, DocType::Invoice | DocType::CashSale)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct CleanRecord {
    pub id: Uuid,
    pub doc_type: DocType,
    pub doc_number: String,
    pub doc_date: NaiveDate,
    pub customer_name: String,
    pub customer_code: Option<String>,
    pub salesperson: Option<String>,
    pub amount: f64,
    pub tax: f64,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

/// 未清洗的单据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSalesRecord {
    pub doc_type: String,
    pub doc_number: String,
    pub doc_date: String,
    pub customer_name: String,
    pub customer_code: Option<String>,
    pub salesperson: Option<String>,
    pub amount: f64,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

/// 合计允许相差的分数
const TOTAL_TOLERANCE_CENTS: f64 = 1.0;

pub fn parse_doc_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// 清洗一条单据
pub fn normalize_record(
    raw: &RawSalesRecord,
    id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<CleanRecord> {
    let doc_type = DocType::parse_alias(&raw.doc_type)
        .ok_or_else(|| CoreError::Validation(format!("无法识别的单据类型: {}", raw.doc_type)))?;

    let doc_number = raw.doc_number.trim().to_uppercase();
    if doc_number.is_empty() {
        return Err(CoreError::Validation("单据编号不能为空".to_string()));
    }

    let doc_date = parse_doc_date(&raw.doc_date)
        .ok_or_else(|| CoreError::Validation(format!("无法解析的日期: {}", raw.doc_date)))?;

    let customer_name = collapse_whitespace(&raw.customer_name);
    if customer_name.is_empty() {
        return Err(CoreError::Validation("客户名称不能为空".to_string()));
    }

    let tax = raw.tax.unwrap_or(0.0);
    if !raw.amount.is_finite() || !tax.is_finite() {
        return Err(CoreError::Validation("金额必须是有效数字".to_string()));
    }
    if raw.amount < 0.0 || tax < 0.0 {
        return Err(CoreError::Validation("金额和税额不能为负".to_string()));
    }
    let amount = round2(raw.amount);
    let tax = round2(tax);
    let expected = round2(amount + tax);
    let total = match raw.total {
        Some(total) if ((total - expected) * 100.0).round().abs() > TOTAL_TOLERANCE_CENTS => {
            return Err(CoreError::Validation(format!(
                "合计 {:.2} 与金额加税额 {:.2} 不一致",
                total, expected
            )));
        }
        _ => expected,
    };

    Ok(CleanRecord {
        id,
        doc_type,
        doc_number,
        doc_date,
        customer_name,
        customer_code: clean_optional(raw.customer_code.clone()).map(|c| c.to_uppercase()),
        salesperson: clean_optional(raw.salesperson.clone()),
        amount,
        tax,
        total,
        created_at: now,
    })
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportRequest {
    #[validate(length(min = 1, max = 5000, message = "每次导入 1 到 5000 条记录"))]
    pub records: Vec<RawSalesRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanQuery {
    pub doc_type: Option<DocType>,
    pub customer: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl CleanQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanFilter {
    pub doc_type: Option<DocType>,
    pub customer: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl CleanFilter {
    pub fn matches(&self, record: &CleanRecord) -> bool {
        if self.doc_type.is_some_and(|t| t != record.doc_type) {
            return false;
        }
        if self.from.is_some_and(|from| record.doc_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.doc_date > to) {
            return false;
        }
        if let Some(customer) = &self.customer {
            let needle = customer.to_lowercase();
            let hit = record.customer_name.to_lowercase().contains(&needle)
                || record
                    .customer_code
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTotal {
    pub count: u64,
    pub total: f64,
}

impl TypeTotal {
    fn add(&mut self, amount: f64) {
        self.count += 1;
        self.total = round2(self.total + amount);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub month: String,
    pub count: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub invoice: TypeTotal,
    pub cash_sale: TypeTotal,
    pub quotation: TypeTotal,
    pub revenue: f64,
    pub months: Vec<MonthSummary>,
}

impl SalesSummary {
    /// 汇总单据；月份按时间升序
    pub fn build(records: &[CleanRecord], from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let mut summary = SalesSummary {
            from,
            to,
            ..Default::default()
        };
        let mut months: std::collections::BTreeMap<String, MonthSummary> = Default::default();

        for record in records {
            match record.doc_type {
                DocType::Invoice => summary.invoice.add(record.total),
                DocType::CashSale => summary.cash_sale.add(record.total),
                DocType::Quotation => summary.quotation.add(record.total),
            }
            let key = record.doc_date.format("%Y-%m").to_string();
            let month = months.entry(key.clone()).or_insert_with(|| MonthSummary {
                month: key,
                count: 0,
                revenue: 0.0,
            });
            month.count += 1;
            if record.doc_type.is_revenue() {
                month.revenue = round2(month.revenue + record.total);
            }
        }

        summary.revenue = round2(summary.invoice.total + summary.cash_sale.total);
        summary.months = months.into_values().collect();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(
        doc_type: &str,
        date: &str,
        amount: f64,
        tax: Option<f64>,
        total: Option<f64>,
    ) -> RawSalesRecord {
        RawSalesRecord {
            doc_type: doc_type.to_string(),
            doc_number: " inv-001 ".to_string(),
            doc_date: date.to_string(),
            customer_name: "  Acme   Labs\tSdn Bhd ".to_string(),
            customer_code: Some(" c001 ".to_string()),
            salesperson: Some("  ".to_string()),
            amount,
            tax,
            total,
        }
    }

    #[test]
    fn test_doc_type_aliases() {
        assert_eq!(DocType::parse_alias("INV"), Some(DocType::Invoice));
        assert_eq!(DocType::parse_alias("Tax Invoice"), Some(DocType::Invoice));
        assert_eq!(DocType::parse_alias("s.i."), Some(DocType::Invoice));
        assert_eq!(DocType::parse_alias("Cash-Sale"), Some(DocType::CashSale));
        assert_eq!(DocType::parse_alias("cs"), Some(DocType::CashSale));
        assert_eq!(DocType::parse_alias("Quote"), Some(DocType::Quotation));
        assert_eq!(DocType::parse_alias("QO"), Some(DocType::Quotation));
        assert_eq!(DocType::parse_alias("credit note"), None);
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 9);
        assert_eq!(parse_doc_date("2026-03-09"), expected);
        assert_eq!(parse_doc_date("2026/03/09"), expected);
        assert_eq!(parse_doc_date("09/03/2026"), expected);
        assert_eq!(parse_doc_date(" 09-03-2026 "), expected);
        assert_eq!(parse_doc_date("March 9"), None);
    }

    #[test]
    fn test_normalize_record() {
        let record = normalize_record(
            &raw("Tax Invoice", "09/03/2026", 100.0, Some(6.0), None),
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.doc_type, DocType::Invoice);
        assert_eq!(record.doc_number, "INV-001");
        assert_eq!(record.customer_name, "Acme Labs Sdn Bhd");
        assert_eq!(record.customer_code.as_deref(), Some("C001"));
        assert_eq!(record.salesperson, None);
        assert_eq!(record.total, 106.0);

        let no_tax = normalize_record(
            &raw("cs", "2026-03-09", 50.5, None, None),
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(no_tax.tax, 0.0);
        assert_eq!(no_tax.total, 50.5);
    }

    #[test]
    fn test_total_mismatch_and_negative_rejected() {
        let check = |record: RawSalesRecord| normalize_record(&record, Uuid::new_v4(), Utc::now());
        assert!(check(raw("inv", "2026-03-09", 100.0, Some(6.0), Some(106.01))).is_ok());
        assert!(check(raw("inv", "2026-03-09", 100.0, Some(6.0), Some(107.0))).is_err());
        assert!(check(raw("inv", "2026-03-09", -1.0, None, None)).is_err());
        assert!(check(raw("memo", "2026-03-09", 1.0, None, None)).is_err());
        assert!(check(raw("inv", "yesterday", 1.0, None, None)).is_err());
    }

    #[test]
    fn test_summary_groups_by_type_and_month() {
        let now = Utc::now();
        let mut records = Vec::new();
        for (doc_type, date, amount) in [
            ("inv", "2026-01-15", 100.0),
            ("cs", "2026-01-20", 40.0),
            ("qt", "2026-01-21", 999.0),
            ("inv", "2026-02-01", 60.25),
        ] {
            records.push(
                normalize_record(&raw(doc_type, date, amount, None, None), Uuid::new_v4(), now)
                    .unwrap(),
            );
        }

        let summary = SalesSummary::build(&records, None, None);
        assert_eq!(summary.invoice, TypeTotal { count: 2, total: 160.25 });
        assert_eq!(summary.cash_sale, TypeTotal { count: 1, total: 40.0 });
        assert_eq!(summary.quotation.count, 1);
        assert_eq!(summary.revenue, 200.25);
        assert_eq!(summary.months.len(), 2);
        assert_eq!(summary.months[0].month, "2026-01");
        assert_eq!(summary.months[0].count, 3);
        assert_eq!(summary.months[0].revenue, 140.0);
        assert_eq!(summary.months[1].revenue, 60.25);
    }
}
