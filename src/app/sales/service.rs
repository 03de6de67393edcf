//! 销售单据服务

use mockable::Clock;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::model::*;
use super::repository::CleanRecordRepository;
use crate::core::{CoreError, CoreResult, Paginated};
use crate::utils::clean_optional;

#[derive(Clone)]
pub struct SalesService {
    records: Arc<dyn CleanRecordRepository>,
    clock: Arc<dyn Clock>,
}

fn check_range(from: Option<chrono::NaiveDate>, to: Option<chrono::NaiveDate>) -> CoreResult<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(CoreError::BadRequest(
            "开始日期不能晚于结束日期".to_string(),
        )),
        _ => Ok(()),
    }
}

impl SalesService {
    pub fn new(records: Arc<dyn CleanRecordRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { records, clock }
    }

    pub async fn list(&self, query: CleanQuery) -> CoreResult<Paginated<CleanRecord>> {
        check_range(query.from, query.to)?;
        let page = query.page().normalize();
        let filter = CleanFilter {
            doc_type: query.doc_type,
            customer: clean_optional(query.customer),
            from: query.from,
            to: query.to,
        };
        let (records, total) = self.records.list(&filter, page).await?;
        Ok(Paginated::new(records, page, total))
    }

    pub async fn create(&self, raw: RawSalesRecord) -> CoreResult<CleanRecord> {
        let record = normalize_record(&raw, Uuid::new_v4(), self.clock.utc())?;
        self.records.insert(&record).await?;
        info!(
            "录入单据: {:?} {} 合计 {:.2}",
            record.doc_type, record.doc_number, record.total
        );
        Ok(record)
    }

    /// 批量导入；无法清洗或重复的行跳过并记录原因，其他错误时整批不导入
    pub async fn import(&self, req: ImportRequest) -> CoreResult<ImportResult> {
        req.validate()?;
        let now = self.clock.utc();
        let mut skipped = Vec::new();
        let mut cleaned = Vec::with_capacity(req.records.len());

        for (index, raw) in req.records.iter().enumerate() {
            match normalize_record(raw, Uuid::new_v4(), now) {
                Ok(record) => cleaned.push((index, record)),
                Err(CoreError::Validation(reason) | CoreError::BadRequest(reason)) => {
                    skipped.push(SkippedRow { index, reason })
                }
                Err(other) => return Err(other),
            }
        }

        let duplicates = self.records.insert_batch(&cleaned).await?;
        let imported = cleaned.len() - duplicates.len();
        skipped.extend(duplicates);
        skipped.sort_by_key(|row| row.index);
        let result = ImportResult { imported, skipped };

        if !result.skipped.is_empty() {
            warn!("导入时跳过 {} 条单据", result.skipped.len());
        }
        info!(
            "单据导入完成: 成功 {} 条, 跳过 {} 条",
            result.imported,
            result.skipped.len()
        );
        Ok(result)
    }

    pub async fn summary(&self, query: SummaryQuery) -> CoreResult<SalesSummary> {
        check_range(query.from, query.to)?;
        let filter = CleanFilter {
            from: query.from,
            to: query.to,
            ..Default::default()
        };
        let records = self.records.list_all(&filter).await?;
        Ok(SalesSummary::build(&records, query.from, query.to))
    }

    pub async fn delete(&self, id: Uuid) -> CoreResult<()> {
        if !self.records.delete(id).await? {
            return Err(CoreError::not_found("单据不存在"));
        }
        info!("删除单据: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::sales::repository::MemoryCleanRecordRepository;
    use chrono::NaiveDate;
    use mockable::DefaultClock;

    fn service() -> SalesService {
        SalesService::new(
            Arc::new(MemoryCleanRecordRepository::default()),
            Arc::new(DefaultClock),
        )
    }

    fn raw(doc_type: &str, number: &str, date: &str, amount: f64) -> RawSalesRecord {
        RawSalesRecord {
            doc_type: doc_type.to_string(),
            doc_number: number.to_string(),
            doc_date: date.to_string(),
            customer_name: "Acme Labs".to_string(),
            customer_code: None,
            salesperson: None,
            amount,
            tax: None,
            total: None,
        }
    }

    #[tokio::test]
    async fn test_import_skips_bad_and_duplicate_rows() {
        let service = service();
        let result = service
            .import(ImportRequest {
                records: vec![
                    raw("INV", "i-1", "2026-01-05", 10.0),
                    raw("inv", "I-1", "2026-01-06", 12.0),
                    raw("bogus", "x-1", "2026-01-06", 1.0),
                    raw("qt", "I-1", "06/01/2026", 99.0),
                ],
            })
            .await
            .unwrap();

        assert_eq!(result.imported, 2);
        let skipped: Vec<usize> = result.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![1, 2]);
        assert_eq!(result.skipped[0].reason, "单据 I-1 已存在");
    }

    #[tokio::test]
    async fn test_create_conflict_and_list_filters() {
        let service = service();
        service.create(raw("cs", "C-1", "2026-02-01", 5.0)).await.unwrap();
        service.create(raw("inv", "I-9", "2026-03-01", 7.0)).await.unwrap();
        let err = service
            .create(raw("cash sale", "c-1", "2026-02-02", 5.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let page = service
            .list(CleanQuery {
                from: NaiveDate::from_ymd_opt(2026, 2, 15),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.items[0].doc_number, "I-9");

        let err = service
            .list(CleanQuery {
                from: NaiveDate::from_ymd_opt(2026, 3, 1),
                to: NaiveDate::from_ymd_opt(2026, 2, 1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_summary_and_delete() {
        let service = service();
        let first = service.create(raw("inv", "I-1", "2026-01-05", 100.0)).await.unwrap();
        service.create(raw("cs", "C-1", "2026-01-06", 20.0)).await.unwrap();
        service.create(raw("qt", "Q-1", "2026-01-07", 500.0)).await.unwrap();

        let summary = service.summary(SummaryQuery::default()).await.unwrap();
        assert_eq!(summary.revenue, 120.0);
        assert_eq!(summary.quotation.total, 500.0);

        service.delete(first.id).await.unwrap();
        let summary = service.summary(SummaryQuery::default()).await.unwrap();
        assert_eq!(summary.revenue, 20.0);
        assert!(service.delete(first.id).await.is_err());
    }
}
