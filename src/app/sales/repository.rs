//! 销售单据存储

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{CleanFilter, CleanRecord, SkippedRow};
use crate::core::{CoreError, CoreResult, Page};
use crate::infrastructure::memory::MemoryTable;

#[async_trait]
pub trait CleanRecordRepository: Send + Sync {
    /// 同类型同编号的单据已存在时返回 Conflict
    async fn insert(&self, record: &CleanRecord) -> CoreResult<()>;
    /// 批量写入，`(行号, 单据)`；重复单据跳过并返回，其他错误时整批不写入
    async fn insert_batch(&self, records: &[(usize, CleanRecord)]) -> CoreResult<Vec<SkippedRow>>;
    async fn list(&self, filter: &CleanFilter, page: Page) -> CoreResult<(Vec<CleanRecord>, u64)>;
    /// 不分页，用于汇总
    async fn list_all(&self, filter: &CleanFilter) -> CoreResult<Vec<CleanRecord>>;
    async fn delete(&self, id: Uuid) -> CoreResult<bool>;
}

fn duplicate_reason(record: &CleanRecord) -> String {
    format!("单据 {} 已存在", record.doc_number)
}

fn duplicate(record: &CleanRecord) -> CoreError {
    CoreError::Conflict(duplicate_reason(record))
}

#[derive(Default)]
pub struct MemoryCleanRecordRepository {
    table: MemoryTable<CleanRecord>,
}

#[async_trait]
impl CleanRecordRepository for MemoryCleanRecordRepository {
    async fn insert(&self, record: &CleanRecord) -> CoreResult<()> {
        if self
            .table
            .insert_unique(record.id, record.clone(), |existing| {
                existing.doc_type == record.doc_type && existing.doc_number == record.doc_number
            })
            .await
        {
            Ok(())
        } else {
            Err(duplicate(record))
        }
    }

    async fn insert_batch(&self, records: &[(usize, CleanRecord)]) -> CoreResult<Vec<SkippedRow>> {
        let mut skipped = Vec::new();
        for (index, record) in records {
            match self.insert(record).await {
                Ok(()) => {}
                Err(CoreError::Conflict(reason)) => skipped.push(SkippedRow {
                    index: *index,
                    reason,
                }),
                Err(other) => return Err(other),
            }
        }
        Ok(skipped)
    }

    async fn list(&self, filter: &CleanFilter, page: Page) -> CoreResult<(Vec<CleanRecord>, u64)> {
        let records = self.list_all(filter).await?;
        Ok((page.slice(&records), records.len() as u64))
    }

    async fn list_all(&self, filter: &CleanFilter) -> CoreResult<Vec<CleanRecord>> {
        let mut records = self.table.filter(|record| filter.matches(record)).await;
        records.sort_by(|a, b| {
            b.doc_date
                .cmp(&a.doc_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.doc_number.cmp(&b.doc_number))
        });
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.table.remove(id).await)
    }
}

#[cfg(feature = "database")]
pub use pg::PgCleanRecordRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use crate::utils::{like_pattern, LIKE_ESCAPE};
    use sqlx::{PgPool, Postgres, QueryBuilder};

    const COLUMNS: &str = "id, doc_type, doc_number, doc_date, customer_name, customer_code, \
                           salesperson, amount, tax, total, created_at";

    pub struct PgCleanRecordRepository {
        pool: PgPool,
    }

    impl PgCleanRecordRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CleanFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(doc_type) = filter.doc_type {
            builder.push(" AND doc_type = ").push_bind(doc_type);
        }
        if let Some(from) = filter.from {
            builder.push(" AND doc_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND doc_date <= ").push_bind(to);
        }
        if let Some(customer) = &filter.customer {
            let pattern = like_pattern(customer);
            builder
                .push(" AND (customer_name ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR customer_code ILIKE ")
                .push_bind(pattern)
                .push(LIKE_ESCAPE)
                .push(")");
        }
    }

    const ORDER: &str = " ORDER BY doc_date DESC, created_at DESC, doc_number";

    #[async_trait]
    impl CleanRecordRepository for PgCleanRecordRepository {
        async fn insert(&self, record: &CleanRecord) -> CoreResult<()> {
            sqlx::query(
                "INSERT INTO clean_records (id, doc_type, doc_number, doc_date, customer_name, \
                 customer_code, salesperson, amount, tax, total, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(record.id)
            .bind(record.doc_type)
            .bind(&record.doc_number)
            .bind(record.doc_date)
            .bind(&record.customer_name)
            .bind(&record.customer_code)
            .bind(&record.salesperson)
            .bind(record.amount)
            .bind(record.tax)
            .bind(record.total)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match CoreError::from(e) {
                CoreError::Conflict(_) => duplicate(record),
                other => other,
            })?;
            Ok(())
        }

        async fn insert_batch(
            &self,
            records: &[(usize, CleanRecord)],
        ) -> CoreResult<Vec<SkippedRow>> {
            let mut tx = self.pool.begin().await?;
            let mut skipped = Vec::new();
            for (index, record) in records {
                let result = sqlx::query(
                    "INSERT INTO clean_records (id, doc_type, doc_number, doc_date, \
                     customer_name, customer_code, salesperson, amount, tax, total, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                     ON CONFLICT (doc_type, doc_number) DO NOTHING",
                )
                .bind(record.id)
                .bind(record.doc_type)
                .bind(&record.doc_number)
                .bind(record.doc_date)
                .bind(&record.customer_name)
                .bind(&record.customer_code)
                .bind(&record.salesperson)
                .bind(record.amount)
                .bind(record.tax)
                .bind(record.total)
                .bind(record.created_at)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() == 0 {
                    skipped.push(SkippedRow {
                        index: *index,
                        reason: duplicate_reason(record),
                    });
                }
            }
            tx.commit().await?;
            Ok(skipped)
        }

        async fn list(
            &self,
            filter: &CleanFilter,
            page: Page,
        ) -> CoreResult<(Vec<CleanRecord>, u64)> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM clean_records", COLUMNS));
            push_filters(&mut builder, filter);
            builder
                .push(ORDER)
                .push(" LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
            let records = builder
                .build_query_as::<CleanRecord>()
                .fetch_all(&self.pool)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM clean_records");
            push_filters(&mut count, filter);
            let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

            Ok((records, total as u64))
        }

        async fn list_all(&self, filter: &CleanFilter) -> CoreResult<Vec<CleanRecord>> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM clean_records", COLUMNS));
            push_filters(&mut builder, filter);
            builder.push(ORDER);
            let records = builder
                .build_query_as::<CleanRecord>()
                .fetch_all(&self.pool)
                .await?;
            Ok(records)
        }

        async fn delete(&self, id: Uuid) -> CoreResult<bool> {
            let result = sqlx::query("DELETE FROM clean_records WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}
