//! 打卡记录存储

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::model::{check_sequence, RecordType, TimeRecord, TimeRecordFilter};
use crate::core::{CoreError, CoreResult, Page};
use crate::infrastructure::memory::MemoryTable;

#[async_trait]
pub trait TimeRecordRepository: Send + Sync {
    /// 按同一员工当天已有的打卡检查顺序后写入；重复或顺序不对时返回 Conflict
    async fn insert(&self, record: &TimeRecord) -> CoreResult<()>;
    async fn list(&self, filter: &TimeRecordFilter, page: Page)
        -> CoreResult<(Vec<TimeRecord>, u64)>;
    /// 某员工某天的全部打卡，按时间升序
    async fn for_day(&self, user_id: Uuid, date: NaiveDate) -> CoreResult<Vec<TimeRecord>>;
    /// 不分页，用于统计
    async fn list_all(&self, filter: &TimeRecordFilter) -> CoreResult<Vec<TimeRecord>>;
    async fn delete(&self, id: Uuid) -> CoreResult<bool>;
}

#[derive(Default)]
pub struct MemoryTimeRecordRepository {
    table: MemoryTable<TimeRecord>,
}

#[async_trait]
impl TimeRecordRepository for MemoryTimeRecordRepository {
    async fn insert(&self, record: &TimeRecord) -> CoreResult<()> {
        self.table
            .insert_checked(record.id, record.clone(), |rows| {
                let existing: Vec<RecordType> = rows
                    .into_iter()
                    .filter(|r| r.user_id == record.user_id && r.work_date == record.work_date)
                    .map(|r| r.record_type)
                    .collect();
                check_sequence(&existing, record.record_type).map_err(CoreError::Conflict)
            })
            .await
    }

    async fn list(
        &self,
        filter: &TimeRecordFilter,
        page: Page,
    ) -> CoreResult<(Vec<TimeRecord>, u64)> {
        let mut records = self.table.filter(|record| filter.matches(record)).await;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok((page.slice(&records), records.len() as u64))
    }

    async fn for_day(&self, user_id: Uuid, date: NaiveDate) -> CoreResult<Vec<TimeRecord>> {
        let mut records = self
            .table
            .filter(|record| record.user_id == user_id && record.work_date == date)
            .await;
        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }

    async fn list_all(&self, filter: &TimeRecordFilter) -> CoreResult<Vec<TimeRecord>> {
        let mut records = self.table.filter(|record| filter.matches(record)).await;
        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.table.remove(id).await)
    }
}

#[cfg(feature = "database")]
pub use pg::PgTimeRecordRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use sqlx::{PgPool, Postgres, QueryBuilder};

    fn already_recorded(record: &TimeRecord) -> CoreError {
        CoreError::Conflict(format!("今天已经{}", record.record_type.label()))
    }

    const COLUMNS: &str = "id, user_id, employee_name, department, record_type, timestamp, \
                           work_date, scheduled_at, minutes_diff, status, note, created_at";

    pub struct PgTimeRecordRepository {
        pool: PgPool,
    }

    impl PgTimeRecordRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TimeRecordFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(department) = &filter.department {
            builder.push(" AND department = ").push_bind(department.clone());
        }
        if let Some(from) = filter.from {
            builder.push(" AND work_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND work_date <= ").push_bind(to);
        }
        if let Some(record_type) = filter.record_type {
            builder.push(" AND record_type = ").push_bind(record_type);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
    }

    #[async_trait]
    impl TimeRecordRepository for PgTimeRecordRepository {
        async fn insert(&self, record: &TimeRecord) -> CoreResult<()> {
            let mut tx = self.pool.begin().await?;
            // 锁住员工行，同一员工的打卡串行执行
            sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(record.user_id)
                .fetch_optional(&mut *tx)
                .await?;
            let existing: Vec<(RecordType,)> = sqlx::query_as(
                "SELECT record_type FROM time_records WHERE user_id = $1 AND work_date = $2",
            )
            .bind(record.user_id)
            .bind(record.work_date)
            .fetch_all(&mut *tx)
            .await?;
            let existing: Vec<RecordType> = existing.into_iter().map(|(t,)| t).collect();
            check_sequence(&existing, record.record_type).map_err(CoreError::Conflict)?;

            sqlx::query(
                "INSERT INTO time_records (id, user_id, employee_name, department, record_type, \
                 timestamp, work_date, scheduled_at, minutes_diff, status, note, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.employee_name)
            .bind(&record.department)
            .bind(record.record_type)
            .bind(record.timestamp)
            .bind(record.work_date)
            .bind(record.scheduled_at)
            .bind(record.minutes_diff)
            .bind(record.status)
            .bind(&record.note)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| match CoreError::from(e) {
                CoreError::Conflict(_) => already_recorded(record),
                other => other,
            })?;
            tx.commit().await?;
            Ok(())
        }

        async fn list(
            &self,
            filter: &TimeRecordFilter,
            page: Page,
        ) -> CoreResult<(Vec<TimeRecord>, u64)> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM time_records", COLUMNS));
            push_filters(&mut builder, filter);
            builder
                .push(" ORDER BY timestamp DESC LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
            let records = builder
                .build_query_as::<TimeRecord>()
                .fetch_all(&self.pool)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM time_records");
            push_filters(&mut count, filter);
            let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

            Ok((records, total as u64))
        }

        async fn for_day(&self, user_id: Uuid, date: NaiveDate) -> CoreResult<Vec<TimeRecord>> {
            let records = sqlx::query_as::<_, TimeRecord>(&format!(
                "SELECT {} FROM time_records WHERE user_id = $1 AND work_date = $2 \
                 ORDER BY timestamp",
                COLUMNS
            ))
            .bind(user_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
            Ok(records)
        }

        async fn list_all(&self, filter: &TimeRecordFilter) -> CoreResult<Vec<TimeRecord>> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM time_records", COLUMNS));
            push_filters(&mut builder, filter);
            builder.push(" ORDER BY timestamp");
            let records = builder
                .build_query_as::<TimeRecord>()
                .fetch_all(&self.pool)
                .await?;
            Ok(records)
        }

        async fn delete(&self, id: Uuid) -> CoreResult<bool> {
            let result = sqlx::query("DELETE FROM time_records WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::attendance::model::PunctualityStatus;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn record(user_id: Uuid, record_type: RecordType, hour: u32) -> TimeRecord {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap();
        TimeRecord {
            id: Uuid::new_v4(),
            user_id,
            employee_name: "Lab Tech".to_string(),
            department: None,
            record_type,
            timestamp: at,
            work_date: at.date_naive(),
            scheduled_at: at,
            minutes_diff: 0,
            status: PunctualityStatus::OnTime,
            note: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_insert_enforces_sequence() {
        let repo = MemoryTimeRecordRepository::default();
        let user = Uuid::new_v4();
        assert!(matches!(
            repo.insert(&record(user, RecordType::CheckOut, 18)).await,
            Err(CoreError::Conflict(_))
        ));
        repo.insert(&record(user, RecordType::CheckIn, 9)).await.unwrap();
        assert!(matches!(
            repo.insert(&record(user, RecordType::CheckIn, 10)).await,
            Err(CoreError::Conflict(_))
        ));
        // 其他员工不受影响
        repo.insert(&record(Uuid::new_v4(), RecordType::CheckIn, 9))
            .await
            .unwrap();

        let date = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap().date_naive();
        assert_eq!(repo.for_day(user, date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lunch_and_check_out_only_one_wins() {
        let repo = Arc::new(MemoryTimeRecordRepository::default());
        let user = Uuid::new_v4();
        repo.insert(&record(user, RecordType::CheckIn, 9)).await.unwrap();

        let lunch = record(user, RecordType::LunchStart, 12);
        let out = record(user, RecordType::CheckOut, 18);
        let (a, b) = tokio::join!(
            {
                let repo = repo.clone();
                async move { repo.insert(&lunch).await }
            },
            {
                let repo = repo.clone();
                async move { repo.insert(&out).await }
            }
        );
        assert_eq!(u8::from(a.is_ok()) + u8::from(b.is_ok()), 1);

        let date = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap().date_naive();
        assert_eq!(repo.for_day(user, date).await.unwrap().len(), 2);
    }
}
