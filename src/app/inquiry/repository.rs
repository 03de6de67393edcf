//! 询价单存储

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{Inquiry, InquiryFilter, InquiryStatus};
use crate::core::{CoreError, CoreResult, Page};
use crate::infrastructure::memory::MemoryTable;

#[async_trait]
pub trait InquiryRepository: Send + Sync {
    async fn create(&self, inquiry: &Inquiry) -> CoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Inquiry>>;
    async fn list(&self, filter: &InquiryFilter, page: Page) -> CoreResult<(Vec<Inquiry>, u64)>;
    /// 仅当当前状态仍为 `expected` 时写入新状态和备注；状态已被改动时返回 false
    async fn update_status(&self, inquiry: &Inquiry, expected: InquiryStatus) -> CoreResult<bool>;
}

#[derive(Default)]
pub struct MemoryInquiryRepository {
    table: MemoryTable<Inquiry>,
}

#[async_trait]
impl InquiryRepository for MemoryInquiryRepository {
    async fn create(&self, inquiry: &Inquiry) -> CoreResult<()> {
        let reference = inquiry.reference.clone();
        if self
            .table
            .insert_unique(inquiry.id, inquiry.clone(), |existing| {
                existing.reference == reference
            })
            .await
        {
            Ok(())
        } else {
            Err(CoreError::Conflict("询价编号重复".to_string()))
        }
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Inquiry>> {
        Ok(self.table.get(id).await)
    }

    async fn list(&self, filter: &InquiryFilter, page: Page) -> CoreResult<(Vec<Inquiry>, u64)> {
        let mut inquiries = self.table.filter(|inquiry| filter.matches(inquiry)).await;
        inquiries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page.slice(&inquiries), inquiries.len() as u64))
    }

    async fn update_status(&self, inquiry: &Inquiry, expected: InquiryStatus) -> CoreResult<bool> {
        self.table
            .update_with(inquiry.id, |row| {
                if row.status != expected {
                    return false;
                }
                row.status = inquiry.status;
                row.admin_note = inquiry.admin_note.clone();
                row.updated_at = inquiry.updated_at;
                true
            })
            .await
            .ok_or_else(|| CoreError::not_found("询价单不存在"))
    }
}

#[cfg(feature = "database")]
pub use pg::PgInquiryRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use crate::utils::{like_pattern, LIKE_ESCAPE};
    use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};

    const COLUMNS: &str = "id, reference, user_id, contact_name, email, company, phone, message, \
                           items, status, admin_note, created_at, updated_at";

    pub struct PgInquiryRepository {
        pool: PgPool,
    }

    impl PgInquiryRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &InquiryFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            builder
                .push(" AND (reference ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR contact_name ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR email ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR company ILIKE ")
                .push_bind(pattern)
                .push(LIKE_ESCAPE)
                .push(")");
        }
    }

    #[async_trait]
    impl InquiryRepository for PgInquiryRepository {
        async fn create(&self, inquiry: &Inquiry) -> CoreResult<()> {
            sqlx::query(
                "INSERT INTO inquiries (id, reference, user_id, contact_name, email, company, \
                 phone, message, items, status, admin_note, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(inquiry.id)
            .bind(&inquiry.reference)
            .bind(inquiry.user_id)
            .bind(&inquiry.contact_name)
            .bind(&inquiry.email)
            .bind(&inquiry.company)
            .bind(&inquiry.phone)
            .bind(&inquiry.message)
            .bind(Json(&inquiry.items))
            .bind(inquiry.status)
            .bind(&inquiry.admin_note)
            .bind(inquiry.created_at)
            .bind(inquiry.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Inquiry>> {
            let inquiry = sqlx::query_as::<_, Inquiry>(&format!(
                "SELECT {} FROM inquiries WHERE id = $1",
                COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(inquiry)
        }

        async fn list(
            &self,
            filter: &InquiryFilter,
            page: Page,
        ) -> CoreResult<(Vec<Inquiry>, u64)> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM inquiries", COLUMNS));
            push_filters(&mut builder, filter);
            builder
                .push(" ORDER BY created_at DESC LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
            let inquiries = builder
                .build_query_as::<Inquiry>()
                .fetch_all(&self.pool)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM inquiries");
            push_filters(&mut count, filter);
            let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

            Ok((inquiries, total as u64))
        }

        async fn update_status(
            &self,
            inquiry: &Inquiry,
            expected: InquiryStatus,
        ) -> CoreResult<bool> {
            let result = sqlx::query(
                "UPDATE inquiries SET status = $2, admin_note = $3, updated_at = $4 \
                 WHERE id = $1 AND status = $5",
            )
            .bind(inquiry.id)
            .bind(inquiry.status)
            .bind(&inquiry.admin_note)
            .bind(inquiry.updated_at)
            .bind(expected)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn inquiry(status: InquiryStatus) -> Inquiry {
        let now = Utc::now();
        Inquiry {
            id: Uuid::new_v4(),
            reference: format!("INQ-TEST-{}", Uuid::new_v4().simple()),
            user_id: None,
            contact_name: "Dr. Chen".to_string(),
            email: "chen@lab.example".to_string(),
            company: None,
            phone: None,
            message: None,
            items: Vec::new(),
            status,
            admin_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_status_update_requires_expected_status() {
        let repo = MemoryInquiryRepository::default();
        let stored = inquiry(InquiryStatus::Pending);
        repo.create(&stored).await.unwrap();

        // 管理员先报价
        let mut quoted = stored.clone();
        quoted.status = InquiryStatus::Quoted;
        quoted.admin_note = Some("USD 80".to_string());
        assert!(repo.update_status(&quoted, InquiryStatus::Pending).await.unwrap());

        // 基于旧状态的撤回不再生效
        let mut cancelled = stored.clone();
        cancelled.status = InquiryStatus::Cancelled;
        assert!(!repo.update_status(&cancelled, InquiryStatus::Pending).await.unwrap());

        let current = repo.find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(current.status, InquiryStatus::Quoted);
        assert_eq!(current.admin_note.as_deref(), Some("USD 80"));

        let missing = inquiry(InquiryStatus::Pending);
        assert!(matches!(
            repo.update_status(&missing, InquiryStatus::Pending).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
