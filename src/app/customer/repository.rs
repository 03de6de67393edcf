//! 客户存储

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{customer_matches, Customer};
use crate::core::{CoreError, CoreResult, Page};
use crate::infrastructure::memory::MemoryTable;

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn create(&self, customer: &Customer) -> CoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Customer>>;
    async fn list(&self, search: Option<&str>, page: Page) -> CoreResult<(Vec<Customer>, u64)>;
    async fn update(&self, customer: &Customer) -> CoreResult<()>;
    async fn delete(&self, id: Uuid) -> CoreResult<bool>;
}

fn code_taken(code: &str) -> CoreError {
    CoreError::Conflict(format!("客户编码 {} 已存在", code))
}

#[derive(Default)]
pub struct MemoryCustomerRepository {
    table: MemoryTable<Customer>,
}

#[async_trait]
impl CustomerRepository for MemoryCustomerRepository {
    async fn create(&self, customer: &Customer) -> CoreResult<()> {
        let code = customer.code.clone();
        if self
            .table
            .insert_unique(customer.id, customer.clone(), |existing| existing.code == code)
            .await
        {
            Ok(())
        } else {
            Err(code_taken(&customer.code))
        }
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Customer>> {
        Ok(self.table.get(id).await)
    }

    async fn list(&self, search: Option<&str>, page: Page) -> CoreResult<(Vec<Customer>, u64)> {
        let mut customers = self
            .table
            .filter(|customer| customer_matches(customer, search))
            .await;
        customers.sort_by(|a, b| a.code.cmp(&b.code));
        Ok((page.slice(&customers), customers.len() as u64))
    }

    async fn update(&self, customer: &Customer) -> CoreResult<()> {
        if self.table.get(customer.id).await.is_none() {
            return Err(CoreError::not_found("客户不存在"));
        }
        let code = customer.code.clone();
        if self
            .table
            .replace_unique(customer.id, customer.clone(), |_, existing| {
                existing.code == code
            })
            .await
        {
            Ok(())
        } else {
            Err(code_taken(&customer.code))
        }
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.table.remove(id).await)
    }
}

#[cfg(feature = "database")]
pub use pg::PgCustomerRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use crate::utils::{like_pattern, LIKE_ESCAPE};
    use sqlx::{PgPool, Postgres, QueryBuilder};

    const COLUMNS: &str =
        "id, code, name, contact_person, email, phone, address, created_at, updated_at";

    pub struct PgCustomerRepository {
        pool: PgPool,
    }

    impl PgCustomerRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
        if let Some(search) = search {
            let pattern = like_pattern(search);
            builder
                .push(" WHERE code ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR name ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR contact_person ILIKE ")
                .push_bind(pattern)
                .push(LIKE_ESCAPE);
        }
    }

    fn map_unique(err: sqlx::Error, code: &str) -> CoreError {
        match CoreError::from(err) {
            CoreError::Conflict(_) => code_taken(code),
            other => other,
        }
    }

    #[async_trait]
    impl CustomerRepository for PgCustomerRepository {
        async fn create(&self, customer: &Customer) -> CoreResult<()> {
            sqlx::query(
                "INSERT INTO customers (id, code, name, contact_person, email, phone, address, \
                 created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(customer.id)
            .bind(&customer.code)
            .bind(&customer.name)
            .bind(&customer.contact_person)
            .bind(&customer.email)
            .bind(&customer.phone)
            .bind(&customer.address)
            .bind(customer.created_at)
            .bind(customer.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, &customer.code))?;
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Customer>> {
            let customer = sqlx::query_as::<_, Customer>(&format!(
                "SELECT {} FROM customers WHERE id = $1",
                COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(customer)
        }

        async fn list(
            &self,
            search: Option<&str>,
            page: Page,
        ) -> CoreResult<(Vec<Customer>, u64)> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM customers", COLUMNS));
            push_filters(&mut builder, search);
            builder
                .push(" ORDER BY code LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
            let customers = builder
                .build_query_as::<Customer>()
                .fetch_all(&self.pool)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM customers");
            push_filters(&mut count, search);
            let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

            Ok((customers, total as u64))
        }

        async fn update(&self, customer: &Customer) -> CoreResult<()> {
            let result = sqlx::query(
                "UPDATE customers SET code = $2, name = $3, contact_person = $4, email = $5, \
                 phone = $6, address = $7, updated_at = $8 WHERE id = $1",
            )
            .bind(customer.id)
            .bind(&customer.code)
            .bind(&customer.name)
            .bind(&customer.contact_person)
            .bind(&customer.email)
            .bind(&customer.phone)
            .bind(&customer.address)
            .bind(customer.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, &customer.code))?;

            if result.rows_affected() == 0 {
                return Err(CoreError::not_found("客户不存在"));
            }
            Ok(())
        }

        async fn delete(&self, id: Uuid) -> CoreResult<bool> {
            let result = sqlx::query("DELETE FROM customers WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}
