//! 产品存储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{Product, ProductFilter};
use crate::core::{CoreError, CoreResult, Page};
use crate::infrastructure::memory::MemoryTable;

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// SKU 重复时返回 Conflict
    async fn create(&self, product: &Product) -> CoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Product>>;
    async fn list(&self, filter: &ProductFilter, page: Page) -> CoreResult<(Vec<Product>, u64)>;
    async fn categories(&self) -> CoreResult<Vec<String>>;
    /// 更新除库存以外的字段，返回存储中的最新行；库存只能通过 `adjust_stock` 修改
    async fn update(&self, product: &Product) -> CoreResult<Product>;
    /// 原子地调整库存，结果为负时返回 BadRequest
    async fn adjust_stock(&self, id: Uuid, delta: i32, at: DateTime<Utc>) -> CoreResult<Product>;
    async fn delete(&self, id: Uuid) -> CoreResult<bool>;
}

fn sku_taken(sku: &str) -> CoreError {
    CoreError::Conflict(format!("SKU {} 已存在", sku))
}

fn insufficient_stock() -> CoreError {
    CoreError::BadRequest("库存不足，调整后库存不能为负".to_string())
}

#[derive(Default)]
pub struct MemoryProductRepository {
    table: MemoryTable<Product>,
}

#[async_trait]
impl ProductRepository for MemoryProductRepository {
    async fn create(&self, product: &Product) -> CoreResult<()> {
        let sku = product.sku.clone();
        if self
            .table
            .insert_unique(product.id, product.clone(), |existing| existing.sku == sku)
            .await
        {
            Ok(())
        } else {
            Err(sku_taken(&product.sku))
        }
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Product>> {
        Ok(self.table.get(id).await)
    }

    async fn list(&self, filter: &ProductFilter, page: Page) -> CoreResult<(Vec<Product>, u64)> {
        let mut products = self.table.filter(|product| filter.matches(product)).await;
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.sku.cmp(&b.sku)));
        Ok((page.slice(&products), products.len() as u64))
    }

    async fn categories(&self) -> CoreResult<Vec<String>> {
        let mut categories: Vec<String> = self
            .table
            .filter(|product| product.active)
            .await
            .into_iter()
            .map(|product| product.category)
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn update(&self, product: &Product) -> CoreResult<Product> {
        let sku = product.sku.clone();
        let mut stored = None;
        let outcome = self
            .table
            .modify_unique(
                product.id,
                |existing| existing.sku == sku,
                |row| {
                    let stock = row.stock;
                    *row = product.clone();
                    row.stock = stock;
                    stored = Some(row.clone());
                },
            )
            .await;
        match outcome {
            None => Err(CoreError::not_found("产品不存在")),
            Some(false) => Err(sku_taken(&product.sku)),
            Some(true) => stored.ok_or_else(|| CoreError::not_found("产品不存在")),
        }
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32, at: DateTime<Utc>) -> CoreResult<Product> {
        self.table
            .update_with(id, |product| -> CoreResult<Product> {
                let stock = product
                    .stock
                    .checked_add(delta)
                    .filter(|stock| *stock >= 0)
                    .ok_or_else(insufficient_stock)?;
                product.stock = stock;
                product.updated_at = at;
                Ok(product.clone())
            })
            .await
            .unwrap_or_else(|| Err(CoreError::not_found("产品不存在")))
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.table.remove(id).await)
    }
}

#[cfg(feature = "database")]
pub use pg::PgProductRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use crate::utils::{like_pattern, LIKE_ESCAPE};
    use sqlx::{PgPool, Postgres, QueryBuilder};

    const COLUMNS: &str = "id, sku, name, cas_number, category, description, purity, grade, \
                           package_size, unit, price, stock, low_stock_threshold, active, \
                           created_at, updated_at";

    pub struct PgProductRepository {
        pool: PgPool,
    }

    impl PgProductRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
        builder.push(" WHERE 1 = 1");
        if !filter.include_inactive {
            builder.push(" AND active");
        }
        if filter.low_stock_only {
            builder.push(" AND stock <= low_stock_threshold");
        }
        if let Some(category) = &filter.category {
            builder
                .push(" AND LOWER(category) = LOWER(")
                .push_bind(category.clone())
                .push(")");
        }
        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR sku ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR cas_number LIKE ")
                .push_bind(pattern)
                .push(LIKE_ESCAPE)
                .push(")");
        }
    }

    fn map_unique(err: sqlx::Error, sku: &str) -> CoreError {
        match CoreError::from(err) {
            CoreError::Conflict(_) => sku_taken(sku),
            other => other,
        }
    }

    #[async_trait]
    impl ProductRepository for PgProductRepository {
        async fn create(&self, product: &Product) -> CoreResult<()> {
            sqlx::query(
                "INSERT INTO products (id, sku, name, cas_number, category, description, purity, \
                 grade, package_size, unit, price, stock, low_stock_threshold, active, \
                 created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            )
            .bind(product.id)
            .bind(&product.sku)
            .bind(&product.name)
            .bind(&product.cas_number)
            .bind(&product.category)
            .bind(&product.description)
            .bind(&product.purity)
            .bind(&product.grade)
            .bind(&product.package_size)
            .bind(&product.unit)
            .bind(product.price)
            .bind(product.stock)
            .bind(product.low_stock_threshold)
            .bind(product.active)
            .bind(product.created_at)
            .bind(product.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, &product.sku))?;
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Product>> {
            let product = sqlx::query_as::<_, Product>(&format!(
                "SELECT {} FROM products WHERE id = $1",
                COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(product)
        }

        async fn list(
            &self,
            filter: &ProductFilter,
            page: Page,
        ) -> CoreResult<(Vec<Product>, u64)> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM products", COLUMNS));
            push_filters(&mut builder, filter);
            builder
                .push(" ORDER BY name, sku LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
            let products = builder
                .build_query_as::<Product>()
                .fetch_all(&self.pool)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
            push_filters(&mut count, filter);
            let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

            Ok((products, total as u64))
        }

        async fn categories(&self) -> CoreResult<Vec<String>> {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT DISTINCT category FROM products WHERE active ORDER BY category",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|(category,)| category).collect())
        }

        async fn update(&self, product: &Product) -> CoreResult<Product> {
            let updated = sqlx::query_as::<_, Product>(&format!(
                "UPDATE products SET sku = $2, name = $3, cas_number = $4, category = $5, \
                 description = $6, purity = $7, grade = $8, package_size = $9, unit = $10, \
                 price = $11, low_stock_threshold = $12, active = $13, updated_at = $14 \
                 WHERE id = $1 RETURNING {}",
                COLUMNS
            ))
            .bind(product.id)
            .bind(&product.sku)
            .bind(&product.name)
            .bind(&product.cas_number)
            .bind(&product.category)
            .bind(&product.description)
            .bind(&product.purity)
            .bind(&product.grade)
            .bind(&product.package_size)
            .bind(&product.unit)
            .bind(product.price)
            .bind(product.low_stock_threshold)
            .bind(product.active)
            .bind(product.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique(e, &product.sku))?;

            updated.ok_or_else(|| CoreError::not_found("产品不存在"))
        }

        async fn adjust_stock(
            &self,
            id: Uuid,
            delta: i32,
            at: DateTime<Utc>,
        ) -> CoreResult<Product> {
            let updated = sqlx::query_as::<_, Product>(&format!(
                "UPDATE products SET stock = stock + $2, updated_at = $3 \
                 WHERE id = $1 AND stock + $2 >= 0 RETURNING {}",
                COLUMNS
            ))
            .bind(id)
            .bind(delta)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

            match updated {
                Some(product) => Ok(product),
                None => match self.find_by_id(id).await? {
                    Some(_) => Err(insufficient_stock()),
                    None => Err(CoreError::not_found("产品不存在")),
                },
            }
        }

        async fn delete(&self, id: Uuid) -> CoreResult<bool> {
            let result = sqlx::query("DELETE FROM products WHERE id = $1")
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

    fn product(sku: &str, stock: i32) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            sku: sku.to_string(),
            name: "Acetone".to_string(),
            cas_number: Some("67-64-1".to_string()),
            category: "Solvents".to_string(),
            description: String::new(),
            purity: None,
            grade: None,
            package_size: None,
            unit: "bottle".to_string(),
            price: None,
            stock,
            low_stock_threshold: 2,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_update_keeps_stock_adjusted_meanwhile() {
        let repo = MemoryProductRepository::default();
        let stored = product("ACE-1", 10);
        repo.create(&stored).await.unwrap();

        // 编辑基于库存 10 的旧快照，期间库存被调整
        let mut edited = stored.clone();
        edited.name = "Acetone HPLC".to_string();
        repo.adjust_stock(stored.id, -4, Utc::now()).await.unwrap();

        let updated = repo.update(&edited).await.unwrap();
        assert_eq!(updated.name, "Acetone HPLC");
        assert_eq!(updated.stock, 6);
        assert_eq!(repo.find_by_id(stored.id).await.unwrap().unwrap().stock, 6);
    }

    #[tokio::test]
    async fn test_update_rejects_taken_sku() {
        let repo = MemoryProductRepository::default();
        let first = product("ACE-1", 1);
        let second = product("ACE-2", 1);
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        let mut renamed = second.clone();
        renamed.sku = "ACE-1".to_string();
        assert!(matches!(repo.update(&renamed).await, Err(CoreError::Conflict(_))));
        assert!(matches!(
            repo.update(&product("ACE-3", 1)).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
