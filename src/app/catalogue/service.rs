//! 产品目录业务服务

use mockable::Clock;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::model::*;
use super::repository::ProductRepository;
use crate::utils::clean_optional;
use crate::core::{CoreError, CoreResult, Paginated};

#[derive(Clone)]
pub struct CatalogueService {
    products: Arc<dyn ProductRepository>,
    clock: Arc<dyn Clock>,
}

impl CatalogueService {
    pub fn new(products: Arc<dyn ProductRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { products, clock }
    }

    /// 公开目录，仅包含上架产品
    pub async fn list_products(&self, query: ProductQuery) -> CoreResult<Paginated<Product>> {
        self.list(query, false, false).await
    }

    /// 后台列表，包含下架产品
    pub async fn list_all_products(&self, query: ProductQuery) -> CoreResult<Paginated<Product>> {
        self.list(query, true, false).await
    }

    pub async fn low_stock(&self, query: ProductQuery) -> CoreResult<Paginated<Product>> {
        self.list(query, true, true).await
    }

    async fn list(
        &self,
        query: ProductQuery,
        include_inactive: bool,
        low_stock_only: bool,
    ) -> CoreResult<Paginated<Product>> {
        let page = query.page().normalize();
        let filter = ProductFilter {
            category: clean_optional(query.category),
            search: clean_optional(query.search),
            include_inactive,
            low_stock_only,
        };
        let (products, total) = self.products.list(&filter, page).await?;
        Ok(Paginated::new(products, page, total))
    }

    pub async fn categories(&self) -> CoreResult<Vec<String>> {
        self.products.categories().await
    }

    /// 获取产品；非管理员看不到下架产品
    pub async fn get_product(&self, id: Uuid, include_inactive: bool) -> CoreResult<Product> {
        self.products
            .find_by_id(id)
            .await?
            .filter(|product| include_inactive || product.active)
            .ok_or_else(|| CoreError::not_found("产品不存在"))
    }

    pub async fn create_product(&self, req: CreateProductRequest) -> CoreResult<Product> {
        req.validate()?;
        let now = self.clock.utc();
        let product = Product {
            id: Uuid::new_v4(),
            sku: req.sku.trim().to_uppercase(),
            name: req.name.trim().to_string(),
            cas_number: clean_optional(req.cas_number),
            category: req.category.trim().to_string(),
            description: req.description.trim().to_string(),
            purity: clean_optional(req.purity),
            grade: clean_optional(req.grade),
            package_size: clean_optional(req.package_size),
            unit: req.unit.trim().to_string(),
            price: req.price,
            stock: req.stock,
            low_stock_threshold: req.low_stock_threshold,
            active: req.active,
            created_at: now,
            updated_at: now,
        };
        self.products.create(&product).await?;
        info!("创建产品: {} {}", product.sku, product.name);
        Ok(product)
    }

    pub async fn update_product(
        &self,
        id: Uuid,
        req: UpdateProductRequest,
    ) -> CoreResult<Product> {
        req.validate()?;
        let mut product = self.get_product(id, true).await?;

        if let Some(name) = req.name {
            product.name = name.trim().to_string();
        }
        if req.cas_number.is_some() {
            product.cas_number = clean_optional(req.cas_number);
        }
        if let Some(category) = req.category {
            product.category = category.trim().to_string();
        }
        if let Some(description) = req.description {
            product.description = description.trim().to_string();
        }
        if req.purity.is_some() {
            product.purity = clean_optional(req.purity);
        }
        if req.grade.is_some() {
            product.grade = clean_optional(req.grade);
        }
        if req.package_size.is_some() {
            product.package_size = clean_optional(req.package_size);
        }
        if let Some(unit) = req.unit {
            product.unit = unit.trim().to_string();
        }
        if req.clear_price {
            product.price = None;
        } else if req.price.is_some() {
            product.price = req.price;
        }
        if let Some(threshold) = req.low_stock_threshold {
            product.low_stock_threshold = threshold;
        }
        if let Some(active) = req.active {
            product.active = active;
        }
        product.updated_at = self.clock.utc();

        let product = self.products.update(&product).await?;
        info!("更新产品: {}", product.sku);
        Ok(product)
    }

    pub async fn adjust_stock(&self, id: Uuid, req: AdjustStockRequest) -> CoreResult<Product> {
        req.validate()?;
        if req.delta == 0 {
            return Err(CoreError::BadRequest("库存调整量不能为 0".to_string()));
        }
        let product = self
            .products
            .adjust_stock(id, req.delta, self.clock.utc())
            .await?;
        info!(
            "库存调整: {} {:+} -> {} ({})",
            product.sku,
            req.delta,
            product.stock,
            req.reason.as_deref().unwrap_or("-")
        );
        Ok(product)
    }

    pub async fn delete_product(&self, id: Uuid) -> CoreResult<()> {
        if !self.products.delete(id).await? {
            return Err(CoreError::not_found("产品不存在"));
        }
        info!("删除产品: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::catalogue::repository::MemoryProductRepository;
    use mockable::DefaultClock;

    fn service() -> CatalogueService {
        CatalogueService::new(
            Arc::new(MemoryProductRepository::default()),
            Arc::new(DefaultClock),
        )
    }

    fn request(sku: &str, name: &str, category: &str) -> CreateProductRequest {
        CreateProductRequest {
            sku: sku.to_string(),
            name: name.to_string(),
            cas_number: None,
            category: category.to_string(),
            description: String::new(),
            purity: Some("99.5%".to_string()),
            grade: Some("AR".to_string()),
            package_size: Some("500 mL".to_string()),
            unit: "bottle".to_string(),
            price: Some(12.5),
            stock: 10,
            low_stock_threshold: 3,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_inactive_products_hidden_from_public_listing() {
        let service = service();
        let ethanol = service
            .create_product(request("eth-500", "Ethanol", "Solvents"))
            .await
            .unwrap();
        assert_eq!(ethanol.sku, "ETH-500");
        service
            .create_product(request("ace-500", "Acetone", "Solvents"))
            .await
            .unwrap();
        service
            .update_product(
                ethanol.id,
                UpdateProductRequest {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let public = service.list_products(ProductQuery::default()).await.unwrap();
        assert_eq!(public.pagination.total, 1);
        assert_eq!(public.items[0].name, "Acetone");

        let all = service.list_all_products(ProductQuery::default()).await.unwrap();
        assert_eq!(all.pagination.total, 2);

        assert!(service.get_product(ethanol.id, false).await.is_err());
        assert!(service.get_product(ethanol.id, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_sku_conflicts() {
        let service = service();
        service
            .create_product(request("ETH-500", "Ethanol", "Solvents"))
            .await
            .unwrap();
        let err = service
            .create_product(request("eth-500", "Ethanol again", "Solvents"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_stock_adjustments_and_low_stock() {
        let service = service();
        let product = service
            .create_product(request("NACL-1K", "Sodium chloride", "Salts"))
            .await
            .unwrap();

        let product = service
            .adjust_stock(product.id, AdjustStockRequest { delta: -7, reason: None })
            .await
            .unwrap();
        assert_eq!(product.stock, 3);
        assert!(product.is_low_stock());

        let err = service
            .adjust_stock(product.id, AdjustStockRequest { delta: -4, reason: None })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));

        let low = service.low_stock(ProductQuery::default()).await.unwrap();
        assert_eq!(low.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_search_and_categories() {
        let service = service();
        service
            .create_product(request("ETH-500", "Ethanol", "Solvents"))
            .await
            .unwrap();
        service
            .create_product(request("NACL-1K", "Sodium chloride", "Salts"))
            .await
            .unwrap();

        let found = service
            .list_products(ProductQuery {
                search: Some("sodium".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.items.len(), 1);

        let by_category = service
            .list_products(ProductQuery {
                category: Some("solvents".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_category.items[0].sku, "ETH-500");

        assert_eq!(service.categories().await.unwrap(), vec!["Salts", "Solvents"]);
    }

    #[tokio::test]
    async fn test_clear_price_switches_to_inquiry() {
        let service = service();
        let product = service
            .create_product(request("ETH-500", "Ethanol", "Solvents"))
            .await
            .unwrap();
        let product = service
            .update_product(
                product.id,
                UpdateProductRequest {
                    clear_price: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(product.price.is_none());
    }
}
