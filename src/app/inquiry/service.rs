//! 询价业务服务

use mockable::Clock;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::model::*;
use super::repository::InquiryRepository;
use crate::app::account::model::normalize_email;
use crate::app::catalogue::repository::ProductRepository;
use crate::core::{auth::Claims, CoreError, CoreResult, Paginated};
use crate::utils::clean_optional;

#[derive(Clone)]
pub struct InquiryService {
    inquiries: Arc<dyn InquiryRepository>,
    products: Arc<dyn ProductRepository>,
    clock: Arc<dyn Clock>,
}

impl InquiryService {
    pub fn new(
        inquiries: Arc<dyn InquiryRepository>,
        products: Arc<dyn ProductRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inquiries,
            products,
            clock,
        }
    }

    /// 提交询价单；游客和登录用户都可以提交
    pub async fn submit(
        &self,
        actor: Option<&Claims>,
        req: SubmitInquiryRequest,
    ) -> CoreResult<Inquiry> {
        req.validate()?;
        if let Some(line) = req
            .items
            .iter()
            .find(|line| line.quantity == 0 || line.quantity > MAX_LINE_QUANTITY)
        {
            return Err(CoreError::Validation(format!(
                "产品 {} 的数量必须在 1 到 {} 之间",
                line.product_id, MAX_LINE_QUANTITY
            )));
        }

        let merged = merge_lines(&req.items);
        if let Some(line) = merged.iter().find(|line| line.quantity > MAX_LINE_QUANTITY) {
            return Err(CoreError::Validation(format!(
                "产品 {} 合并后的数量 {} 超过上限 {}",
                line.product_id, line.quantity, MAX_LINE_QUANTITY
            )));
        }

        let mut items = Vec::new();
        for line in merged {
            let product = self
                .products
                .find_by_id(line.product_id)
                .await?
                .filter(|product| product.active)
                .ok_or_else(|| {
                    CoreError::BadRequest(format!("产品 {} 不存在或已下架", line.product_id))
                })?;
            items.push(InquiryItem {
                product_id: product.id,
                sku: product.sku,
                product_name: product.name,
                quantity: line.quantity,
                note: line.note,
            });
        }

        let now = self.clock.utc();
        let id = Uuid::new_v4();
        let inquiry = Inquiry {
            id,
            reference: make_reference(id, now),
            user_id: actor.map(|claims| claims.sub),
            contact_name: req.contact_name.trim().to_string(),
            email: normalize_email(&req.email),
            company: clean_optional(req.company),
            phone: clean_optional(req.phone),
            message: clean_optional(req.message),
            items,
            status: InquiryStatus::Pending,
            admin_note: None,
            created_at: now,
            updated_at: now,
        };
        self.inquiries.create(&inquiry).await?;
        info!(
            "收到询价单: {} ({} 个产品, 共 {} 件)",
            inquiry.reference,
            inquiry.items.len(),
            inquiry.total_quantity()
        );
        Ok(inquiry)
    }

    pub async fn list_mine(
        &self,
        claims: &Claims,
        query: InquiryQuery,
    ) -> CoreResult<Paginated<Inquiry>> {
        let page = query.page().normalize();
        let filter = InquiryFilter {
            status: query.status,
            user_id: Some(claims.sub),
            search: None,
        };
        let (inquiries, total) = self.inquiries.list(&filter, page).await?;
        Ok(Paginated::new(inquiries, page, total))
    }

    pub async fn list(&self, query: InquiryQuery) -> CoreResult<Paginated<Inquiry>> {
        let page = query.page().normalize();
        let filter = InquiryFilter {
            status: query.status,
            user_id: None,
            search: clean_optional(query.search),
        };
        let (inquiries, total) = self.inquiries.list(&filter, page).await?;
        Ok(Paginated::new(inquiries, page, total))
    }

    async fn find(&self, id: Uuid) -> CoreResult<Inquiry> {
        self.inquiries
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("询价单不存在"))
    }

    /// 本人或管理员可见；其他人视为不存在
    pub async fn get(&self, claims: &Claims, id: Uuid) -> CoreResult<Inquiry> {
        let inquiry = self.find(id).await?;
        if claims.is_admin() || inquiry.user_id == Some(claims.sub) {
            Ok(inquiry)
        } else {
            Err(CoreError::not_found("询价单不存在"))
        }
    }

    pub async fn get_any(&self, id: Uuid) -> CoreResult<Inquiry> {
        self.find(id).await
    }

    /// 客户撤回仍在待处理状态的询价单
    pub async fn cancel(&self, claims: &Claims, id: Uuid) -> CoreResult<Inquiry> {
        let mut inquiry = self.find(id).await?;
        if inquiry.user_id != Some(claims.sub) {
            return Err(CoreError::not_found("询价单不存在"));
        }
        if inquiry.status != InquiryStatus::Pending {
            return Err(CoreError::Conflict("只有待处理的询价单可以撤回".to_string()));
        }
        inquiry.status = InquiryStatus::Cancelled;
        inquiry.updated_at = self.clock.utc();
        if !self
            .inquiries
            .update_status(&inquiry, InquiryStatus::Pending)
            .await?
        {
            return Err(CoreError::Conflict("只有待处理的询价单可以撤回".to_string()));
        }
        info!("询价单已撤回: {}", inquiry.reference);
        Ok(inquiry)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        req: UpdateInquiryStatusRequest,
    ) -> CoreResult<Inquiry> {
        req.validate()?;
        let mut inquiry = self.find(id).await?;
        if !inquiry.status.can_transition_to(req.status) {
            return Err(CoreError::Conflict(format!(
                "询价单状态不能从 {:?} 变更为 {:?}",
                inquiry.status, req.status
            )));
        }
        let previous = inquiry.status;
        inquiry.status = req.status;
        if req.admin_note.is_some() {
            inquiry.admin_note = clean_optional(req.admin_note);
        }
        inquiry.updated_at = self.clock.utc();
        if !self.inquiries.update_status(&inquiry, previous).await? {
            return Err(CoreError::Conflict("询价单状态已被其他操作修改".to_string()));
        }
        info!(
            "询价单 {} 状态变更: {:?} -> {:?}",
            inquiry.reference, previous, inquiry.status
        );
        Ok(inquiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::catalogue::model::Product;
    use crate::app::catalogue::repository::MemoryProductRepository;
    use crate::app::inquiry::repository::MemoryInquiryRepository;
    use crate::core::auth::Role;
    use chrono::Utc;
    use mockable::DefaultClock;

    fn product(sku: &str, active: bool) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            sku: sku.to_string(),
            name: format!("{} name", sku),
            cas_number: None,
            category: "Solvents".to_string(),
            description: String::new(),
            purity: None,
            grade: None,
            package_size: None,
            unit: "bottle".to_string(),
            price: None,
            stock: 5,
            low_stock_threshold: 1,
            active,
            created_at: now,
            updated_at: now,
        }
    }

    fn claims(role: Role) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            name: "Someone".to_string(),
            role,
            iat: 0,
            exp: 0,
        }
    }

    async fn setup() -> (InquiryService, Product, Product) {
        let products = Arc::new(MemoryProductRepository::default());
        let active = product("ETH-500", true);
        let inactive = product("OLD-1", false);
        products.create(&active).await.unwrap();
        products.create(&inactive).await.unwrap();
        let service = InquiryService::new(
            Arc::new(MemoryInquiryRepository::default()),
            products,
            Arc::new(DefaultClock),
        );
        (service, active, inactive)
    }

    fn request(lines: Vec<InquiryLineRequest>) -> SubmitInquiryRequest {
        SubmitInquiryRequest {
            contact_name: "Dr. Chen".to_string(),
            email: "Chen@Lab.example".to_string(),
            company: Some("Lab".to_string()),
            phone: None,
            message: Some("Need COA".to_string()),
            items: lines,
        }
    }

    #[tokio::test]
    async fn test_submit_snapshots_and_merges() {
        let (service, active, _) = setup().await;
        let customer = claims(Role::Customer);
        let inquiry = service
            .submit(
                Some(&customer),
                request(vec![
                    InquiryLineRequest { product_id: active.id, quantity: 2, note: None },
                    InquiryLineRequest { product_id: active.id, quantity: 1, note: None },
                ]),
            )
            .await
            .unwrap();

        assert_eq!(inquiry.status, InquiryStatus::Pending);
        assert_eq!(inquiry.email, "chen@lab.example");
        assert_eq!(inquiry.items.len(), 1);
        assert_eq!(inquiry.items[0].quantity, 3);
        assert_eq!(inquiry.items[0].sku, "ETH-500");
        assert_eq!(inquiry.user_id, Some(customer.sub));
        assert!(inquiry.reference.starts_with("INQ-"));
    }

    #[tokio::test]
    async fn test_submit_rejects_inactive_and_empty() {
        let (service, _, inactive) = setup().await;
        let err = service
            .submit(
                None,
                request(vec![InquiryLineRequest {
                    product_id: inactive.id,
                    quantity: 1,
                    note: None,
                }]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));

        let err = service.submit(None, request(vec![])).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (service, active, _) = setup().await;
        let err = service
            .submit(
                None,
                request(vec![InquiryLineRequest { product_id: active.id, quantity: 0, note: None }]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_merged_quantity_over_limit_rejected() {
        let (service, active, _) = setup().await;
        let half = MAX_LINE_QUANTITY / 2 + 1;
        let err = service
            .submit(
                None,
                request(vec![
                    InquiryLineRequest { product_id: active.id, quantity: half, note: None },
                    InquiryLineRequest { product_id: active.id, quantity: half, note: None },
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let exact = service
            .submit(
                None,
                request(vec![
                    InquiryLineRequest {
                        product_id: active.id,
                        quantity: MAX_LINE_QUANTITY / 2,
                        note: None,
                    },
                    InquiryLineRequest {
                        product_id: active.id,
                        quantity: MAX_LINE_QUANTITY / 2,
                        note: None,
                    },
                ]),
            )
            .await
            .unwrap();
        assert_eq!(exact.items[0].quantity, MAX_LINE_QUANTITY);
    }

    #[tokio::test]
    async fn test_owner_cancel_and_admin_transitions() {
        let (service, active, _) = setup().await;
        let customer = claims(Role::Customer);
        let stranger = claims(Role::Customer);
        let lines = || vec![InquiryLineRequest { product_id: active.id, quantity: 1, note: None }];

        let first = service.submit(Some(&customer), request(lines())).await.unwrap();
        assert!(service.get(&stranger, first.id).await.is_err());
        assert!(service.get(&claims(Role::Admin), first.id).await.is_ok());

        let cancelled = service.cancel(&customer, first.id).await.unwrap();
        assert_eq!(cancelled.status, InquiryStatus::Cancelled);
        let err = service.cancel(&customer, first.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let second = service.submit(Some(&customer), request(lines())).await.unwrap();
        let quoted = service
            .update_status(
                second.id,
                UpdateInquiryStatusRequest {
                    status: InquiryStatus::Quoted,
                    admin_note: Some("USD 120 / bottle".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(quoted.admin_note.as_deref(), Some("USD 120 / bottle"));

        let err = service
            .update_status(
                second.id,
                UpdateInquiryStatusRequest { status: InquiryStatus::Pending, admin_note: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let mine = service.list_mine(&customer, InquiryQuery::default()).await.unwrap();
        assert_eq!(mine.pagination.total, 2);
        let quoted_only = service
            .list(InquiryQuery {
                status: Some(InquiryStatus::Quoted),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(quoted_only.pagination.total, 1);
    }
}
