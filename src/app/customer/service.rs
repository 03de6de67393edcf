//! 客户档案服务

use mockable::Clock;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::model::*;
use super::repository::CustomerRepository;
use crate::app::account::model::normalize_email;
use crate::core::{CoreError, CoreResult, Paginated};
use crate::utils::clean_optional;

#[derive(Clone)]
pub struct CustomerService {
    customers: Arc<dyn CustomerRepository>,
    clock: Arc<dyn Clock>,
}

fn clean_email(email: Option<String>) -> Option<String> {
    clean_optional(email).map(|e| normalize_email(&e))
}

impl CustomerService {
    pub fn new(customers: Arc<dyn CustomerRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { customers, clock }
    }

    pub async fn list(&self, query: CustomerQuery) -> CoreResult<Paginated<Customer>> {
        let page = query.page().normalize();
        let search = clean_optional(query.search);
        let (customers, total) = self.customers.list(search.as_deref(), page).await?;
        Ok(Paginated::new(customers, page, total))
    }

    pub async fn get(&self, id: Uuid) -> CoreResult<Customer> {
        self.customers
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("客户不存在"))
    }

    pub async fn create(&self, req: CreateCustomerRequest) -> CoreResult<Customer> {
        req.validate()?;
        let now = self.clock.utc();
        let customer = Customer {
            id: Uuid::new_v4(),
            code: normalize_code(&req.code),
            name: req.name.trim().to_string(),
            contact_person: clean_optional(req.contact_person),
            email: clean_email(req.email),
            phone: clean_optional(req.phone),
            address: clean_optional(req.address),
            created_at: now,
            updated_at: now,
        };
        if customer.code.is_empty() {
            return Err(CoreError::Validation("客户编码不能为空".to_string()));
        }
        self.customers.create(&customer).await?;
        info!("创建客户: {} {}", customer.code, customer.name);
        Ok(customer)
    }

    pub async fn update(&self, id: Uuid, req: UpdateCustomerRequest) -> CoreResult<Customer> {
        req.validate()?;
        let mut customer = self.get(id).await?;

        if let Some(code) = req.code {
            let code = normalize_code(&code);
            if code.is_empty() {
                return Err(CoreError::Validation("客户编码不能为空".to_string()));
            }
            customer.code = code;
        }
        if let Some(name) = req.name {
            customer.name = name.trim().to_string();
        }
        if req.contact_person.is_some() {
            customer.contact_person = clean_optional(req.contact_person);
        }
        if req.email.is_some() {
            customer.email = clean_email(req.email);
        }
        if req.phone.is_some() {
            customer.phone = clean_optional(req.phone);
        }
        if req.address.is_some() {
            customer.address = clean_optional(req.address);
        }
        customer.updated_at = self.clock.utc();

        self.customers.update(&customer).await?;
        info!("更新客户: {}", customer.code);
        Ok(customer)
    }

    pub async fn delete(&self, id: Uuid) -> CoreResult<()> {
        if !self.customers.delete(id).await? {
            return Err(CoreError::not_found("客户不存在"));
        }
        info!("删除客户: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::customer::repository::MemoryCustomerRepository;
    use mockable::DefaultClock;

    fn service() -> CustomerService {
        CustomerService::new(
            Arc::new(MemoryCustomerRepository::default()),
            Arc::new(DefaultClock),
        )
    }

    fn create(code: &str, name: &str) -> CreateCustomerRequest {
        CreateCustomerRequest {
            code: code.to_string(),
            name: name.to_string(),
            contact_person: Some(" Ms. Lim ".to_string()),
            email: Some("Purchasing@Acme.example".to_string()),
            phone: None,
            address: Some("  ".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_fields() {
        let service = service();
        let customer = service.create(create(" c001 ", "Acme Labs")).await.unwrap();
        assert_eq!(customer.code, "C001");
        assert_eq!(customer.contact_person.as_deref(), Some("Ms. Lim"));
        assert_eq!(customer.email.as_deref(), Some("purchasing@acme.example"));
        assert_eq!(customer.address, None);
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts() {
        let service = service();
        service.create(create("C001", "Acme Labs")).await.unwrap();
        let err = service.create(create("c001", "Other")).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let other = service.create(create("C002", "Beta Chem")).await.unwrap();
        let err = service
            .update(
                other.id,
                UpdateCustomerRequest {
                    code: Some("c001".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_search_update_and_delete() {
        let service = service();
        let acme = service.create(create("C001", "Acme Labs")).await.unwrap();
        service.create(create("C002", "Beta Chem")).await.unwrap();

        let found = service
            .list(CustomerQuery {
                search: Some("beta".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.pagination.total, 1);
        assert_eq!(found.items[0].code, "C002");

        let updated = service
            .update(
                acme.id,
                UpdateCustomerRequest {
                    phone: Some("+60 3 1234 5678".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("+60 3 1234 5678"));
        assert_eq!(updated.name, "Acme Labs");

        service.delete(acme.id).await.unwrap();
        assert!(matches!(
            service.delete(acme.id).await.unwrap_err(),
            CoreError::NotFound(_)
        ));
    }
}
