//! 用户存储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{User, UserFilter};
use crate::core::{CoreError, CoreResult, Page};
use crate::infrastructure::memory::MemoryTable;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 邮箱重复时返回 Conflict
    async fn create(&self, user: &User) -> CoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>>;
    async fn list(&self, filter: &UserFilter, page: Page) -> CoreResult<(Vec<User>, u64)>;
    /// 在职的员工和管理员
    async fn list_staff(&self) -> CoreResult<Vec<User>>;
    /// 更新资料、角色和状态；不修改密码哈希
    async fn update(&self, user: &User) -> CoreResult<()>;
    async fn set_password(&self, id: Uuid, password_hash: &str, at: DateTime<Utc>)
        -> CoreResult<()>;
    async fn delete(&self, id: Uuid) -> CoreResult<bool>;
}

fn email_taken() -> CoreError {
    CoreError::Conflict("该邮箱已被注册".to_string())
}

#[derive(Default)]
pub struct MemoryUserRepository {
    table: MemoryTable<User>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: &User) -> CoreResult<()> {
        let email = user.email.clone();
        if self
            .table
            .insert_unique(user.id, user.clone(), |existing| existing.email == email)
            .await
        {
            Ok(())
        } else {
            Err(email_taken())
        }
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.table.get(id).await)
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        Ok(self.table.find(|user| user.email == email).await)
    }

    async fn list(&self, filter: &UserFilter, page: Page) -> CoreResult<(Vec<User>, u64)> {
        let mut users = self.table.filter(|user| filter.matches(user)).await;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page.slice(&users), users.len() as u64))
    }

    async fn list_staff(&self) -> CoreResult<Vec<User>> {
        let mut staff = self
            .table
            .filter(|user| user.active && user.role.is_staff())
            .await;
        staff.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(staff)
    }

    async fn update(&self, user: &User) -> CoreResult<()> {
        let email = user.email.clone();
        let outcome = self
            .table
            .modify_unique(
                user.id,
                |existing| existing.email == email,
                |row| {
                    let password_hash = std::mem::take(&mut row.password_hash);
                    *row = user.clone();
                    row.password_hash = password_hash;
                },
            )
            .await;
        match outcome {
            None => Err(CoreError::not_found("用户不存在")),
            Some(false) => Err(email_taken()),
            Some(true) => Ok(()),
        }
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.table
            .update_with(id, |row| {
                row.password_hash = password_hash.to_string();
                row.updated_at = at;
            })
            .await
            .ok_or_else(|| CoreError::not_found("用户不存在"))
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.table.remove(id).await)
    }
}

#[cfg(feature = "database")]
pub use pg::PgUserRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use crate::utils::{like_pattern, LIKE_ESCAPE};
    use crate::core::auth::Role;
    use sqlx::{PgPool, Postgres, QueryBuilder};

    const COLUMNS: &str = "id, email, name, password_hash, role, department, phone, company, \
                           active, created_at, updated_at";

    pub struct PgUserRepository {
        pool: PgPool,
    }

    impl PgUserRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(role) = filter.role {
            builder.push(" AND role = ").push_bind(role);
        }
        if let Some(department) = &filter.department {
            builder.push(" AND department = ").push_bind(department.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(LIKE_ESCAPE)
                .push(" OR email ILIKE ")
                .push_bind(pattern)
                .push(LIKE_ESCAPE)
                .push(")");
        }
    }

    fn map_unique(err: sqlx::Error) -> CoreError {
        match CoreError::from(err) {
            CoreError::Conflict(_) => email_taken(),
            other => other,
        }
    }

    #[async_trait]
    impl UserRepository for PgUserRepository {
        async fn create(&self, user: &User) -> CoreResult<()> {
            sqlx::query(
                "INSERT INTO users (id, email, name, password_hash, role, department, phone, \
                 company, active, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.role)
            .bind(&user.department)
            .bind(&user.phone)
            .bind(&user.company)
            .bind(user.active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_unique)?;
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<User>> {
            let user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE id = $1",
                COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(user)
        }

        async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
            let user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE email = $1",
                COLUMNS
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
            Ok(user)
        }

        async fn list(&self, filter: &UserFilter, page: Page) -> CoreResult<(Vec<User>, u64)> {
            let mut builder = QueryBuilder::new(format!("SELECT {} FROM users", COLUMNS));
            push_filters(&mut builder, filter);
            builder
                .push(" ORDER BY created_at DESC LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
            let users = builder.build_query_as::<User>().fetch_all(&self.pool).await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
            push_filters(&mut count, filter);
            let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

            Ok((users, total as u64))
        }

        async fn list_staff(&self) -> CoreResult<Vec<User>> {
            let users = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE active AND role IN ($1, $2) ORDER BY name",
                COLUMNS
            ))
            .bind(Role::Employee)
            .bind(Role::Admin)
            .fetch_all(&self.pool)
            .await?;
            Ok(users)
        }

        async fn update(&self, user: &User) -> CoreResult<()> {
            let result = sqlx::query(
                "UPDATE users SET email = $2, name = $3, role = $4, department = $5, \
                 phone = $6, company = $7, active = $8, updated_at = $9 \
                 WHERE id = $1",
            )
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.role)
            .bind(&user.department)
            .bind(&user.phone)
            .bind(&user.company)
            .bind(user.active)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_unique)?;

            if result.rows_affected() == 0 {
                return Err(CoreError::not_found("用户不存在"));
            }
            Ok(())
        }

        async fn set_password(
            &self,
            id: Uuid,
            password_hash: &str,
            at: DateTime<Utc>,
        ) -> CoreResult<()> {
            let result =
                sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
                    .bind(id)
                    .bind(password_hash)
                    .bind(at)
                    .execute(&self.pool)
                    .await?;

            if result.rows_affected() == 0 {
                return Err(CoreError::not_found("用户不存在"));
            }
            Ok(())
        }

        async fn delete(&self, id: Uuid) -> CoreResult<bool> {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
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
    use crate::core::auth::Role;

    fn user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Lab Tech".to_string(),
            password_hash: "hash-v1".to_string(),
            role: Role::Employee,
            department: Some("Lab".to_string()),
            phone: None,
            company: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_update_does_not_restore_old_password() {
        let repo = MemoryUserRepository::default();
        let stored = user("tech@lab.example");
        repo.create(&stored).await.unwrap();

        // 管理员基于旧快照修改资料，期间用户已修改密码
        let mut edited = stored.clone();
        edited.role = Role::Admin;
        repo.set_password(stored.id, "hash-v2", Utc::now()).await.unwrap();
        repo.update(&edited).await.unwrap();

        let current = repo.find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(current.role, Role::Admin);
        assert_eq!(current.password_hash, "hash-v2");
    }

    #[tokio::test]
    async fn test_update_rejects_taken_email() {
        let repo = MemoryUserRepository::default();
        let first = user("a@lab.example");
        let second = user("b@lab.example");
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        let mut renamed = second.clone();
        renamed.email = "a@lab.example".to_string();
        assert!(matches!(repo.update(&renamed).await, Err(CoreError::Conflict(_))));
        assert!(matches!(
            repo.set_password(Uuid::new_v4(), "x", Utc::now()).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
