//! 账户业务服务

use mockable::Clock;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::model::*;
use super::repository::UserRepository;
use crate::config::BootstrapAdmin;
use crate::core::{
    auth::{hash_password, verify_password, Claims, JwtKeys, Role},
    CoreError, CoreResult, Paginated,
};
use crate::utils::clean_optional;

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    keys: JwtKeys,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepository>, keys: JwtKeys, clock: Arc<dyn Clock>) -> Self {
        Self { users, keys, clock }
    }

    fn auth_response(&self, user: User) -> CoreResult<AuthResponse> {
        let token = self.keys.issue(user.id, &user.email, &user.name, user.role)?;
        Ok(AuthResponse {
            token,
            token_type: "Bearer",
            expires_in: self.keys.ttl_seconds(),
            user,
        })
    }

    async fn insert_user(&self, new: NewUser) -> CoreResult<User> {
        let now = self.clock.utc();
        let user = User {
            id: Uuid::new_v4(),
            email: normalize_email(&new.email),
            name: new.name.trim().to_string(),
            password_hash: hash_password(&new.password)?,
            role: new.role,
            department: clean_optional(new.department),
            phone: clean_optional(new.phone),
            company: clean_optional(new.company),
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.create(&user).await?;
        info!("创建用户: {} ({:?})", user.email, user.role);
        Ok(user)
    }

    /// 客户自助注册
    pub async fn register(&self, req: RegisterRequest) -> CoreResult<AuthResponse> {
        req.validate()?;
        let user = self
            .insert_user(NewUser {
                email: req.email,
                name: req.name,
                password: req.password,
                role: Role::Customer,
                department: None,
                phone: req.phone,
                company: req.company,
            })
            .await?;
        self.auth_response(user)
    }

    pub async fn login(&self, req: LoginRequest) -> CoreResult<AuthResponse> {
        req.validate()?;
        let user = self
            .users
            .find_by_email(&normalize_email(&req.email))
            .await?
            .filter(|user| user.active)
            .ok_or(CoreError::Unauthorized)?;

        if !verify_password(&req.password, &user.password_hash) {
            return Err(CoreError::Unauthorized);
        }

        info!("用户登录: {}", user.email);
        self.auth_response(user)
    }

    pub async fn get_user(&self, id: Uuid) -> CoreResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("用户不存在"))
    }

    /// 当前登录用户；已停用的账号视为未认证
    pub async fn me(&self, claims: &Claims) -> CoreResult<User> {
        match self.users.find_by_id(claims.sub).await? {
            Some(user) if user.active => Ok(user),
            _ => Err(CoreError::Unauthorized),
        }
    }

    pub async fn update_profile(
        &self,
        claims: &Claims,
        req: UpdateProfileRequest,
    ) -> CoreResult<User> {
        req.validate()?;
        let mut user = self.me(claims).await?;
        if let Some(name) = req.name {
            user.name = name.trim().to_string();
        }
        if req.phone.is_some() {
            user.phone = clean_optional(req.phone);
        }
        if req.company.is_some() {
            user.company = clean_optional(req.company);
        }
        user.updated_at = self.clock.utc();
        self.users.update(&user).await?;
        Ok(user)
    }

    pub async fn change_password(
        &self,
        claims: &Claims,
        req: ChangePasswordRequest,
    ) -> CoreResult<()> {
        req.validate()?;
        let user = self.me(claims).await?;
        if !verify_password(&req.current_password, &user.password_hash) {
            return Err(CoreError::BadRequest("当前密码不正确".to_string()));
        }
        let password_hash = hash_password(&req.new_password)?;
        self.users
            .set_password(user.id, &password_hash, self.clock.utc())
            .await?;
        info!("用户修改密码: {}", user.email);
        Ok(())
    }

    pub async fn list_users(&self, query: UserQuery) -> CoreResult<Paginated<User>> {
        let page = query.page().normalize();
        let filter = UserFilter {
            role: query.role,
            department: clean_optional(query.department),
            search: clean_optional(query.search),
        };
        let (users, total) = self.users.list(&filter, page).await?;
        Ok(Paginated::new(users, page, total))
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> CoreResult<User> {
        req.validate()?;
        self.insert_user(NewUser {
            email: req.email,
            name: req.name,
            password: req.password,
            role: req.role,
            department: req.department,
            phone: req.phone,
            company: req.company,
        })
        .await
    }

    pub async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> CoreResult<User> {
        req.validate()?;
        let mut user = self.get_user(id).await?;
        if let Some(name) = req.name {
            user.name = name.trim().to_string();
        }
        if let Some(role) = req.role {
            user.role = role;
        }
        if req.department.is_some() {
            user.department = clean_optional(req.department);
        }
        if let Some(active) = req.active {
            user.active = active;
        }
        if req.phone.is_some() {
            user.phone = clean_optional(req.phone);
        }
        if req.company.is_some() {
            user.company = clean_optional(req.company);
        }
        user.updated_at = self.clock.utc();
        self.users.update(&user).await?;
        info!("更新用户: {}", user.email);
        Ok(user)
    }

    pub async fn delete_user(&self, actor: &Claims, id: Uuid) -> CoreResult<()> {
        if actor.sub == id {
            return Err(CoreError::BadRequest("不能删除当前登录的账号".to_string()));
        }
        if !self.users.delete(id).await? {
            return Err(CoreError::not_found("用户不存在"));
        }
        info!("删除用户: {}", id);
        Ok(())
    }

    /// 启动时确保管理员账号存在
    pub async fn ensure_admin(&self, admin: &BootstrapAdmin) -> CoreResult<()> {
        let email = normalize_email(&admin.email);
        if self.users.find_by_email(&email).await?.is_some() {
            info!("管理员账号已存在: {}", email);
            return Ok(());
        }
        self.insert_user(NewUser {
            email,
            name: admin.name.clone(),
            password: admin.password.clone(),
            role: Role::Admin,
            department: None,
            phone: None,
            company: None,
        })
        .await?;
        Ok(())
    }
}

struct NewUser {
    email: String,
    name: String,
    password: String,
    role: Role,
    department: Option<String>,
    phone: Option<String>,
    company: Option<String>,
}
