//! 业务模块与路由装配

pub mod account;
pub mod attendance;
pub mod catalogue;
pub mod customer;
pub mod health;
pub mod inquiry;
pub mod sales;

use axum::{
    extract::FromRef,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use mockable::Clock;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::core::{
    auth::JwtKeys,
    middleware::{cors_layer, request_logging_middleware},
};
#[cfg(feature = "database")]
use crate::infrastructure::database::DatabaseManager;

use account::{
    repository::{MemoryUserRepository, UserRepository},
    AccountService,
};
use attendance::{
    model::WorkSchedule,
    repository::{MemoryTimeRecordRepository, TimeRecordRepository},
    AttendanceService,
};
use catalogue::{
    repository::{MemoryProductRepository, ProductRepository},
    CatalogueService,
};
use customer::{
    repository::{CustomerRepository, MemoryCustomerRepository},
    CustomerService,
};
use inquiry::{
    repository::{InquiryRepository, MemoryInquiryRepository},
    InquiryService,
};
use sales::{
    repository::{CleanRecordRepository, MemoryCleanRecordRepository},
    SalesService,
};

/// 存储后端
#[derive(Clone)]
pub enum Storage {
    Memory,
    #[cfg(feature = "database")]
    Postgres(DatabaseManager),
}

impl Storage {
    pub fn name(&self) -> &'static str {
        match self {
            Storage::Memory => "memory",
            #[cfg(feature = "database")]
            Storage::Postgres(_) => "postgres",
        }
    }
}

/// 各业务表的存储实现
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub inquiries: Arc<dyn InquiryRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub clean_records: Arc<dyn CleanRecordRepository>,
    pub time_records: Arc<dyn TimeRecordRepository>,
}

impl Repositories {
    pub fn memory() -> Self {
        Self {
            users: Arc::new(MemoryUserRepository::default()),
            products: Arc::new(MemoryProductRepository::default()),
            inquiries: Arc::new(MemoryInquiryRepository::default()),
            customers: Arc::new(MemoryCustomerRepository::default()),
            clean_records: Arc::new(MemoryCleanRecordRepository::default()),
            time_records: Arc::new(MemoryTimeRecordRepository::default()),
        }
    }

    #[cfg(feature = "database")]
    pub fn postgres(pool: &sqlx::PgPool) -> Self {
        use account::repository::PgUserRepository;
        use attendance::repository::PgTimeRecordRepository;
        use catalogue::repository::PgProductRepository;
        use customer::repository::PgCustomerRepository;
        use inquiry::repository::PgInquiryRepository;
        use sales::repository::PgCleanRecordRepository;

        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            products: Arc::new(PgProductRepository::new(pool.clone())),
            inquiries: Arc::new(PgInquiryRepository::new(pool.clone())),
            customers: Arc::new(PgCustomerRepository::new(pool.clone())),
            clean_records: Arc::new(PgCleanRecordRepository::new(pool.clone())),
            time_records: Arc::new(PgTimeRecordRepository::new(pool.clone())),
        }
    }
}

/// 应用状态，每个请求克隆一份
#[derive(Clone)]
pub struct AppState {
    pub account: AccountService,
    pub catalogue: CatalogueService,
    pub inquiry: InquiryService,
    pub customer: CustomerService,
    pub sales: SalesService,
    pub attendance: AttendanceService,
    pub users: Arc<dyn UserRepository>,
    pub keys: JwtKeys,
    pub storage: Storage,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        storage: Storage,
        keys: JwtKeys,
        schedule: WorkSchedule,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            account: AccountService::new(repos.users.clone(), keys.clone(), clock.clone()),
            catalogue: CatalogueService::new(repos.products.clone(), clock.clone()),
            inquiry: InquiryService::new(repos.inquiries, repos.products, clock.clone()),
            customer: CustomerService::new(repos.customers, clock.clone()),
            sales: SalesService::new(repos.clean_records, clock.clone()),
            attendance: AttendanceService::new(
                repos.time_records,
                repos.users.clone(),
                schedule,
                clock,
            ),
            users: repos.users,
            keys,
            storage,
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl FromRef<AppState> for Arc<dyn UserRepository> {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

/// 创建路由
pub fn create_routes() -> Router<AppState> {
    let auth = Router::new()
        .route("/register", post(account::handler::register))
        .route("/login", post(account::handler::login))
        .route(
            "/me",
            get(account::handler::me).put(account::handler::update_me),
        )
        .route("/me/password", put(account::handler::change_password));

    let products = Router::new()
        .route("/", get(catalogue::handler::list_products))
        .route("/categories", get(catalogue::handler::list_categories))
        .route("/:id", get(catalogue::handler::get_product));

    let inquiries = Router::new()
        .route("/", post(inquiry::handler::submit_inquiry))
        .route("/mine", get(inquiry::handler::list_my_inquiries))
        .route("/:id", get(inquiry::handler::get_inquiry))
        .route("/:id/cancel", post(inquiry::handler::cancel_inquiry));

    let time_records = Router::new()
        .route(
            "/",
            get(attendance::handler::list_time_records)
                .post(attendance::handler::create_time_record),
        )
        .route("/today", get(attendance::handler::today_records));

    let attendance_stats = Router::new()
        .route("/summary/today", get(attendance::handler::today_summary))
        .route(
            "/employees/:id/stats",
            get(attendance::handler::employee_stats),
        )
        .route("/departments", get(attendance::handler::department_stats));

    let clean = Router::new()
        .route(
            "/",
            get(sales::handler::list_records).post(sales::handler::create_record),
        )
        .route("/import", post(sales::handler::import_records))
        .route("/summary", get(sales::handler::summary))
        .route("/:id", delete(sales::handler::delete_record));

    let admin = Router::new()
        .route(
            "/users",
            get(account::handler::list_users).post(account::handler::create_user),
        )
        .route(
            "/users/:id",
            get(account::handler::get_user)
                .put(account::handler::update_user)
                .delete(account::handler::delete_user),
        )
        .route(
            "/products",
            get(catalogue::handler::admin_list_products).post(catalogue::handler::create_product),
        )
        .route("/products/low-stock", get(catalogue::handler::low_stock))
        .route(
            "/products/:id",
            get(catalogue::handler::admin_get_product)
                .put(catalogue::handler::update_product)
                .delete(catalogue::handler::delete_product),
        )
        .route("/products/:id/stock", post(catalogue::handler::adjust_stock))
        .route("/inquiries", get(inquiry::handler::admin_list_inquiries))
        .route("/inquiries/:id", get(inquiry::handler::admin_get_inquiry))
        .route(
            "/inquiries/:id/status",
            put(inquiry::handler::update_inquiry_status),
        )
        .route(
            "/customers",
            get(customer::handler::list_customers).post(customer::handler::create_customer),
        )
        .route(
            "/customers/:id",
            get(customer::handler::get_customer)
                .put(customer::handler::update_customer)
                .delete(customer::handler::delete_customer),
        )
        .route(
            "/time-records/:id",
            delete(attendance::handler::delete_time_record),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/auth", auth)
        .nest("/api/products", products)
        .nest("/api/inquiries", inquiries)
        .nest("/api/time-records", time_records)
        .nest("/api/time/attendance", attendance_stats)
        .nest("/api/clean", clean)
        .nest("/api/admin", admin)
}

/// 组装完整应用：路由、日志、跨域和超时
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    create_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&server.cors_allowed_origins))
                .layer(TimeoutLayer::new(Duration::from_secs(server.timeout_seconds)))
                .layer(middleware::from_fn(request_logging_middleware)),
        )
        .with_state(state)
}
