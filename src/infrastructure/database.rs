//! 数据库基础设施

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Error,
};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(database_url: &str, config: &DatabaseConfig) -> Result<Self, Error> {
        info!(
            "连接数据库: {}",
            redact_password(database_url)
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 创建数据库表（幂等）
    pub async fn create_tables(&self) -> Result<(), Error> {
        info!("创建数据库表...");
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("数据库表创建完成");
        Ok(())
    }
}

fn redact_password(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.find(':') {
                Some(colon) => format!(
                    "{}{}:***{}",
                    &url[..scheme_end + 3],
                    &credentials[..colon],
                    &url[at..]
                ),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email VARCHAR(255) UNIQUE NOT NULL,
        name VARCHAR(100) NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('customer', 'employee', 'admin')),
        department VARCHAR(100),
        phone VARCHAR(50),
        company VARCHAR(200),
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        sku VARCHAR(64) UNIQUE NOT NULL,
        name VARCHAR(200) NOT NULL,
        cas_number VARCHAR(16),
        category VARCHAR(100) NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        purity VARCHAR(50),
        grade VARCHAR(50),
        package_size VARCHAR(50),
        unit VARCHAR(20) NOT NULL,
        price DOUBLE PRECISION,
        stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
        low_stock_threshold INTEGER NOT NULL DEFAULT 0,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inquiries (
        id UUID PRIMARY KEY,
        reference VARCHAR(32) UNIQUE NOT NULL,
        user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        contact_name VARCHAR(100) NOT NULL,
        email VARCHAR(255) NOT NULL,
        company VARCHAR(200),
        phone VARCHAR(50),
        message TEXT,
        items JSONB NOT NULL,
        status TEXT NOT NULL,
        admin_note TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id UUID PRIMARY KEY,
        code VARCHAR(32) UNIQUE NOT NULL,
        name VARCHAR(200) NOT NULL,
        contact_person VARCHAR(100),
        email VARCHAR(255),
        phone VARCHAR(50),
        address TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clean_records (
        id UUID PRIMARY KEY,
        doc_type TEXT NOT NULL,
        doc_number VARCHAR(64) NOT NULL,
        doc_date DATE NOT NULL,
        customer_name VARCHAR(200) NOT NULL,
        customer_code VARCHAR(32),
        salesperson VARCHAR(100),
        amount DOUBLE PRECISION NOT NULL,
        tax DOUBLE PRECISION NOT NULL,
        total DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (doc_type, doc_number)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS time_records (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        employee_name VARCHAR(100) NOT NULL,
        department VARCHAR(100),
        record_type TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        work_date DATE NOT NULL,
        scheduled_at TIMESTAMPTZ NOT NULL,
        minutes_diff BIGINT NOT NULL,
        status TEXT NOT NULL,
        note TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (user_id, work_date, record_type)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_time_records_work_date ON time_records (work_date)",
    "CREATE INDEX IF NOT EXISTS idx_clean_records_doc_date ON clean_records (doc_date)",
];
