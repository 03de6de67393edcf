//! 核心模块：错误、响应、认证、中间件

pub mod auth;
pub mod error;
pub mod middleware;
pub mod response;

pub use error::{CoreError, CoreResult};
pub use response::{ApiResponse, Page, PageQuery, Paginated};
