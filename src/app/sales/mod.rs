//! 销售单据清洗与汇总（/api/clean）

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub use service::SalesService;
