//! 产品目录与库存

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub use service::CatalogueService;
