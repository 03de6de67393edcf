//! 客户档案

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub use service::CustomerService;
