//! 询价单（购物车提交）流程

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub use service::InquiryService;
