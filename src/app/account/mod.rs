//! 账户：注册、登录、个人资料与用户管理

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub use service::AccountService;
