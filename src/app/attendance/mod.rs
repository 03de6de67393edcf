//! 员工考勤：打卡、准时判定与出勤统计

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub use service::AttendanceService;
