pub mod accounts;
pub mod attendance;
pub mod catalog;
pub mod core;
pub mod dashboard;
pub mod offerings;
pub mod reports;
