pub mod cache;
pub mod datetime;
pub mod decimal;
pub mod env;
pub mod telegram;
