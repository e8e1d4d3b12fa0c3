pub mod app;

pub use app::{AppConfig, LimitConfig};
