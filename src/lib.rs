// Library root for the word game API

pub mod client_ip;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use db::{Database, WordStore};
pub use error::{ApiError, ApiResult};
pub use models::{CheckWordRequest, CheckWordResponse, RandomWordResponse};
