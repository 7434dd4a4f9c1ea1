//! Business logic services

pub mod export;
pub mod import;
pub mod overview;
pub mod rate_limiter;
