//! Database queries

pub mod agent;
pub mod call_statistic;
pub mod user;
