//! Type definitions

pub mod agent;
pub mod call_statistic;
pub mod import;
pub mod messages;
pub mod user;

pub use agent::*;
pub use call_statistic::*;
pub use import::*;
pub use messages::*;
pub use user::*;
