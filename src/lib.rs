pub mod config;
pub mod error;
pub mod features;
pub mod http;
pub mod models;
pub mod prediction;

pub use error::{Result, RiskError};
