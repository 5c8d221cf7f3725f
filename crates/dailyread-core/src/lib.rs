//! # DailyRead Core
//! Configuration and error types shared by the scheduler crate and the CLI.

pub mod config;
pub mod error;

pub use config::DailyReadConfig;
pub use error::{DailyReadError, Result};
