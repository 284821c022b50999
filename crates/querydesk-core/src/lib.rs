pub mod config;
pub mod error;
pub mod types;

pub use config::QueryDeskConfig;
pub use error::{QueryDeskError, Result};
pub use types::*;
