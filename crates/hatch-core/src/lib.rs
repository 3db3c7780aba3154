pub mod config;
pub mod error;
pub mod types;

pub use config::HatchConfig;
pub use error::{HatchError, Result};
pub use types::*;
