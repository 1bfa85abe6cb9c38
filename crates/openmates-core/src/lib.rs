pub mod config;
pub mod error;
pub mod limits;
pub mod types;

pub use error::{OpenMatesError, Result};
