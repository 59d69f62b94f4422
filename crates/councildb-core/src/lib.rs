pub mod config;
pub mod data_processor;
pub mod error;
pub mod text;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
