pub mod config;
pub mod error;
pub mod fetch;
pub mod forecast;
pub mod graph;
pub mod process;
pub mod server;

pub use error::{ForecastError, Result};
