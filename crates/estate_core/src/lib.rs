pub mod config;
pub mod paths;

pub use config::{Config, ProxyAuth};
