pub mod analysis;
pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod index;
mod metrics;
pub mod models;
pub mod qa;
pub mod readiness;
pub mod registry;
pub mod server;
pub mod store;
pub mod utils;

pub use config::Opts;
pub use error::{Result, StoreError};
pub use store::ImageStore;
