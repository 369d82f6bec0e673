//! Relay Control Plane Library
//!
//! Routes coding tasks to providers and supervises the workers started for
//! them: lifecycle, health probing, retries, timeouts and output queries.

pub mod catalog;
pub mod config;
pub mod manager;
pub mod router;
mod supervisor;
pub mod worker;

pub use catalog::ProviderCatalog;
pub use config::{Config, ConfigError, ManagerConfig};
pub use manager::{ManagerError, WorkerManager};
pub use router::{Router, RouterConfig, RouterError};
pub use worker::Worker;
