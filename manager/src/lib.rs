pub mod alerts;
pub mod config;
pub mod connection;
pub mod constants;
pub mod database;
pub mod errors;
pub mod queue;
pub mod services;

// Re-export commonly used types
pub use alerts::{AlertEvaluationEngine, AlertScheduler};
pub use config::{Config, ConfigManager};
pub use connection::{ConnectionManager, RetryStrategy};
pub use database::Database;
pub use errors::{AlertError, ConnectionError, ManagerError, QueueError};
pub use queue::{ProviderFactory, RedisProviderFactory};
pub use services::{AlertService, ConnectionService, NotificationService};
