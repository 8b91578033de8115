//! This module provides reusable test utilities:
//! - In-memory queue services and a factory that hands them out
//! - A mock webhook server for notification delivery
//! - In-memory test databases
//! - Common test data

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_factory;
pub mod fake_queue;
pub mod mock_webhook;
pub mod test_data;
pub mod test_database;

// Re-export commonly used items
pub use fake_factory::FakeProviderFactory;
pub use fake_queue::{finished_job, FakeQueue, FakeQueueService};
pub use mock_webhook::MockWebhookServer;
pub use test_data::*;
pub use test_database::TestDatabase;
