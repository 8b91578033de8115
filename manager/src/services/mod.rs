// File: manager/src/services/mod.rs

pub mod alert_service;
pub mod connection_service;
pub mod notification_service;
pub mod status_sync;

pub use alert_service::{AlertService, CreateAlertInput, UpdateAlertInput};
pub use connection_service::ConnectionService;
pub use notification_service::NotificationService;
pub use status_sync::spawn_status_sync;
