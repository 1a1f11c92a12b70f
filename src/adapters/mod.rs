//! Concrete adapter implementations for ports.

pub mod channel_notifier;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod log_notifier;
