//! Notification sink that writes to the tracing log.

use crate::domain::error::TrendError;
use crate::domain::notification::{Notification, Severity};
use crate::ports::notification_port::NotificationPort;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationPort for LogNotifier {
    fn deliver(&self, notification: &Notification) -> Result<(), TrendError> {
        match notification.severity() {
            Severity::Info => info!(target: "trendlevels::notify", "{}", notification),
            Severity::Warning => warn!(target: "trendlevels::notify", "{}", notification),
            Severity::Error => error!(target: "trendlevels::notify", "{}", notification),
        }
        Ok(())
    }
}
