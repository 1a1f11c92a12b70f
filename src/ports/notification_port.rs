//! Notification sink port trait.

use crate::domain::error::TrendError;
use crate::domain::notification::Notification;

pub trait NotificationPort: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), TrendError>;
}
