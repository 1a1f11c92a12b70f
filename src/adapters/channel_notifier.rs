//! In-process notification sink backed by a crossbeam channel.

use crate::domain::error::TrendError;
use crate::domain::notification::Notification;
use crate::ports::notification_port::NotificationPort;
use crossbeam::channel::{self, Receiver, Sender};

pub struct ChannelNotifier {
    tx: Sender<Notification>,
}

impl ChannelNotifier {
    /// Sink plus the receiving end for the consumer.
    pub fn unbounded() -> (Self, Receiver<Notification>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }
}

impl NotificationPort for ChannelNotifier {
    fn deliver(&self, notification: &Notification) -> Result<(), TrendError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| TrendError::Notification {
                reason: "notification channel closed".to_string(),
            })
    }
}
