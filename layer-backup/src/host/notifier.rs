//! Notifiers: where status messages for the user end up.

use super::{Notification, Notifier, Severity};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Maximum number of queued notifications per subscriber
const BROADCAST_CAPACITY: usize = 64;

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        log_notification(&n);
    }
}

fn log_notification(n: &Notification) {
    match n.severity {
        Severity::Info | Severity::Success => info!(title = %n.title, "{}", n.message),
        Severity::Warning => warn!(title = %n.title, "{}", n.message),
        Severity::Error => error!(title = %n.title, "{}", n.message),
    }
}

/// Publishes notifications to subscribers (a status bar, a tray icon, a test).
///
/// With nobody subscribed the notification is logged instead.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, n: Notification) {
        if let Err(broadcast::error::SendError(n)) = self.tx.send(n) {
            log_notification(&n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(message: &str) -> Notification {
        Notification {
            title: "Auto Backup".to_string(),
            message: message.to_string(),
            severity: Severity::Success,
            duration_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let notifier = BroadcastNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.notify(notification("Backup created in backup_QGIS-10-04-2025__10-00-00"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "Backup created in backup_QGIS-10-04-2025__10-00-00");
        assert_eq!(received.severity, Severity::Success);
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_panic() {
        let notifier = BroadcastNotifier::new();
        notifier.notify(notification("nobody listening"));
        LogNotifier::new().notify(notification("log only"));
    }
}
