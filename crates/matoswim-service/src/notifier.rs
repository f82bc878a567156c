//! Desktop alert delivery.

#[cfg(feature = "notifications")]
pub use desktop::DesktopNotifier;

#[cfg(feature = "notifications")]
mod desktop {
    use async_trait::async_trait;
    use tracing::debug;

    use matoswim_core::{Alert, NotificationDeliveryError, Notifier};

    /// Shows alerts as desktop notifications.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DesktopNotifier;

    #[async_trait]
    impl Notifier for DesktopNotifier {
        async fn notify(&self, alert: &Alert) -> Result<(), NotificationDeliveryError> {
            let title = alert.title.clone();
            let body = alert.body.clone();

            // `show` blocks on the platform notification service.
            tokio::task::spawn_blocking(move || {
                let mut notification = notify_rust::Notification::new();
                notification.summary(&title).body(&body).appname("MatoSwim");

                #[cfg(target_os = "macos")]
                notification.sound_name("default");

                notification
                    .show()
                    .map(|_| debug!("Notification sent: {} - {}", title, body))
                    .map_err(|e| NotificationDeliveryError::Rejected(e.to_string()))
            })
            .await
            .map_err(|e| NotificationDeliveryError::Rejected(e.to_string()))?
        }
    }
}
