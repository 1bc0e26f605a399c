//! Bridge to the user-visible notification channel (toasts).

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
}

/// Fire-and-forget notification sink.
///
/// Implementations must return promptly and must not panic; the timer core
/// calls this from inside transitions.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotificationKind, message: &str);
}

/// Writes notifications to the log. Default sink for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Info => info!("[notify] {message}"),
            NotificationKind::Warning => warn!("[notify] {message}"),
            NotificationKind::Error => error!("[notify] {message}"),
        }
    }
}
