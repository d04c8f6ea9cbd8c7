/// Notification severity. `Error` renders destructive styling in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A user-visible toast
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: &str, description: &str) -> Notification {
        Notification {
            title: title.to_string(),
            description: description.to_string(),
            severity: Severity::Info,
        }
    }

    pub fn error(title: &str, description: &str) -> Notification {
        Notification {
            title: title.to_string(),
            description: description.to_string(),
            severity: Severity::Error,
        }
    }
}

/// Fire-and-forget notification channel to the user. Display and
/// auto-dismiss are the presentation layer's concern.
pub trait NotificationSink {
    fn notify(&self, notification: Notification);
}
