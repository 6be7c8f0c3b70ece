use tokio::sync::mpsc;

/// Severity of a user-facing notice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Fire-and-forget status message for a toast or status line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, description)
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title, description)
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title, description)
    }

    fn new(level: NoticeLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Receives notices from the controllers.
///
/// `notify` must return immediately; it is called from inside the run loop.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Forwards notices to a channel; a closed receiver drops them.
impl NotificationSink for mpsc::UnboundedSender<Notice> {
    fn notify(&self, notice: Notice) {
        let _ = self.send(notice);
    }
}

/// Writes notices to the tracing log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => {
                tracing::warn!(title = %notice.title, "{}", notice.description)
            }
            NoticeLevel::Info | NoticeLevel::Success => {
                tracing::info!(title = %notice.title, "{}", notice.description)
            }
        }
    }
}
