//! User-visible connectivity notices.
//!
//! The host UI implements [`Notifier`] (toasts, banners). The connection
//! manager drives it through a [`NoticeBoard`], which keeps at most one
//! connectivity notice on screen: showing a new one dismisses the previous
//! one first.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identity of a shown notice, used to dismiss it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeId(Uuid);

impl NoticeId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// What a notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Connection dropped unexpectedly; reconnection in progress.
    Reconnecting,
    /// Connection restored.
    Reconnected,
    /// Reconnection attempts exhausted; the user must refresh.
    ConnectionLost,
    /// The server rejected a request.
    ServerError,
}

/// How long a notice stays up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeDuration {
    /// Until explicitly dismissed.
    Persistent,
    /// Auto-dismissed by the UI after the given time.
    Timed(Duration),
}

/// A notice to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: NoticeId,
    pub kind: NoticeKind,
    pub message: String,
    pub duration: NoticeDuration,
}

impl Notice {
    fn new(kind: NoticeKind, message: impl Into<String>, duration: NoticeDuration) -> Self {
        Self {
            id: NoticeId::new(),
            kind,
            message: message.into(),
            duration,
        }
    }

    /// Persistent "reconnecting" banner.
    pub fn reconnecting() -> Self {
        Self::new(
            NoticeKind::Reconnecting,
            "Connection lost. Reconnecting…",
            NoticeDuration::Persistent,
        )
    }

    /// Short confirmation after a reconnect.
    pub fn reconnected(duration: Duration) -> Self {
        Self::new(
            NoticeKind::Reconnected,
            "Reconnected",
            NoticeDuration::Timed(duration),
        )
    }

    /// Terminal notice once reconnection gave up.
    pub fn connection_lost() -> Self {
        Self::new(
            NoticeKind::ConnectionLost,
            "Unable to reconnect. Please refresh the page.",
            NoticeDuration::Timed(Duration::from_secs(30)),
        )
    }

    /// Transient server error.
    pub fn server_error(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(
            NoticeKind::ServerError,
            message,
            NoticeDuration::Timed(duration),
        )
    }
}

/// Displays and dismisses notices. Implemented by the host UI.
pub trait Notifier: Send + Sync + 'static {
    /// Display `notice`.
    fn show(&self, notice: &Notice);

    /// Remove the notice with the given id, if it is still shown.
    fn dismiss(&self, id: NoticeId);
}

/// [`Notifier`] that writes notices to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show(&self, notice: &Notice) {
        match notice.kind {
            NoticeKind::Reconnecting => warn!(message = %notice.message, "notice"),
            NoticeKind::Reconnected => info!(message = %notice.message, "notice"),
            NoticeKind::ConnectionLost | NoticeKind::ServerError => {
                error!(message = %notice.message, "notice");
            }
        }
    }

    fn dismiss(&self, id: NoticeId) {
        debug!(?id, "notice dismissed");
    }
}

/// Tracks the one outstanding connectivity notice.
pub struct NoticeBoard {
    notifier: Box<dyn Notifier>,
    active: Mutex<Option<NoticeId>>,
}

impl NoticeBoard {
    /// Create a board that displays through `notifier`.
    pub fn new(notifier: impl Notifier) -> Self {
        Self {
            notifier: Box::new(notifier),
            active: Mutex::new(None),
        }
    }

    /// Replace the outstanding connectivity notice with `notice`.
    pub fn replace(&self, notice: Notice) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.take() {
            self.notifier.dismiss(previous);
        }
        self.notifier.show(&notice);
        *active = Some(notice.id);
    }

    /// Dismiss the outstanding connectivity notice, if any.
    pub fn clear(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.take() {
            self.notifier.dismiss(previous);
        }
    }

    /// Show a notice beside the connectivity slot without displacing it.
    pub fn flash(&self, notice: Notice) {
        self.notifier.show(&notice);
    }

    /// Id of the outstanding connectivity notice.
    pub fn active(&self) -> Option<NoticeId> {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for NoticeBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoticeBoard")
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}
