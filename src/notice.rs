//! User-facing notices.
//!
//! Accessors on the API client never propagate request failures; they hand a
//! [`Notice`] to a [`Notifier`] and return `None`. The binary prints notices
//! to stderr, library users can route them anywhere.

use std::fmt;
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::api::ApiError;

/// A message meant for the person running the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The server refused access to a resource (HTTP 403).
    Forbidden,
    /// The token endpoint rejected the account or password (HTTP 401).
    BadCredentials,
    /// No token or server URL is known yet.
    NotLoggedIn,
    /// Any other failed request, with detail.
    RequestFailed(String),
    /// Informational message.
    Info(String),
}

/// How prominently a notice should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl Notice {
    /// Classify an API error into a notice.
    ///
    /// `is_post` distinguishes the token exchange, where a 401 means the
    /// account or password is wrong.
    pub fn from_error(err: &ApiError, is_post: bool) -> Self {
        match err {
            ApiError::Forbidden => Notice::Forbidden,
            ApiError::Unauthorized if is_post => Notice::BadCredentials,
            ApiError::NotLoggedIn => Notice::NotLoggedIn,
            other => Notice::RequestFailed(other.to_string()),
        }
    }

    /// The severity of this notice.
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::Forbidden | Notice::NotLoggedIn => NoticeLevel::Warning,
            Notice::BadCredentials | Notice::RequestFailed(_) => NoticeLevel::Error,
            Notice::Info(_) => NoticeLevel::Info,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Forbidden => write!(f, "Access denied: you lack permission for this ZenTao resource"),
            Notice::BadCredentials => write!(f, "Login failed: wrong account or password"),
            Notice::NotLoggedIn => write!(f, "Not logged in to ZenTao: run `zentao login` first"),
            Notice::RequestFailed(detail) => write!(f, "ZenTao request failed: {}", detail),
            Notice::Info(msg) => write!(f, "{}", msg),
        }
    }
}

/// Receives notices emitted by the client.
pub trait Notifier: Send + Sync {
    /// Deliver one notice.
    fn notify(&self, notice: Notice);
}

/// Forwards notices to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Info => info!(%notice, "notice"),
            NoticeLevel::Warning => warn!(%notice, "notice"),
            NoticeLevel::Error => error!(%notice, "notice"),
        }
    }
}

/// Prints notices to stderr and records them in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Info => eprintln!("{}", notice),
            NoticeLevel::Warning => eprintln!("warning: {}", notice),
            NoticeLevel::Error => eprintln!("error: {}", notice),
        }
        LogNotifier.notify(notice);
    }
}

/// Keeps every notice it receives; used to inspect client behavior.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of all notices received so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice);
    }
}
