//! Data types for the task surface.

use std::fmt;
use std::path::PathBuf;

use crate::resolver::Account;

/// What a task transfers and where. Fixed at construction.
#[derive(Debug, Clone)]
pub struct TransferIdentity {
    pub account: Account,
    pub repo_id: String,
    pub remote_path: String,
    pub local_path: PathBuf,
}

impl TransferIdentity {
    /// Last segment of the remote path.
    pub fn file_name(&self) -> &str {
        self.remote_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.remote_path)
    }
}

/// Direction of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskDirection {
    Upload,
    Download,
}

impl fmt::Display for TaskDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// Lifecycle of a task. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    ResolvingLink,
    Transferring,
    Canceling,
    Finished { success: bool },
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Notification delivered to the task owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// `total` is 0 while the size is unknown.
    Progress { transferred: u64, total: u64 },
    /// Terminal; delivered exactly once.
    Finished { success: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(remote_path: &str) -> TransferIdentity {
        TransferIdentity {
            account: Account {
                server_url: "https://files.example".into(),
                username: "u".into(),
                token: "t".into(),
            },
            repo_id: "repo".into(),
            remote_path: remote_path.into(),
            local_path: PathBuf::from("/tmp/x"),
        }
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(identity("/docs/report.pdf").file_name(), "report.pdf");
        assert_eq!(identity("notes.txt").file_name(), "notes.txt");
        assert_eq!(identity("/docs/").file_name(), "");
    }

    #[test]
    fn finished_state() {
        assert!(TaskState::Finished { success: false }.is_finished());
        assert!(!TaskState::Canceling.is_finished());
    }

    #[test]
    fn direction_display() {
        assert_eq!(TaskDirection::Download.to_string(), "download");
        assert_eq!(TaskDirection::Upload.to_string(), "upload");
    }
}
