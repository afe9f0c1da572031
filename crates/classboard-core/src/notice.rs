//! Transient user-facing notifications.
//!
//! The engine never surfaces failures as errors to the UI; it queues notices
//! the host drains with [`SyncEngine::take_notices`](crate::SyncEngine::take_notices).

use crate::export::ExportFormat;
use crate::permission::PermissionMode;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Authority confirmation after a toggle.
    PermissionSet(PermissionMode),
    /// A participant was allowed to draw.
    WriteAccessGranted,
    /// A participant was switched to read-only.
    ReadOnly,
    /// A full snapshot was received and applied.
    Synchronized,
    /// Export succeeded in the requested format.
    Exported(ExportFormat),
    /// Rendering failed; the raw document was exported instead.
    ExportFallback(ExportFormat),
    /// Nothing could be exported.
    ExportFailed(String),
}

impl Notice {
    /// Whether this notice reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ExportFailed(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionSet(PermissionMode::AllPeers) => f.write_str("All students can now write"),
            Self::PermissionSet(PermissionMode::AuthorityOnly) => f.write_str("Only the professor can write"),
            Self::WriteAccessGranted => f.write_str("The professor allows you to write on the whiteboard"),
            Self::ReadOnly => f.write_str("Read-only mode enabled"),
            Self::Synchronized => f.write_str("Whiteboard synchronized"),
            Self::Exported(format) => write!(f, "Whiteboard exported as {}", format),
            Self::ExportFallback(format) => write!(f, "Whiteboard exported as {} (fallback)", format),
            Self::ExportFailed(reason) => write!(f, "Export failed: {}", reason),
        }
    }
}
