/// Task state definitions for the per-resource packaging state machine
///
/// A task moves forward through these states; `Reused`, `Done` and `Failed`
/// are terminal.
use std::fmt;

/// Represents the current state of a packaging task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Active States =====
    /// Task created, cache not consulted yet
    New,

    /// Resource is being fetched from the origin
    Fetching,

    /// Response is running through the processor pipeline
    Processing,

    /// Sub-resources named by preloads are being packaged
    Recursing,

    /// Exchange is being built and verified
    Signing,

    /// Packaged resource is being written to the cache
    Storing,

    // ===== Terminal States =====
    /// A valid cached exchange was reused
    Reused,

    /// Resource was packaged and stored
    Done,

    /// Packaging failed
    Failed,
}

impl TaskState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reused | Self::Done | Self::Failed)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reused | Self::Done)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    ///
    /// Every active state may fail.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        if next == Self::Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::New, Self::Reused)
                | (Self::New, Self::Fetching)
                | (Self::Fetching, Self::Processing)
                | (Self::Processing, Self::Recursing)
                | (Self::Recursing, Self::Signing)
                | (Self::Signing, Self::Storing)
                | (Self::Storing, Self::Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Fetching => "fetching",
            Self::Processing => "processing",
            Self::Recursing => "recursing",
            Self::Signing => "signing",
            Self::Storing => "storing",
            Self::Reused => "reused",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
