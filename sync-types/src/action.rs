//! Actions produced by the planner and the event decoder.

use std::fmt;

/// How a copy reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyStrategy {
    /// Server-side copy; no bytes pass through this process.
    Express,
    /// Download from the source and upload to the destination.
    Stream,
}

impl fmt::Display for CopyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Express => write!(f, "express"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

/// A single-key change needed to converge one destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Copy a source object to its destination key.
    Copy {
        /// Source key (the destination key is derived from the bucket rule).
        key: String,
        /// Source size, sent as the expected content length when streaming.
        size: u64,
        /// Express or stream.
        strategy: CopyStrategy,
    },
    /// Rewrite destination metadata in place without moving data.
    Touch {
        /// Destination key.
        key: String,
    },
    /// Remove a destination object whose source is gone.
    Delete {
        /// Destination key.
        key: String,
    },
}

/// Discriminant of an [`Action`], for counting and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// [`Action::Copy`]
    Copy,
    /// [`Action::Touch`]
    Touch,
    /// [`Action::Delete`]
    Delete,
}

impl Action {
    /// The action's kind.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Copy { .. } => ActionKind::Copy,
            Self::Touch { .. } => ActionKind::Touch,
            Self::Delete { .. } => ActionKind::Delete,
        }
    }

    /// The key the action was planned for.
    pub fn key(&self) -> &str {
        match self {
            Self::Copy { key, .. } | Self::Touch { key } | Self::Delete { key } => key,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy {
                key,
                size,
                strategy,
            } => write!(f, "copy[{}] {} ({} bytes)", strategy, key, size),
            Self::Touch { key } => write!(f, "touch {}", key),
            Self::Delete { key } => write!(f, "delete {}", key),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Touch => write!(f, "touch"),
            Self::Delete => write!(f, "delete"),
        }
    }
}
