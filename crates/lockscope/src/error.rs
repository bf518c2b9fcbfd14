use std::error::Error;
use std::fmt;

/// Why [`Mutex::force_unlock`](crate::Mutex::force_unlock) refused to release.
///
/// Nothing is recorded when unlocking fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockError {
    /// The leaked lock belongs to the named mutex.
    ForeignLock { owner: String },
    NotLocked,
    /// A different acquisition holds the lock.
    HeldByOther { ticket: u64 },
}

impl fmt::Display for UnlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignLock { owner } => {
                write!(f, "leaked lock belongs to mutex {owner:?}")
            }
            Self::NotLocked => write!(f, "mutex is not locked"),
            Self::HeldByOther { ticket } => {
                write!(f, "mutex is held by acquisition #{ticket}")
            }
        }
    }
}

impl Error for UnlockError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { key, value, reason } => {
                write!(f, "invalid {key}={value:?}: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Serializing the event log failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportError(pub String);

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to export event log: {}", self.0)
    }
}

impl Error for ExportError {}
