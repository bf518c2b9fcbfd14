use facet::Facet;
use std::time::Duration;

use crate::{CallSite, ContextId, ContextInfo, Timestamp};

/// One recorded operation on an instrumented resource.
///
/// Actions are immutable once appended to a log.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Append order within the owning log, starting at 0.
    pub seq: u64,

    pub kind: ActionKind,

    /// Capture time. For every kind `start == end`; lock waits are carried
    /// by [`ActionKind::LockAcquired`] and [`ActionKind::LockAbandoned`].
    pub start: Timestamp,
    pub end: Timestamp,

    /// Context that performed the action.
    pub context: ContextId,

    /// Context that spawned `context`, `None` for roots.
    pub parent: Option<ContextId>,

    /// User code that invoked the instrumented operation.
    pub caller: CallSite,

    /// What spawned `context`.
    pub creator: String,
}

impl Action {
    /// Builds an instantaneous action. `seq` is assigned by the log on append.
    pub fn new(kind: ActionKind, at: Timestamp, context: &ContextInfo, caller: CallSite) -> Self {
        Self {
            seq: 0,
            kind,
            start: at,
            end: at,
            context: context.id,
            parent: context.parent,
            caller,
            creator: context.creator.clone(),
        }
    }

    /// Time spent blocked on the lock before this action, if it ends a lock attempt.
    pub fn waited(&self) -> Option<Duration> {
        match self.kind {
            ActionKind::LockAcquired { waited_ns } | ActionKind::LockAbandoned { waited_ns } => {
                Some(Duration::from_nanos(waited_ns))
            }
            _ => None,
        }
    }
}

/// What happened. A lock attempt is always recorded as a `LockRequested`
/// followed by either `LockAcquired` or `LockAbandoned`.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum ActionKind {
    /// The caller is about to block on the lock.
    LockRequested,

    /// The lock is held; `waited_ns` is the time since the matching request.
    LockAcquired { waited_ns: u64 },

    /// A deadline-bounded attempt gave up without acquiring the lock.
    LockAbandoned { waited_ns: u64 },

    Unlock,
    Read,
    Set,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LockRequested => "lock_requested",
            Self::LockAcquired { .. } => "lock",
            Self::LockAbandoned { .. } => "lock_abandoned",
            Self::Unlock => "unlock",
            Self::Read => "read",
            Self::Set => "set",
        }
    }

    pub fn is_lock_attempt_end(self) -> bool {
        matches!(self, Self::LockAcquired { .. } | Self::LockAbandoned { .. })
    }

    pub fn acquired_after(waited: Duration) -> Self {
        Self::LockAcquired {
            waited_ns: duration_to_nanos(waited),
        }
    }

    pub fn abandoned_after(waited: Duration) -> Self {
        Self::LockAbandoned {
            waited_ns: duration_to_nanos(waited),
        }
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    duration.as_nanos().min(u64::MAX as u128) as u64
}
