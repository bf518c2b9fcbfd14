//! Core nomenclature shared by every lockscope crate.
//!
//! - `Action`: one recorded operation on an instrumented resource.
//! - `ContextId`: identity of the concurrent execution context (thread or
//!   task) that performed it.
//! - `ContextInfo`: a context's identity plus its lineage (who spawned it).
//! - `CallSite`: where in user code the operation was invoked.
//! - `Timestamp`: process-relative capture time.
//!
//! In short: contexts perform actions on a resource, at a call site, at a
//! timestamp.

use facet::Facet;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

mod action;

pub use action::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroId(&'static str),
    IdOutOfRange {
        field: &'static str,
        max: u64,
        got: u64,
    },
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
            Self::IdOutOfRange { field, max, got } => {
                write!(f, "{field} must be <= {max}, got {got}")
            }
        }
    }
}

impl Error for InvariantError {}

/// Largest id that survives a round-trip through a JSON number.
pub const JS_SAFE_INT_MAX_U64: u64 = (1u64 << 53) - 1;

////////////////////////////////////////////////////////////////////////////////////
// Contexts
////////////////////////////////////////////////////////////////////////////////////

/// Identity of one concurrent execution context. Never zero.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct ContextId(u64);

impl ContextId {
    pub fn new(value: u64) -> Result<Self, InvariantError> {
        if value == 0 {
            return Err(InvariantError::ZeroId("context_id"));
        }
        if value > JS_SAFE_INT_MAX_U64 {
            return Err(InvariantError::IdOutOfRange {
                field: "context_id",
                max: JS_SAFE_INT_MAX_U64,
                got: value,
            });
        }
        Ok(Self(value))
    }

    /// Allocates the next id from the process-wide counter, starting at 1.
    pub fn next_process_local() -> Result<Self, InvariantError> {
        static NEXT_COUNTER: AtomicU64 = AtomicU64::new(1);
        let counter = NEXT_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::new(counter)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Creator recorded for contexts nobody spawned.
pub const ROOT_CREATOR: &str = "root";

/// Identity and lineage of an execution context.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub id: ContextId,

    /// The context that spawned this one, `None` for a root context.
    pub parent: Option<ContextId>,

    /// Name of whatever spawned this context, [`ROOT_CREATOR`] for roots.
    pub creator: String,
}

impl ContextInfo {
    pub fn root(id: ContextId) -> Self {
        Self {
            id,
            parent: None,
            creator: ROOT_CREATOR.to_owned(),
        }
    }

    pub fn child(id: ContextId, parent: ContextId, creator: impl Into<String>) -> Self {
        Self {
            id,
            parent: Some(parent),
            creator: creator.into(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

////////////////////////////////////////////////////////////////////////////////////
// Call sites
////////////////////////////////////////////////////////////////////////////////////

/// Stand-in for a function name the debug info could not provide.
pub const UNKNOWN_FUNCTION: &str = "<unknown>";

/// The user code that invoked an instrumented operation: its source location
/// and the function containing it.
#[derive(Facet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Path of the function, closures folded into their enclosing function.
    /// [`UNKNOWN_FUNCTION`] when symbols are unavailable.
    pub function: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl CallSite {
    /// The caller, looking through every `#[track_caller]` frame.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            function: function_at(location),
            ..Self::from_location(location)
        }
    }

    /// A call site with only a location; the function is [`UNKNOWN_FUNCTION`].
    pub fn from_location(location: &std::panic::Location<'_>) -> Self {
        Self {
            function: UNKNOWN_FUNCTION.to_owned(),
            file: location.file().to_owned(),
            line: location.line(),
            column: location.column(),
        }
    }
}

type LocationKey = (&'static str, u32, u32);

/// Name of the function whose code sits at `location`, found by walking the
/// live stack. Results are cached per location.
fn function_at(location: &'static std::panic::Location<'static>) -> String {
    static NAMES: OnceLock<Mutex<HashMap<LocationKey, String>>> = OnceLock::new();

    let key = (location.file(), location.line(), location.column());
    let names = NAMES.get_or_init(Default::default);
    if let Some(name) = names.lock().get(&key) {
        return name.clone();
    }

    let name = symbolize(location).unwrap_or_else(|| UNKNOWN_FUNCTION.to_owned());
    names.lock().insert(key, name.clone());
    name
}

fn symbolize(location: &std::panic::Location<'_>) -> Option<String> {
    let file = Path::new(location.file());
    let mut exact = None;
    let mut same_file = None;

    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            if exact.is_some() {
                return;
            }
            let (Some(name), Some(path)) = (symbol.name(), symbol.filename()) else {
                return;
            };
            if !path.ends_with(file) {
                return;
            }
            let name = function_path(&format!("{name:#}"));
            if symbol.lineno() == Some(location.line()) {
                exact = Some(name);
            } else if same_file.is_none() {
                same_file = Some(name);
            }
        });
        exact.is_none()
    });

    exact.or(same_file)
}

/// Drops the `::{{closure}}` segments rustc appends for closures and async
/// blocks.
fn function_path(symbol: &str) -> String {
    let mut path = symbol;
    while let Some(outer) = path.strip_suffix("::{{closure}}") {
        path = outer;
    }
    path.to_owned()
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

////////////////////////////////////////////////////////////////////////////////////
// Timestamps
////////////////////////////////////////////////////////////////////////////////////

/// First-use monotonic anchor for process-relative timestamps.
fn anchor() -> &'static Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    ANCHOR.get_or_init(Instant::now)
}

/// Nanoseconds since the process anchor (the first call to `Timestamp::now()`).
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        let elapsed_ns = anchor().elapsed().as_nanos().min(u64::MAX as u128) as u64;
        Self(elapsed_ns)
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}
