//! Instrumented mutual exclusion, drawn as swim lanes.
//!
//! [`Mutex`] wraps a value and an exclusive lock. Every lock attempt,
//! unlock, read and write is timestamped, attributed to the execution
//! context that performed it (and that context's spawner), and appended to
//! the mutex's [`EventLog`]. Afterwards the log renders as a diagram with a
//! timeline lane, one lane per context, and a lane for the resource itself,
//! which makes wait latency and hand-offs between threads or tasks visible.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let counter = Arc::new(lockscope::Mutex::new("counter", 0u32));
//!
//! let guard = counter.lock();
//! guard.set(5);
//! let reader = lockscope::thread::spawn("reader", {
//!     let counter = Arc::clone(&counter);
//!     move || {
//!         let guard = counter.lock();
//!         let value = guard.read();
//!         guard.unlock();
//!         value
//!     }
//! });
//! guard.unlock();
//! assert_eq!(reader.join().unwrap(), 5);
//!
//! counter
//!     .render(&lockscope::GraphvizCommand::new(), Path::new("counter.svg"))
//!     .unwrap();
//! ```
//!
//! # Who is calling
//!
//! Contexts are tracked explicitly: spawn threads with [`thread::spawn`] and
//! Tokio tasks with [`task::spawn`] so their lineage is known. Any other
//! thread is treated as a root context. For runtimes that can only produce a
//! textual dump of the current execution state, configure a [`StackText`]
//! resolver instead.
//!
//! # Environment
//!
//! | Variable | Effect |
//! |---|---|
//! | `LOCKSCOPE_WAIT_THRESHOLD_US` | Minimum lock wait (µs) that gets annotated in the diagram. Default 1000. |
//! | `LOCKSCOPE_TRACE` | When `1`/`true`, every recorded action is also emitted as a `tracing` debug event. |

mod config;
mod error;
mod log;
mod mutex;
mod sink;

pub use config::*;
pub use error::*;
pub use log::*;
pub use mutex::*;
pub use sink::*;

pub use lockscope_context::{
    ContextResolver, ParsedStack, Propagated, StackSource, StackText, current, parse_stack_text,
    scope, task, thread,
};
pub use lockscope_graph::{
    DotFile, EdgeKind, Graph, GraphOptions, GraphvizCommand, RenderError, Renderer,
};
pub use lockscope_types::{
    Action, ActionKind, CallSite, ContextId, ContextInfo, Timestamp, UNKNOWN_FUNCTION,
};

#[cfg(test)]
mod tests;
