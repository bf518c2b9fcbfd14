//! Answers "who is calling?" for lockscope instrumentation.
//!
//! Every instrumented operation needs the identity of the execution context
//! performing it, the context that spawned it, and what spawned it. The
//! default [`Propagated`] resolver tracks this explicitly: [`thread::spawn`]
//! and [`task::spawn`] allocate a child context and install it in the new
//! thread (thread-local) or task (Tokio task-local). Threads that were never
//! spawned through these helpers get a fresh root identity the first time
//! they ask.
//!
//! [`StackText`] is a fallback for environments that can only hand out a
//! textual dump of the current execution state.

use lockscope_types::ContextInfo;

mod propagated;
mod stack_text;
pub mod task;
pub mod thread;

pub use propagated::*;
pub use stack_text::*;

/// Resolves the identity of the calling execution context.
///
/// Must be called synchronously on the context being resolved. Never fails:
/// when lineage cannot be determined the context is reported as a root.
pub trait ContextResolver: Send + Sync + 'static {
    fn resolve(&self) -> ContextInfo;
}
