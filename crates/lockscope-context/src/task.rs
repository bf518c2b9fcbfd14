//! Tokio tasks that carry their lineage.
//!
//! The context lives in a task-local, so it follows the task across worker
//! threads and survives `.await` points.

use std::future::Future;

use lockscope_types::{CallSite, ContextInfo};

use crate::propagated::{TASK_CONTEXT, child_of_current, scope};

/// Spawns a Tokio task whose context is a child of the caller's.
#[track_caller]
pub fn spawn<F>(name: impl Into<String>, future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let info = child_of_current(name);
    log_spawn(&info, "spawning task");
    tokio::spawn(TASK_CONTEXT.scope(info, future))
}

/// Like [`spawn`], with the spawning function's path as the creator name.
#[track_caller]
pub fn spawn_unnamed<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn(CallSite::caller().function, future)
}

/// Runs blocking work on Tokio's blocking pool as a child context.
#[track_caller]
pub fn spawn_blocking<F, R>(name: impl Into<String>, f: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let info = child_of_current(name);
    log_spawn(&info, "spawning blocking task");
    tokio::task::spawn_blocking(move || scope(info, f))
}

/// Wraps `future` so it runs with `info` as its context.
///
/// For executors other than Tokio's `spawn`, or to adopt a context built by hand.
pub async fn with_context<F: Future>(info: ContextInfo, future: F) -> F::Output {
    TASK_CONTEXT.scope(info, future).await
}

#[track_caller]
fn log_spawn(info: &ContextInfo, message: &'static str) {
    tracing::debug!(
        context = %info.id,
        parent = ?info.parent.map(|p| p.get()),
        creator = %info.creator,
        site = %CallSite::caller(),
        "{message}"
    );
}
