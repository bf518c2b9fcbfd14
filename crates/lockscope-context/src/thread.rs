//! OS threads that carry their lineage.

use std::io;
use std::thread::JoinHandle;

use lockscope_types::CallSite;

use crate::propagated::{child_of_current, scope};

/// Spawns a named thread whose context is a child of the caller's.
///
/// Panics if the OS refuses to create the thread, like [`std::thread::spawn`].
#[track_caller]
pub fn spawn<F, T>(name: impl Into<String>, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    try_spawn(name, f).unwrap_or_else(|err| panic!("failed to spawn thread: {err}"))
}

/// Like [`spawn`], with the spawning function's path as the creator name.
#[track_caller]
pub fn spawn_unnamed<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn(CallSite::caller().function, f)
}

/// Like [`spawn`], but returns the OS error instead of panicking.
#[track_caller]
pub fn try_spawn<F, T>(name: impl Into<String>, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let info = child_of_current(name);
    tracing::debug!(
        context = %info.id,
        parent = ?info.parent.map(|p| p.get()),
        creator = %info.creator,
        site = %CallSite::caller(),
        "spawning thread"
    );
    std::thread::Builder::new()
        .name(info.creator.clone())
        .spawn(move || scope(info, f))
}
