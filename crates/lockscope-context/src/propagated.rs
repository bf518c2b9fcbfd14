use std::cell::RefCell;

use lockscope_types::{ContextId, ContextInfo};

use crate::ContextResolver;

tokio::task_local! {
    pub(crate) static TASK_CONTEXT: ContextInfo;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<ContextInfo>> = const { RefCell::new(None) };
}

pub(crate) fn fresh_id() -> ContextId {
    ContextId::next_process_local()
        .unwrap_or_else(|err| panic!("invariant violated: context id space exhausted: {err}"))
}

/// Context of the caller.
///
/// Looks at the Tokio task-local first, then the thread-local. A thread with
/// neither is assigned a new root context, which it keeps from then on.
pub fn current() -> ContextInfo {
    if let Ok(info) = TASK_CONTEXT.try_with(ContextInfo::clone) {
        return info;
    }
    THREAD_CONTEXT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(info) = slot.as_ref() {
            return info.clone();
        }
        let info = ContextInfo::root(fresh_id());
        tracing::trace!(context = %info.id, "assigned root context to thread");
        *slot = Some(info.clone());
        info
    })
}

/// Allocates a new context whose parent is the caller's context.
pub fn child_of_current(creator: impl Into<String>) -> ContextInfo {
    ContextInfo::child(fresh_id(), current().id, creator)
}

/// Runs `f` with `info` installed as the current thread's context.
///
/// The previous context is restored afterwards, even if `f` panics.
pub fn scope<R>(info: ContextInfo, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<ContextInfo>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            THREAD_CONTEXT.with(|slot| *slot.borrow_mut() = previous);
        }
    }

    let previous = THREAD_CONTEXT.with(|slot| slot.borrow_mut().replace(info));
    let _restore = Restore(previous);
    f()
}

/// Resolver backed by explicit propagation through the spawn helpers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Propagated;

impl ContextResolver for Propagated {
    fn resolve(&self) -> ContextInfo {
        current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_stable_on_one_thread() {
        let first = current();
        let second = current();
        assert_eq!(first, second);
    }

    #[test]
    fn fresh_threads_become_roots() {
        let info = std::thread::spawn(current).join().expect("thread joins");
        assert!(info.is_root());
        assert_eq!(info.creator, "root");
    }

    #[test]
    fn scope_installs_and_restores() {
        let outer = current();
        let inner = child_of_current("worker");
        assert_eq!(inner.parent, Some(outer.id));

        let seen = scope(inner.clone(), current);
        assert_eq!(seen, inner);
        assert_eq!(current(), outer);
    }

    #[test]
    fn scope_restores_after_panic() {
        let outer = current();
        let inner = child_of_current("doomed");
        let result: Result<(), _> = std::panic::catch_unwind(|| scope(inner, || panic!("boom")));
        assert!(result.is_err());
        assert_eq!(current(), outer);
    }

    #[test]
    fn propagated_resolver_reads_current() {
        assert_eq!(Propagated.resolve(), current());
    }
}
