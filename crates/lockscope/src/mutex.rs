use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lockscope_context::ContextResolver;
use lockscope_graph::{DotFile, Graph, GraphOptions, RenderError, Renderer};
use lockscope_types::{Action, ActionKind, CallSite, ContextInfo, Timestamp};
use parking_lot::lock_api::{RawMutex as _, RawMutexTimed as _};

use crate::{Config, EventLog, UnlockError};

/// Nobody holds the lock. Tickets start at 1.
const UNHELD: u64 = 0;

/// A mutual-exclusion lock around a value, recording every operation.
///
/// The measured lock and the value are separate: [`read`](Self::read) and
/// [`set`](Self::set) never take the measured lock, so it is up to the
/// caller to hold it around them when exclusivity matters. This keeps the
/// recorded lock timings exactly what user code asked for.
pub struct Mutex<T> {
    raw: parking_lot::RawMutex,
    /// Ticket of the current acquisition, [`UNHELD`] when free.
    holder: AtomicU64,
    next_ticket: AtomicU64,
    value: parking_lot::Mutex<T>,
    log: EventLog,
    resolver: Arc<dyn ContextResolver>,
    graph: GraphOptions,
}

impl<T> Mutex<T> {
    /// Configured from the `LOCKSCOPE_*` environment; falls back to defaults
    /// (with a warning) when the environment is malformed.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        let config = Config::from_env().unwrap_or_else(|err| {
            tracing::warn!(%err, "ignoring lockscope environment");
            Config::default()
        });
        Self::with_config(name, value, config)
    }

    pub fn with_config(name: impl Into<String>, value: T, config: Config) -> Self {
        let name = name.into();
        let mut graph = config.graph;
        graph.resource_label = name.clone();
        Self {
            raw: parking_lot::RawMutex::INIT,
            holder: AtomicU64::new(UNHELD),
            next_ticket: AtomicU64::new(1),
            value: parking_lot::Mutex::new(value),
            log: EventLog::with_sinks(name, config.sinks),
            resolver: config.resolver,
            graph,
        }
    }

    pub fn name(&self) -> &str {
        self.log.resource()
    }

    /// Blocks until the lock is held by the calling context.
    ///
    /// Records `LockRequested` before blocking and `LockAcquired` once held.
    /// There is no re-entrancy: locking twice from one context deadlocks.
    #[track_caller]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.lock_with_source(CallSite::caller())
    }

    pub fn lock_with_source(&self, source: CallSite) -> MutexGuard<'_, T> {
        let acquired = self.attempt(source, |raw| {
            raw.lock();
            true
        });
        match acquired {
            Some(guard) => guard,
            None => unreachable!("a blocking lock cannot give up"),
        }
    }

    /// Like [`lock`](Self::lock), but gives up after `timeout`.
    ///
    /// A failed attempt is recorded as `LockAbandoned`.
    #[track_caller]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, T>> {
        self.try_lock_for_with_source(timeout, CallSite::caller())
    }

    pub fn try_lock_for_with_source(
        &self,
        timeout: Duration,
        source: CallSite,
    ) -> Option<MutexGuard<'_, T>> {
        self.attempt(source, |raw| raw.try_lock_for(timeout))
    }

    /// Takes the lock only if it is free right now.
    #[track_caller]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.try_lock_with_source(CallSite::caller())
    }

    pub fn try_lock_with_source(&self, source: CallSite) -> Option<MutexGuard<'_, T>> {
        self.attempt(source, |raw| raw.try_lock())
    }

    fn attempt(
        &self,
        source: CallSite,
        acquire: impl FnOnce(&parking_lot::RawMutex) -> bool,
    ) -> Option<MutexGuard<'_, T>> {
        let context = self.resolver.resolve();
        let requested = Timestamp::now();
        self.log.append(Action::new(
            ActionKind::LockRequested,
            requested,
            &context,
            source.clone(),
        ));

        if !acquire(&self.raw) {
            let gave_up = Timestamp::now();
            let waited = gave_up.saturating_duration_since(requested);
            self.log.append(Action::new(
                ActionKind::abandoned_after(waited),
                gave_up,
                &context,
                source,
            ));
            return None;
        }

        let acquired = Timestamp::now();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.holder.store(ticket, Ordering::Release);
        let waited = acquired.saturating_duration_since(requested);
        self.log.append(Action::new(
            ActionKind::acquired_after(waited),
            acquired,
            &context,
            source.clone(),
        ));
        Some(MutexGuard {
            mutex: self,
            ticket,
            context,
            locked_at: source,
            released: false,
            _not_send: PhantomData,
        })
    }

    /// Releases a lock whose guard was [leaked](MutexGuard::leak).
    ///
    /// `lock` must come from this mutex. A token from another mutex is
    /// rejected, nothing is recorded, and that other mutex stays locked.
    #[track_caller]
    pub fn force_unlock(&self, lock: LeakedLock<'_, T>) -> Result<(), UnlockError> {
        self.force_unlock_with_source(lock, CallSite::caller())
    }

    pub fn force_unlock_with_source(
        &self,
        lock: LeakedLock<'_, T>,
        source: CallSite,
    ) -> Result<(), UnlockError> {
        if !std::ptr::eq(lock.mutex, self) {
            return Err(UnlockError::ForeignLock {
                owner: lock.mutex.name().to_owned(),
            });
        }
        let context = self.resolver.resolve();
        self.release(lock.ticket, &context, source)
    }

    /// Ends the acquisition identified by `ticket`, if it still holds the lock.
    pub(crate) fn release(
        &self,
        ticket: u64,
        context: &ContextInfo,
        source: CallSite,
    ) -> Result<(), UnlockError> {
        let released = Timestamp::now();
        match self
            .holder
            .compare_exchange(ticket, UNHELD, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                // SAFETY: `ticket` is the live acquisition, owned by a guard or
                // leaked token that is `!Send`, so this runs on the locking
                // thread and exactly once for that acquisition.
                unsafe { self.raw.unlock() };
                self.log
                    .append(Action::new(ActionKind::Unlock, released, context, source));
                Ok(())
            }
            Err(UNHELD) => Err(UnlockError::NotLocked),
            Err(holder) => Err(UnlockError::HeldByOther { ticket: holder }),
        }
    }

    /// Copy of the current value. Does not take the measured lock.
    #[track_caller]
    pub fn read(&self) -> T
    where
        T: Clone,
    {
        self.read_with_source(CallSite::caller())
    }

    pub fn read_with_source(&self, source: CallSite) -> T
    where
        T: Clone,
    {
        self.record(ActionKind::Read, source);
        self.value.lock().clone()
    }

    /// Replaces the value. Does not take the measured lock.
    #[track_caller]
    pub fn set(&self, value: T) {
        self.set_with_source(value, CallSite::caller());
    }

    pub fn set_with_source(&self, value: T, source: CallSite) {
        self.record(ActionKind::Set, source);
        let previous = std::mem::replace(&mut *self.value.lock(), value);
        drop(previous);
    }

    fn record(&self, kind: ActionKind, source: CallSite) {
        let context = self.resolver.resolve();
        self.log
            .append(Action::new(kind, Timestamp::now(), &context, source));
    }

    /// Every action recorded so far, sorted by start time.
    pub fn snapshot(&self) -> Vec<Action> {
        self.log.snapshot()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn graph(&self) -> Graph {
        lockscope_graph::build(&self.snapshot(), &self.graph)
    }

    pub fn to_dot(&self) -> String {
        self.graph().to_dot()
    }

    /// Renders the diagram to `output` and keeps the DOT description next
    /// to it, with a `.dot` extension.
    pub fn render(&self, renderer: &dyn Renderer, output: &Path) -> Result<(), RenderError> {
        let description = self.to_dot();
        let dot_path = output.with_extension("dot");
        if dot_path != output {
            DotFile.render(&description, &dot_path)?;
        }
        renderer.render(&description, output)
    }

    /// Consumes the mutex without recording anything.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let holder = self.holder.load(Ordering::Relaxed);
        f.debug_struct("Mutex")
            .field("name", &self.name())
            .field("holder", &(holder != UNHELD).then_some(holder))
            .field("actions", &self.log.len())
            .finish_non_exhaustive()
    }
}

/// Proof that the calling context holds a [`Mutex`].
///
/// Dropping the guard unlocks and attributes the unlock to the site that
/// took the lock; call [`unlock`](Self::unlock) to record the exact site.
#[must_use = "dropping the guard unlocks the mutex immediately"]
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    ticket: u64,
    context: ContextInfo,
    locked_at: CallSite,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// The context that took the lock.
    pub fn context(&self) -> &ContextInfo {
        &self.context
    }

    #[track_caller]
    pub fn unlock(mut self) {
        self.unlock_with_source(CallSite::caller());
    }

    fn unlock_with_source(&mut self, source: CallSite) {
        self.released = true;
        if let Err(err) = self.mutex.release(self.ticket, &self.context, source) {
            tracing::warn!(
                resource = self.mutex.name(),
                context = %self.context.id,
                ticket = self.ticket,
                %err,
                "guard no longer holds the lock"
            );
        }
    }

    #[track_caller]
    pub fn read(&self) -> T
    where
        T: Clone,
    {
        self.mutex.read_with_source(CallSite::caller())
    }

    #[track_caller]
    pub fn set(&self, value: T) {
        self.mutex.set_with_source(value, CallSite::caller());
    }

    /// Keeps the lock held past the guard's lifetime.
    ///
    /// Nothing is released until the returned token is handed to
    /// [`Mutex::force_unlock`]. Dropping the token leaves the mutex locked.
    pub fn leak(mut self) -> LeakedLock<'a, T> {
        self.released = true;
        LeakedLock {
            mutex: self.mutex,
            ticket: self.ticket,
            _not_send: PhantomData,
        }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if !self.released {
            let source = self.locked_at.clone();
            self.unlock_with_source(source);
        }
    }
}

impl<T> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard")
            .field("resource", &self.mutex.name())
            .field("context", &self.context.id)
            .field("ticket", &self.ticket)
            .finish()
    }
}

/// One acquisition of a [`Mutex`] whose guard was leaked.
///
/// Like the guard, it stays on the thread that took the lock.
#[must_use = "the mutex stays locked until this is passed to `Mutex::force_unlock`"]
pub struct LeakedLock<'a, T> {
    mutex: &'a Mutex<T>,
    ticket: u64,
    _not_send: PhantomData<*const ()>,
}

impl<T> fmt::Debug for LeakedLock<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakedLock")
            .field("resource", &self.mutex.name())
            .field("ticket", &self.ticket)
            .finish()
    }
}
