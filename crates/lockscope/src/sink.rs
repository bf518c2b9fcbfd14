use lockscope_types::Action;

/// Observes actions as they are appended to an event log.
///
/// Called on the acting context right after the action is sequenced, outside
/// the log's lock. Implementations must not block for long: the caller is in
/// the middle of a lock operation.
pub trait ActionSink: Send + Sync + 'static {
    fn on_action(&self, resource: &str, action: &Action);
}

/// Emits every action as a `tracing` debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ActionSink for TracingSink {
    fn on_action(&self, resource: &str, action: &Action) {
        tracing::debug!(
            resource,
            seq = action.seq,
            kind = action.kind.as_str(),
            at_ns = action.start.as_nanos(),
            context = %action.context,
            parent = ?action.parent.map(|parent| parent.get()),
            creator = %action.creator,
            function = %action.caller.function,
            caller = %action.caller,
            waited_ns = ?action.waited().map(|waited| waited.as_nanos()),
            "recorded action"
        );
    }
}

/// Keeps a copy of every action it sees, tagged with the resource name.
#[derive(Debug, Default)]
pub struct MemorySink {
    seen: parking_lot::Mutex<Vec<(String, Action)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Drains everything seen so far, in arrival order.
    pub fn take(&self) -> Vec<(String, Action)> {
        std::mem::take(&mut *self.seen.lock())
    }
}

impl ActionSink for MemorySink {
    fn on_action(&self, resource: &str, action: &Action) {
        self.seen.lock().push((resource.to_owned(), action.clone()));
    }
}
