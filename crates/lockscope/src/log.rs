use std::sync::Arc;

use lockscope_types::Action;

use crate::{ActionSink, ExportError};

/// Append-only, concurrency-safe record of the actions on one resource.
///
/// The log has its own lock, independent of the resource it observes, so
/// appending never interferes with the lock being measured.
pub struct EventLog {
    resource: String,
    actions: parking_lot::Mutex<Vec<Action>>,
    sinks: Vec<Arc<dyn ActionSink>>,
}

impl EventLog {
    pub fn new(resource: impl Into<String>) -> Self {
        Self::with_sinks(resource, Vec::new())
    }

    pub fn with_sinks(resource: impl Into<String>, sinks: Vec<Arc<dyn ActionSink>>) -> Self {
        Self {
            resource: resource.into(),
            actions: parking_lot::Mutex::new(Vec::new()),
            sinks,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Stamps `action` with the next sequence number and records it.
    ///
    /// Sinks run after the log's lock is released.
    pub fn append(&self, mut action: Action) {
        if self.sinks.is_empty() {
            let mut actions = self.actions.lock();
            action.seq = actions.len() as u64;
            actions.push(action);
            return;
        }

        let recorded = {
            let mut actions = self.actions.lock();
            action.seq = actions.len() as u64;
            actions.push(action.clone());
            action
        };
        for sink in &self.sinks {
            sink.on_action(&self.resource, &recorded);
        }
    }

    /// Copy of every action recorded so far, sorted by start time.
    ///
    /// The sort is stable: actions that start at the same instant stay in
    /// append order.
    pub fn snapshot(&self) -> Vec<Action> {
        let mut actions = self.actions.lock().clone();
        actions.sort_by_key(|action| action.start);
        actions
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// The snapshot as a JSON array.
    pub fn to_json(&self) -> Result<String, ExportError> {
        let actions = self.snapshot();
        facet_json::to_string(&actions).map_err(|err| ExportError(err.to_string()))
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("resource", &self.resource)
            .field("actions", &self.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;
    use lockscope_types::{ActionKind, CallSite, ContextId, ContextInfo, Timestamp};

    fn action(kind: ActionKind, at: u64) -> Action {
        let context = ContextInfo::root(ContextId::new(1).expect("valid id"));
        Action::new(kind, Timestamp::from_nanos(at), &context, CallSite::caller())
    }

    #[test]
    fn append_assigns_sequence_numbers_in_arrival_order() {
        let log = EventLog::new("m");
        log.append(action(ActionKind::LockRequested, 30));
        log.append(action(ActionKind::Read, 10));
        log.append(action(ActionKind::Set, 20));

        let snapshot = log.snapshot();
        let order: Vec<(u64, u64)> = snapshot
            .iter()
            .map(|action| (action.seq, action.start.as_nanos()))
            .collect();
        assert_eq!(order, vec![(1, 10), (2, 20), (0, 30)]);
    }

    #[test]
    fn snapshot_keeps_append_order_for_equal_starts() {
        let log = EventLog::new("m");
        log.append(action(ActionKind::Set, 5));
        log.append(action(ActionKind::Read, 5));
        log.append(action(ActionKind::Unlock, 5));

        let kinds: Vec<ActionKind> = log.snapshot().iter().map(|action| action.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::Set, ActionKind::Read, ActionKind::Unlock]
        );
        assert_eq!(log.snapshot(), log.snapshot());
    }

    #[test]
    fn sinks_see_every_append_with_its_sequence() {
        let memory = Arc::new(MemorySink::new());
        let log = EventLog::with_sinks("shared", vec![memory.clone()]);
        log.append(action(ActionKind::Set, 1));
        log.append(action(ActionKind::Read, 2));

        let seen = memory.take();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(resource, _)| resource == "shared"));
        assert_eq!(seen[1].1.seq, 1);
        assert!(memory.is_empty());
    }

    #[test]
    fn exports_json_array() {
        let log = EventLog::new("m");
        assert!(log.is_empty());
        log.append(action(ActionKind::Set, 1));
        let json = log.to_json().expect("serializes");
        assert!(json.starts_with('['), "{json}");
        assert!(json.contains("set"), "{json}");
        assert_eq!(log.len(), 1);
    }
}
