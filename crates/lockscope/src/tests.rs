use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;

fn wait_for_actions<T>(mutex: &Mutex<T>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while mutex.log().len() < count {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {count} actions, have {}",
            mutex.log().len()
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn kinds(actions: &[Action]) -> Vec<&'static str> {
    actions.iter().map(|action| action.kind.as_str()).collect()
}

fn quiet<T>(name: &str, value: T) -> Mutex<T> {
    Mutex::with_config(name, value, Config::new())
}

#[test]
fn handoff_between_threads() {
    let mutex = Arc::new(quiet("handoff", 0u32));

    let guard = mutex.lock();
    guard.set(5);
    let reader = thread::spawn("reader", {
        let mutex = Arc::clone(&mutex);
        move || {
            let guard = mutex.lock();
            let value = guard.read();
            guard.unlock();
            value
        }
    });
    // The reader is blocked once its request is in the log.
    wait_for_actions(&mutex, 4);
    std::thread::sleep(Duration::from_millis(20));
    guard.unlock();
    assert_eq!(reader.join().expect("reader finished"), 5);

    let actions = mutex.snapshot();
    assert_eq!(
        kinds(&actions),
        vec![
            "lock_requested",
            "lock",
            "set",
            "lock_requested",
            "unlock",
            "lock",
            "read",
            "unlock",
        ]
    );

    let writer = actions[0].context;
    let reader = actions[3].context;
    assert_ne!(writer, reader);
    for index in [0, 1, 2, 4] {
        assert_eq!(actions[index].context, writer);
    }
    for index in [3, 5, 6, 7] {
        assert_eq!(actions[index].context, reader);
        assert_eq!(actions[index].parent, Some(writer));
        assert_eq!(actions[index].creator, "reader");
    }
    let waited = actions[5].waited().expect("lock carries its wait");
    assert!(waited >= Duration::from_millis(20), "waited {waited:?}");

    let graph = mutex.graph();
    assert_eq!(graph.lanes, vec![writer, reader]);
    assert_eq!(graph.edges_of(EdgeKind::Branch).count(), 1);
    let contended: Vec<_> = graph
        .edges
        .iter()
        .filter(|edge| {
            edge.label
                .as_deref()
                .is_some_and(|label| label.starts_with("waited "))
        })
        .collect();
    assert!(
        contended
            .iter()
            .any(|edge| edge.to.as_str() == format!("g{reader}_2")),
        "{contended:?}"
    );
    assert!(mutex.to_dot().contains("label=\"handoff\""));
}

#[test]
fn every_operation_is_recorded_once_per_context() {
    const WORKERS: u64 = 4;
    const ROUNDS: u64 = 10;

    let mutex = Arc::new(quiet("counter", 0u64));
    mutex.set(0);
    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let mutex = Arc::clone(&mutex);
            thread::spawn(format!("worker-{worker}"), move || {
                for _ in 0..ROUNDS {
                    let guard = mutex.lock();
                    let value = guard.read();
                    guard.set(value + 1);
                    guard.unlock();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker finished");
    }

    assert_eq!(mutex.read(), WORKERS * ROUNDS);

    let actions = mutex.snapshot();
    // Five per round plus the set and read done by the spawner.
    assert_eq!(actions.len() as u64, WORKERS * ROUNDS * 5 + 2);
    assert!(actions.iter().all(|action| action.start == action.end));
    assert!(
        actions
            .windows(2)
            .all(|pair| pair[0].start <= pair[1].start)
    );

    let mut resorted = actions.clone();
    resorted.sort_by_key(|action| action.start);
    assert_eq!(resorted, actions);

    let mut seqs: Vec<u64> = actions.iter().map(|action| action.seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..actions.len() as u64).collect::<Vec<_>>());

    let mut lineage: HashMap<ContextId, (Option<ContextId>, &str)> = HashMap::new();
    for action in &actions {
        let seen = lineage
            .entry(action.context)
            .or_insert((action.parent, action.creator.as_str()));
        assert_eq!(*seen, (action.parent, action.creator.as_str()));
    }
    assert_eq!(lineage.len() as u64, WORKERS + 1);

    let requested = actions
        .iter()
        .filter(|action| action.kind == ActionKind::LockRequested)
        .count() as u64;
    let ended = actions
        .iter()
        .filter(|action| action.kind.is_lock_attempt_end())
        .count() as u64;
    assert_eq!(requested, WORKERS * ROUNDS);
    assert_eq!(ended, requested);

    let graph = mutex.graph();
    assert_eq!(graph.lanes.len() as u64, WORKERS + 1);
    assert_eq!(graph.edges_of(EdgeKind::Branch).count() as u64, WORKERS);
}

#[test]
fn read_and_set_do_not_take_the_lock() {
    let mutex = quiet("cell", String::from("before"));
    let guard = mutex.lock();
    mutex.set("after".to_owned());
    assert_eq!(mutex.read(), "after");
    guard.unlock();
    assert_eq!(
        kinds(&mutex.snapshot()),
        vec!["lock_requested", "lock", "set", "read", "unlock"]
    );
}

#[test]
fn call_sites_point_at_user_code() {
    let mutex = quiet("sites", 1u8);

    let (guard, lock_line) = (mutex.lock(), line!());
    let (_, read_line) = (guard.read(), line!());
    let ((), unlock_line) = (guard.unlock(), line!());

    let actions = mutex.snapshot();
    let lines: Vec<u32> = actions.iter().map(|action| action.caller.line).collect();
    assert_eq!(lines, vec![lock_line, lock_line, read_line, unlock_line]);
    assert!(actions.iter().all(|action| action.caller.file == file!()));
    let function = concat!(module_path!(), "::call_sites_point_at_user_code");
    assert!(
        actions.iter().all(|action| action.caller.function == function),
        "{actions:#?}"
    );
}

#[test]
fn caller_function_is_the_immediate_caller() {
    fn bump(mutex: &Mutex<u32>) {
        let guard = mutex.lock();
        guard.set(guard.read() + 1);
    }

    let mutex = quiet("counter", 0u32);
    bump(&mutex);
    mutex.set(5);

    let functions: Vec<String> = mutex
        .snapshot()
        .into_iter()
        .map(|action| action.caller.function)
        .collect();
    let helper = concat!(module_path!(), "::caller_function_is_the_immediate_caller::bump");
    let outer = concat!(module_path!(), "::caller_function_is_the_immediate_caller");
    assert_eq!(functions, vec![helper, helper, helper, helper, helper, outer]);
}

#[test]
fn dropped_guard_unlocks_at_the_lock_site() {
    let mutex = quiet("scoped", ());
    let lock_line = {
        let (_guard, line) = (mutex.lock(), line!());
        line
    };
    let actions = mutex.snapshot();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[2].kind, ActionKind::Unlock);
    assert_eq!(actions[2].caller.line, lock_line);
    assert!(mutex.try_lock().is_some(), "lock was released");
}

#[test]
fn leaked_lock_is_released_by_its_token() {
    let mutex = Arc::new(quiet("leaked", 0));
    let leaked = mutex.lock().leak();
    let holder = mutex.snapshot()[1].context;

    let intruder = thread::spawn("intruder", {
        let mutex = Arc::clone(&mutex);
        move || mutex.try_lock().is_none()
    });
    assert!(intruder.join().expect("intruder finished"), "lock stays held");

    let (result, unlock_line) = (mutex.force_unlock(leaked), line!());
    assert_eq!(result, Ok(()));
    let last = mutex.snapshot().pop().expect("unlock recorded");
    assert_eq!(last.kind, ActionKind::Unlock);
    assert_eq!(last.context, holder);
    assert_eq!(last.caller.line, unlock_line);

    mutex.lock().unlock();
}

#[test]
fn stale_release_cannot_end_a_newer_acquisition() {
    let mutex = Arc::new(quiet("reacquired", 0));
    let first = mutex.lock().leak();
    assert_eq!(mutex.force_unlock(first), Ok(()));
    let fresh = mutex.lock();
    let recorded = mutex.log().len();

    // Same context, previous acquisition.
    let context = current();
    assert_eq!(
        mutex.release(1, &context, CallSite::caller()),
        Err(UnlockError::HeldByOther { ticket: 2 })
    );
    assert_eq!(mutex.log().len(), recorded);

    let intruder = thread::spawn("intruder", {
        let mutex = Arc::clone(&mutex);
        move || mutex.try_lock().is_some()
    });
    assert!(
        !intruder.join().expect("intruder finished"),
        "fresh acquisition still excludes others"
    );

    fresh.unlock();
    assert_eq!(
        mutex.release(2, &context, CallSite::caller()),
        Err(UnlockError::NotLocked)
    );
    assert_eq!(
        kinds(&mutex.snapshot())
            .iter()
            .filter(|kind| **kind == "unlock")
            .count(),
        2
    );
}

#[test]
fn foreign_leaked_lock_is_rejected() {
    let left = quiet("left", 0);
    let right = quiet("right", 0);
    let leaked = left.lock().leak();

    assert_eq!(
        right.force_unlock(leaked),
        Err(UnlockError::ForeignLock {
            owner: "left".to_owned()
        })
    );
    assert!(right.log().is_empty());
    assert!(left.try_lock().is_none(), "left stays locked");
}

#[test]
fn timed_out_attempt_is_recorded_as_abandoned() {
    let mutex = Arc::new(quiet("contended", 0));
    let guard = mutex.lock();

    let waiter = thread::spawn("impatient", {
        let mutex = Arc::clone(&mutex);
        move || mutex.try_lock_for(Duration::from_millis(10)).is_none()
    });
    assert!(waiter.join().expect("waiter finished"), "lock was held");
    guard.unlock();

    let actions = mutex.snapshot();
    let abandoned = actions
        .iter()
        .find(|action| matches!(action.kind, ActionKind::LockAbandoned { .. }))
        .expect("abandoned attempt recorded");
    assert_eq!(abandoned.creator, "impatient");
    let waited = abandoned.waited().expect("abandoned carries its wait");
    assert!(waited >= Duration::from_millis(10), "waited {waited:?}");

    let graph = mutex.graph();
    assert!(graph.edges.iter().any(|edge| {
        edge.label
            .as_deref()
            .is_some_and(|label| label.starts_with("gave up after "))
    }));
}

#[test]
fn try_lock_fails_fast_when_held() {
    let mutex = quiet("busy", 0);
    let guard = mutex.try_lock().expect("free lock is taken");
    assert!(mutex.try_lock().is_none());
    guard.unlock();
    assert_eq!(
        kinds(&mutex.snapshot()),
        vec![
            "lock_requested",
            "lock",
            "lock_requested",
            "lock_abandoned",
            "unlock",
        ]
    );
}

#[test]
fn sinks_observe_every_action() {
    let memory = Arc::new(MemorySink::new());
    let config = Config::new()
        .sink(memory.clone())
        .sink(Arc::new(TracingSink));
    let mutex = Mutex::with_config("observed", 0, config);

    mutex.lock().unlock();
    mutex.set(2);

    let seen = memory.take();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|(resource, _)| resource == "observed"));
    let seqs: Vec<u64> = seen.iter().map(|(_, action)| action.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
}

#[test]
fn stack_text_resolver_attributes_actions() {
    let dump = || {
        "task 42 [running]:\n\
         app::worker::run()\n\
         created by app::pool::start in task 7\n"
            .to_owned()
    };
    let mutex = Mutex::with_config("dumped", 0, Config::new().resolver(StackText::new(dump)));
    mutex.set(1);

    let action = &mutex.snapshot()[0];
    assert_eq!(action.context.get(), 42);
    assert_eq!(action.parent.map(ContextId::get), Some(7));
    assert_eq!(action.creator, "app::pool::start");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tasks_are_attributed_to_their_own_context() {
    let mutex = Arc::new(quiet("async", 0));
    let spawner = current();

    let writer = task::spawn("writer", {
        let mutex = Arc::clone(&mutex);
        async move {
            tokio::task::yield_now().await;
            let guard = mutex.lock();
            guard.set(3);
            guard.unlock();
            current()
        }
    });
    let writer = writer.await.expect("writer finished");

    assert_eq!(writer.parent, Some(spawner.id));
    let actions = mutex.snapshot();
    assert_eq!(actions.len(), 4);
    assert!(actions.iter().all(|action| action.context == writer.id));
    assert!(actions.iter().all(|action| action.creator == "writer"));
}

#[test]
fn exports_and_renders() {
    let mutex = quiet("exported", 0);
    mutex.lock().unlock();

    let json = mutex.log().to_json().expect("serializes");
    assert!(json.contains("lock_requested"), "{json}");

    let output = std::env::temp_dir().join(format!(
        "lockscope-{}-exported.svg",
        std::process::id()
    ));
    mutex.render(&DotFile, &output).expect("render succeeds");
    let dot_path = output.with_extension("dot");
    let written = std::fs::read_to_string(&dot_path).expect("description written");
    assert_eq!(written, mutex.to_dot());
    assert!(output.exists());
    let _ = std::fs::remove_file(&output);
    let _ = std::fs::remove_file(&dot_path);
}

#[test]
fn failed_render_reports_the_program() {
    let mutex = quiet("unrendered", 0);
    mutex.set(1);
    let output = std::env::temp_dir().join(format!(
        "lockscope-{}-unrendered.svg",
        std::process::id()
    ));
    let err = mutex
        .render(
            &GraphvizCommand::new().program("lockscope-no-such-layout-program"),
            &output,
        )
        .expect_err("program is missing");
    assert!(matches!(err, RenderError::Spawn { .. }), "{err}");
    let _ = std::fs::remove_file(output.with_extension("dot"));
}
