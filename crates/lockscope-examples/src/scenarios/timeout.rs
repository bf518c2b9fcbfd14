use lockscope::Mutex;
use std::sync::{Arc, Barrier};
use std::time::Duration;

const HOLD: Duration = Duration::from_millis(50);
const PATIENCE: Duration = Duration::from_millis(10);

/// A holder keeps the lock longer than the main thread is willing to wait.
/// The first attempt gives up; the second one blocks until the holder is done.
pub fn run() -> Result<Arc<Mutex<u32>>, String> {
    let shared = Arc::new(Mutex::new("demo.timeout", 1u32));
    let locked = Arc::new(Barrier::new(2));

    let holder = lockscope::thread::try_spawn("demo.holder", {
        let shared = Arc::clone(&shared);
        let locked = Arc::clone(&locked);
        move || {
            let guard = shared.lock();
            locked.wait();
            std::thread::sleep(HOLD);
            guard.set(2);
            guard.unlock();
        }
    })
    .map_err(|e| format!("failed to spawn holder: {e}"))?;

    locked.wait();
    if let Some(guard) = shared.try_lock_for(PATIENCE) {
        guard.unlock();
        return Err("lock was free while the holder should have it".to_owned());
    }
    tracing::info!(patience = ?PATIENCE, "gave up waiting, blocking instead");

    let guard = shared.lock();
    let value = guard.read();
    guard.unlock();
    holder
        .join()
        .map_err(|_| "holder thread panicked".to_owned())?;

    if value != 2 {
        return Err(format!("read {value} after the holder finished, expected 2"));
    }
    Ok(shared)
}
