use lockscope::Mutex;
use std::sync::Arc;
use std::time::Duration;

const HOLD: Duration = Duration::from_millis(25);

/// The main thread stores a value while holding the lock, a reader thread
/// waits for it and reads it back.
pub fn run() -> Result<Arc<Mutex<u32>>, String> {
    let shared = Arc::new(Mutex::new("demo.handoff", 0u32));

    let guard = shared.lock();
    guard.set(5);

    let reader = lockscope::thread::try_spawn("demo.reader", {
        let shared = Arc::clone(&shared);
        move || {
            let guard = shared.lock();
            let value = guard.read();
            guard.unlock();
            value
        }
    })
    .map_err(|e| format!("failed to spawn reader: {e}"))?;

    std::thread::sleep(HOLD);
    guard.unlock();

    let value = reader
        .join()
        .map_err(|_| "reader thread panicked".to_owned())?;
    tracing::info!(value, "reader saw the stored value");
    if value != 5 {
        return Err(format!("reader saw {value}, expected 5"));
    }
    Ok(shared)
}
