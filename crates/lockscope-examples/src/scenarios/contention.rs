use lockscope::Mutex;
use std::sync::Arc;
use std::time::Duration;

const WORKERS: u32 = 4;
const ROUNDS: u32 = 3;
const WORK: Duration = Duration::from_millis(2);

/// Blocking workers on Tokio's pool take turns incrementing a counter.
pub async fn run() -> Result<Arc<Mutex<u32>>, String> {
    let counter = Arc::new(Mutex::new("demo.counter", 0u32));
    counter.set(0);

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let counter = Arc::clone(&counter);
            lockscope::task::spawn_blocking(format!("demo.worker.{worker}"), move || {
                for _ in 0..ROUNDS {
                    let guard = counter.lock();
                    let value = guard.read();
                    std::thread::sleep(WORK);
                    guard.set(value + 1);
                    guard.unlock();
                }
            })
        })
        .collect();

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("worker failed: {e}"))?;
    }

    let total = counter.read();
    tracing::info!(total, "all workers done");
    if total != WORKERS * ROUNDS {
        return Err(format!(
            "counter ended at {total}, expected {}",
            WORKERS * ROUNDS
        ));
    }
    Ok(counter)
}
