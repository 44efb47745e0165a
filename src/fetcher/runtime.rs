//! One long-lived async runtime per worker thread.
//!
//! Pool workers are plain OS threads. The first network call on a worker
//! builds a current-thread tokio runtime and parks it in thread-local
//! storage; later calls on the same worker reuse it. Runtimes are never
//! shared between threads.

use crate::errors::{SwarmError, SwarmResult};
use std::cell::RefCell;
use std::future::Future;
use tokio::runtime::{Builder, Runtime};

thread_local! {
    static WORKER_RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

/// Drive `future` to completion on this thread's runtime.
///
/// Fails when called from inside an async context, where blocking would
/// stall the caller's executor.
pub fn block_on_worker<F: Future>(future: F) -> SwarmResult<F::Output> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(SwarmError::Runtime(
            "cannot block on the worker runtime from inside an async context".to_string(),
        ));
    }

    WORKER_RUNTIME.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| SwarmError::Runtime(e.to_string()))?;
            log::debug!(
                "Started async runtime on worker {}",
                std::thread::current().name().unwrap_or("<unnamed>")
            );
            *slot = Some(runtime);
        }

        match slot.as_ref() {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(SwarmError::Runtime("worker runtime unavailable".to_string())),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_future_on_plain_thread() {
        let value = block_on_worker(async { 21 * 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_runtime_is_reused_on_same_thread() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        block_on_worker(async move {
            tokio::spawn(async move {
                let _ = tx.send(7);
            });
        })
        .unwrap();

        // The spawned task only survives if the second call sees the same runtime
        let value = block_on_worker(rx).unwrap().unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_each_thread_builds_its_own_runtime() {
        let handles: Vec<_> = (0..4)
            .map(|i| std::thread::spawn(move || block_on_worker(async move { i * 10 }).unwrap()))
            .collect();
        let values: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30]);
    }

    #[tokio::test]
    async fn test_rejects_nested_blocking() {
        let result = block_on_worker(async { 1 });
        assert!(matches!(result, Err(SwarmError::Runtime(_))));
    }
}
