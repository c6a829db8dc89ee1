// SPDX-License-Identifier: GPL-3.0-only
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

type Action<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending<T> {
    /// Bumped by every call, cancel and flush; a timer only fires for its own generation
    generation: u64,
    value: Option<T>,
    timer: Option<JoinHandle<()>>,
}

/// Trailing-edge debouncer: each `call` replaces the pending argument and
/// restarts the delay, so only the last argument of a burst is acted on.
///
/// Once an invocation has started it is detached from the debouncer and runs
/// to completion; `cancel` and later calls only affect what is still waiting.
pub struct Debouncer<T> {
    delay: Duration,
    action: Action<T>,
    pending: Arc<Mutex<Pending<T>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            delay,
            action: Arc::new(move |value| action(value).boxed()),
            pending: Arc::new(Mutex::new(Pending {
                generation: 0,
                value: None,
                timer: None,
            })),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `value`, replacing anything still waiting. Must be called
    /// inside a Tokio runtime.
    pub fn call(&self, value: T) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.generation += 1;
        pending.value = Some(value);
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        let generation = pending.generation;
        let shared = Arc::clone(&self.pending);
        let action = Arc::clone(&self.action);
        let delay = self.delay;

        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let value = {
                let mut pending = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if pending.generation != generation {
                    return;
                }
                // Dropping our own handle detaches this task, so nothing can abort it past here
                pending.timer = None;
                pending.value.take()
            };

            if let Some(value) = value {
                action(value).await;
            }
        }));
    }

    /// Drop the pending invocation, returning whether there was one
    pub fn cancel(&self) -> bool {
        self.take_pending().is_some()
    }

    /// Run the pending invocation now instead of waiting out the delay.
    /// Returns `false` when nothing was pending.
    pub async fn flush(&self) -> bool {
        match self.take_pending() {
            Some(value) => {
                (self.action)(value).await;
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.value.is_some()
    }

    fn take_pending(&self) -> Option<T> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.value.take()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, sleep};

    fn recording(delay: Duration) -> (Debouncer<&'static str>, Arc<Mutex<Vec<(&'static str, Duration)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let sink = calls.clone();
        let debouncer = Debouncer::new(delay, move |value| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push((value, start.elapsed()));
            }
        });
        (debouncer, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_last_value() {
        let (debouncer, calls) = recording(Duration::from_millis(2000));

        debouncer.call("a");
        sleep(Duration::from_millis(500)).await;
        debouncer.call("b");
        sleep(Duration::from_millis(500)).await;
        debouncer.call("c");
        assert!(debouncer.is_pending());

        sleep(Duration::from_millis(1900)).await;
        assert!(calls.lock().unwrap().is_empty());

        sleep(Duration::from_millis(200)).await;
        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "c");
        assert_eq!(calls[0].1, Duration::from_millis(3000));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_each_fire() {
        let (debouncer, calls) = recording(Duration::from_millis(100));

        debouncer.call("first");
        sleep(Duration::from_millis(150)).await;
        debouncer.call("second");
        sleep(Duration::from_millis(150)).await;

        let values: Vec<_> = calls.lock().unwrap().iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending() {
        let (debouncer, calls) = recording(Duration::from_millis(100));

        debouncer.call("dropped");
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        sleep(Duration::from_millis(500)).await;
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_immediately() {
        let (debouncer, calls) = recording(Duration::from_millis(2000));

        assert!(!debouncer.flush().await);

        debouncer.call("now");
        assert!(debouncer.flush().await);
        assert_eq!(calls.lock().unwrap().as_slice(), &[("now", Duration::ZERO)]);

        // The timer that was armed must not fire a second time
        sleep(Duration::from_millis(3000)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_does_not_abort_running_invocation() {
        let finished = Arc::new(Mutex::new(false));
        let flag = finished.clone();
        let debouncer = Debouncer::new(Duration::from_millis(10), move |_: ()| {
            let flag = flag.clone();
            async move {
                sleep(Duration::from_millis(100)).await;
                *flag.lock().unwrap() = true;
            }
        });

        debouncer.call(());
        sleep(Duration::from_millis(20)).await;
        assert!(!debouncer.cancel());

        sleep(Duration::from_millis(200)).await;
        assert!(*finished.lock().unwrap());
    }
}
