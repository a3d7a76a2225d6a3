//! One-shot timers with cancellation.
//!
//! A scheduled task runs at most once. Cancelling a handle before the delay
//! elapses guarantees the task never runs: firing and cancelling race on a
//! single atomic flag, and whichever side flips it first wins.
//!
//! Connection timers never touch connection state directly. Their task only
//! queues a `Timeout` event, and the state machine discards it if the timer
//! lost a race with a real event.

use crate::errors::{ConnectionError, ConnectionResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Work executed when a timer fires
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Source of delayed callbacks
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`, unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, task: TimerTask) -> ConnectionResult<TimerHandle>;
}

/// Handle to a scheduled task. Dropping the handle cancels the timer.
pub struct TimerHandle {
    done: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Build a handle around a completion flag shared with the firing side.
    pub fn new(done: Arc<AtomicBool>, join: Option<JoinHandle<()>>) -> Self {
        TimerHandle { done, join }
    }

    /// Cancel the timer. Returns `true` if this call prevented the task from running.
    pub fn cancel(&self) -> bool {
        let prevented = !self.done.swap(true, Ordering::AcqRel);
        if let Some(join) = &self.join {
            join.abort();
        }
        prevented
    }

    /// Whether the task has run or been cancelled
    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// [`Scheduler`] backed by tokio timers on whatever runtime is current at
/// `schedule` time
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        TokioScheduler
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> ConnectionResult<TimerHandle> {
        let runtime = Handle::try_current()
            .map_err(|e| ConnectionError::scheduling(format!("no tokio runtime: {}", e)))?;

        let done = Arc::new(AtomicBool::new(false));
        let fired = done.clone();
        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !fired.swap(true, Ordering::AcqRel) {
                trace!("Timer fired after {:?}", delay);
                task();
            }
        });

        Ok(TimerHandle::new(done, Some(join)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> TimerTask {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .schedule(Duration::from_millis(100), counting_task(&counter))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert!(!handle.cancel(), "cancel after firing must report nothing prevented");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler
            .schedule(Duration::from_millis(100), counting_task(&counter))
            .unwrap();
        assert!(handle.cancel());
        assert!(!handle.cancel());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        drop(scheduler.schedule(Duration::from_millis(10), counting_task(&counter)).unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn scheduling_without_runtime_fails() {
        let scheduler = TokioScheduler::new();
        let err = scheduler
            .schedule(Duration::from_millis(10), Box::new(|| {}))
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Scheduling);
    }
}
