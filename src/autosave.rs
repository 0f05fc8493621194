//! Recurring background flush owned by an editing session.
//!
//! The task is aborted when stopped, restarted, or when the `Autosave` is dropped, so no
//! recurring invocation outlives its owner. Flush errors are logged and swallowed.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Result;

/// What the scheduler should do after a flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flush {
    Continue,
    /// The document is gone or terminal; end the task.
    Stop,
}

/// Aborts the wrapped task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Autosave {
    period: Duration,
    task: Option<TaskGuard>,
}

impl Autosave {
    pub fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.0.is_finished())
    }

    /// Arm the timer from zero; the first flush happens one full period from now.
    /// Any previously running task is cancelled first.
    pub fn start<F, Fut>(&mut self, mut flush: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Flush>> + Send + 'static,
    {
        self.stop();
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match flush().await {
                    Ok(Flush::Continue) => debug!(target: "autosave", "Autosave flushed"),
                    Ok(Flush::Stop) => {
                        debug!(target: "autosave", "Autosave finished");
                        break;
                    }
                    Err(e) => warn!(target: "autosave", error = %e, "Autosave failed; retrying next period"),
                }
            }
        });
        self.task = Some(TaskGuard(handle));
    }

    pub fn stop(&mut self) {
        self.task = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::EngineError;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_period_until_stopped() {
        let hits = counter();
        let mut autosave = Autosave::new(Duration::from_secs(10));
        let h = hits.clone();
        autosave.start(move || {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(Flush::Continue)
            }
        });

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        autosave.stop();
        assert!(!autosave.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_swallowed() {
        let hits = counter();
        let mut autosave = Autosave::new(Duration::from_secs(10));
        let h = hits.clone();
        autosave.start(move || {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Service("offline".into()))
            }
        });
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(autosave.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_rearms_from_zero_and_drop_cancels() {
        let hits = counter();
        let mut autosave = Autosave::new(Duration::from_secs(10));
        let make = |h: Arc<AtomicUsize>| {
            move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(Flush::Continue)
                }
            }
        };
        autosave.start(make(hits.clone()));
        tokio::time::sleep(Duration::from_secs(8)).await;
        autosave.start(make(hits.clone()));
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(autosave);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_ends_the_task() {
        let mut autosave = Autosave::new(Duration::from_secs(10));
        autosave.start(|| async { Ok(Flush::Stop) });
        assert!(autosave.is_running());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!autosave.is_running());
    }
}
