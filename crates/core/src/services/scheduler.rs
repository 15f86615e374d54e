use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// When the first tick of a `ScheduledTask` fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstRun {
    Immediately,
    AfterPeriod,
}

/// A cancellable periodic task running on the tokio runtime.
///
/// Ticks never overlap: the next tick is awaited only after the previous
/// callback future completes, and ticks missed meanwhile are delayed rather
/// than burst. The callback returns `ControlFlow::Break` to end the task on
/// its own. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn a task calling `tick` every `period`.
    /// Must be called from within a tokio runtime; `period` must be non-zero.
    pub fn spawn<F, Fut>(
        name: impl Into<String>,
        period: Duration,
        first_run: FirstRun,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let name = name.into();
        let start = match first_run {
            FirstRun::Immediately => Instant::now(),
            FirstRun::AfterPeriod => Instant::now() + period,
        };

        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().await.is_break() {
                    log::debug!("Scheduled task '{task_name}' finished");
                    break;
                }
            }
        });

        log::debug!("Scheduled task '{name}' started (every {period:?})");
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task is still scheduled to run.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task. Safe to call any number of times; returns `true`
    /// only for the call that actually cancelled it.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                log::debug!("Scheduled task '{}' cancelled", self.name);
                true
            }
            None => false,
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
