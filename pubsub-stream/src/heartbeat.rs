//! Presence heartbeat timer.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// At most one repeating heartbeat task.
///
/// Registering replaces the running task instead of adding another one.
#[derive(Debug, Default)]
pub struct HeartbeatTimer {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `tick` every `interval`, starting one interval from now.
    ///
    /// The task ends when `tick` returns `false`. A zero interval only stops
    /// the running task. Returns whether a task was started.
    pub fn register<F>(&self, interval: Duration, tick: F) -> bool
    where
        F: Fn() -> bool + Send + 'static,
    {
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }

        if interval.is_zero() {
            return false;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, presence heartbeat not started");
            return false;
        };

        *task = Some(handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick() {
                    break;
                }
            }
        }));
        true
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
