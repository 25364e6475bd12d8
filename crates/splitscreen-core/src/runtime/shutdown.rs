use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Stop flag shared by the worker threads of one `initialize` cycle.
///
/// Workers sleep on it between polls and retries, so teardown does not have
/// to sit out a retry delay before it can join them. A fresh signal is made
/// for every cycle; once triggered it stays triggered.
pub struct ShutdownSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Mark the cycle as stopping and wake every sleeping worker.
    pub fn trigger(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }

    /// A poisoned flag reads as stopped.
    pub fn is_shutdown(&self) -> bool {
        self.stopped.lock().map(|stopped| *stopped).unwrap_or(true)
    }

    /// Sleep for `duration`, returning early with `true` once triggered.
    pub fn wait(&self, duration: Duration) -> bool {
        let Ok(stopped) = self.stopped.lock() else {
            return true;
        };
        self.wake
            .wait_timeout_while(stopped, duration, |stopped| !*stopped)
            .map(|(stopped, _)| *stopped)
            .unwrap_or(true)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_trigger_is_sticky() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());
        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_wait_runs_full_delay_when_untriggered() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();

        assert!(!signal.wait(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_trigger_wakes_every_worker() {
        let signal = Arc::new(ShutdownSignal::new());
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let signal = Arc::clone(&signal);
                thread::spawn(move || {
                    let start = Instant::now();
                    (signal.wait(Duration::from_secs(10)), start.elapsed())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        signal.trigger();

        for worker in workers {
            let (stopped, elapsed) = worker.join().unwrap();
            assert!(stopped);
            assert!(elapsed < Duration::from_secs(1));
        }
    }

    #[test]
    fn test_wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let start = Instant::now();
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
