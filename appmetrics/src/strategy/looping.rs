use super::{require_action, Action, ErrorCallback, Shared, StrategyCore};
use crate::Error;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Drains on a fixed wall-clock interval, regardless of how much has
/// accumulated.
///
/// Grounded on the sleep-loop worker thread pattern seen across the
/// corpus's own metric registries: run the action, measure how long that
/// took, sleep the remainder of the interval.
pub struct Looping {
    core: Shared,
    interval: Duration,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Looping {
    /// `interval_ms` must be at least 1.
    pub fn new(interval_ms: u32) -> Result<Self, Error> {
        if interval_ms < 1 {
            return Err(Error::StrategyMisconfigured {
                reason: format!(
                    "dequeue_operation_loop_interval_ms must be >= 1, got {interval_ms}"
                ),
            });
        }
        Ok(Self {
            core: Arc::new(StrategyCore::new(true)),
            interval: Duration::from_millis(interval_ms as u64),
            worker: parking_lot::Mutex::new(None),
        })
    }
}

impl super::BufferProcessingStrategy for Looping {
    fn bind_action(&self, action: Action, on_processing_error: ErrorCallback) {
        self.core.bind(action, on_processing_error);
    }

    fn start(&self) -> Result<(), Error> {
        require_action(&self.core)?;

        let core = self.core.clone();
        let interval = self.interval;
        let handle = std::thread::spawn(move || loop {
            if core.should_stop() {
                if core.process_remaining() {
                    let _ = core.run_action_once();
                }
                return;
            }
            let started = Instant::now();
            if core.run_action_once() {
                return;
            }
            let elapsed = started.elapsed();
            if let Some(remaining) = interval.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self, process_remaining: bool) {
        self.core.request_stop(process_remaining);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn notify_count_buffered(&self) -> Result<(), Error> {
        self.core.bump_count()
    }

    fn notify_amount_buffered(&self) -> Result<(), Error> {
        self.core.bump_amount()
    }

    fn notify_status_buffered(&self) -> Result<(), Error> {
        self.core.bump_status()
    }

    fn notify_interval_buffered(&self) -> Result<(), Error> {
        self.core.bump_interval()
    }

    fn notify_count_cleared(&self) {
        self.core.clear_count();
    }

    fn notify_amount_cleared(&self) {
        self.core.clear_amount();
    }

    fn notify_status_cleared(&self) {
        self.core.clear_status();
    }

    fn notify_interval_cleared(&self) {
        self.core.clear_interval();
    }
}
