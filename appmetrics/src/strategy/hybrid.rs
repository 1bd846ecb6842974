use super::{require_action, Action, ErrorCallback, Shared, StrategyCore};
use crate::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Drains on a size threshold *or* an elapsed interval, whichever comes
/// first — but never more than once per interval even if the threshold is
/// crossed repeatedly meanwhile.
///
/// Two cooperating threads: a "trigger" thread that wakes on an adaptive
/// sleep and requests a drain unless one is already running, and a
/// "processing" thread that actually runs the action. The trigger's sleep
/// shrinks by however long the last drain took, so a slow sink doesn't push
/// the effective period past `dequeue_operation_loop_interval_ms`.
pub struct Hybrid {
    core: Shared,
    limit: u32,
    interval: Duration,
    is_processing: Arc<AtomicBool>,
    request: Arc<(Mutex<bool>, Condvar)>,
    last_processing_complete: Arc<Mutex<Instant>>,
    trigger_worker: Mutex<Option<JoinHandle<()>>>,
    processing_worker: Mutex<Option<JoinHandle<()>>>,
}

impl Hybrid {
    pub fn new(buffer_size_limit: u32, dequeue_operation_loop_interval_ms: u32) -> Result<Self, Error> {
        if buffer_size_limit < 1 {
            return Err(Error::StrategyMisconfigured {
                reason: format!("buffer_size_limit must be >= 1, got {buffer_size_limit}"),
            });
        }
        if dequeue_operation_loop_interval_ms < 1 {
            return Err(Error::StrategyMisconfigured {
                reason: format!(
                    "dequeue_operation_loop_interval_ms must be >= 1, got {dequeue_operation_loop_interval_ms}"
                ),
            });
        }
        Ok(Self {
            core: Arc::new(StrategyCore::new(true)),
            limit: buffer_size_limit,
            interval: Duration::from_millis(dequeue_operation_loop_interval_ms as u64),
            is_processing: Arc::new(AtomicBool::new(false)),
            request: Arc::new((Mutex::new(false), Condvar::new())),
            last_processing_complete: Arc::new(Mutex::new(Instant::now())),
            trigger_worker: Mutex::new(None),
            processing_worker: Mutex::new(None),
        })
    }

    fn request_drain(&self) {
        let (lock, cvar) = &*self.request;
        let mut requested = lock.lock();
        *requested = true;
        cvar.notify_one();
    }
}

impl super::BufferProcessingStrategy for Hybrid {
    fn bind_action(&self, action: Action, on_processing_error: ErrorCallback) {
        self.core.bind(action, on_processing_error);
    }

    fn start(&self) -> Result<(), Error> {
        require_action(&self.core)?;

        *self.last_processing_complete.lock() = Instant::now();

        let processing_handle = {
            let core = self.core.clone();
            let is_processing = self.is_processing.clone();
            let request = self.request.clone();
            let last_complete = self.last_processing_complete.clone();
            std::thread::spawn(move || loop {
                {
                    let (lock, cvar) = &*request;
                    let mut requested = lock.lock();
                    while !*requested && !core.should_stop() {
                        cvar.wait(&mut requested);
                    }
                    *requested = false;
                }

                if core.should_stop() {
                    if core.process_remaining() {
                        is_processing.store(true, Ordering::Release);
                        let _ = core.run_action_once();
                        is_processing.store(false, Ordering::Release);
                    }
                    return;
                }

                is_processing.store(true, Ordering::Release);
                let terminate = core.run_action_once();
                *last_complete.lock() = Instant::now();
                is_processing.store(false, Ordering::Release);
                if terminate {
                    return;
                }
            })
        };

        let trigger_handle = {
            let core = self.core.clone();
            let is_processing = self.is_processing.clone();
            let last_complete = self.last_processing_complete.clone();
            let interval = self.interval;
            let me_request = self.request.clone();
            std::thread::spawn(move || loop {
                if core.should_stop() {
                    return;
                }

                let since_last = last_complete.lock().elapsed();
                let sleep_for = interval.checked_sub(since_last).unwrap_or(Duration::ZERO);
                if !sleep_for.is_zero() {
                    std::thread::sleep(sleep_for);
                }

                if core.should_stop() {
                    return;
                }

                if !is_processing.load(Ordering::Acquire) {
                    let (lock, cvar) = &*me_request;
                    let mut requested = lock.lock();
                    *requested = true;
                    cvar.notify_one();
                }
            })
        };

        *self.processing_worker.lock() = Some(processing_handle);
        *self.trigger_worker.lock() = Some(trigger_handle);
        Ok(())
    }

    fn stop(&self, process_remaining: bool) {
        self.core.request_stop(process_remaining);
        let (lock, cvar) = &*self.request;
        *lock.lock() = true;
        cvar.notify_one();

        if let Some(handle) = self.trigger_worker.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.processing_worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn notify_count_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_count();
        if self.core.total_buffered() >= self.limit && !self.is_processing.load(Ordering::Acquire) {
            self.request_drain();
        }
        r
    }

    fn notify_amount_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_amount();
        if self.core.total_buffered() >= self.limit && !self.is_processing.load(Ordering::Acquire) {
            self.request_drain();
        }
        r
    }

    fn notify_status_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_status();
        if self.core.total_buffered() >= self.limit && !self.is_processing.load(Ordering::Acquire) {
            self.request_drain();
        }
        r
    }

    fn notify_interval_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_interval();
        if self.core.total_buffered() >= self.limit && !self.is_processing.load(Ordering::Acquire) {
            self.request_drain();
        }
        r
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            Hybrid::new(0, 10),
            Err(Error::StrategyMisconfigured { .. })
        ));
        assert!(matches!(
            Hybrid::new(10, 0),
            Err(Error::StrategyMisconfigured { .. })
        ));
    }
}
