use super::{require_action, Action, ErrorCallback, Shared, StrategyCore};
use crate::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Drains as soon as the total number of buffered items crosses a
/// threshold, rather than on a fixed schedule.
///
/// The worker parks on a [`Condvar`] until a `notify_*_buffered` call pushes
/// the total over `buffer_size_limit`, mirroring the park/signal pattern the
/// corpus uses for its own shutdown-drain handshakes.
pub struct SizeLimited {
    core: Shared,
    limit: u32,
    signal: Arc<(Mutex<bool>, Condvar)>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SizeLimited {
    /// `buffer_size_limit` must be at least 1.
    pub fn new(buffer_size_limit: u32) -> Result<Self, Error> {
        if buffer_size_limit < 1 {
            return Err(Error::StrategyMisconfigured {
                reason: format!("buffer_size_limit must be >= 1, got {buffer_size_limit}"),
            });
        }
        Ok(Self {
            core: Arc::new(StrategyCore::new(true)),
            limit: buffer_size_limit,
            signal: Arc::new((Mutex::new(false), Condvar::new())),
            worker: Mutex::new(None),
        })
    }

    fn maybe_signal(&self) {
        if self.core.total_buffered() >= self.limit {
            let (lock, cvar) = &*self.signal;
            let mut ready = lock.lock();
            *ready = true;
            cvar.notify_one();
        }
    }
}

impl super::BufferProcessingStrategy for SizeLimited {
    fn bind_action(&self, action: Action, on_processing_error: ErrorCallback) {
        self.core.bind(action, on_processing_error);
    }

    fn start(&self) -> Result<(), Error> {
        require_action(&self.core)?;

        let core = self.core.clone();
        let signal = self.signal.clone();
        let handle = std::thread::spawn(move || loop {
            {
                let (lock, cvar) = &*signal;
                let mut ready = lock.lock();
                while !*ready && !core.should_stop() {
                    cvar.wait(&mut ready);
                }
                *ready = false;
            }

            if core.should_stop() {
                if core.process_remaining() {
                    let _ = core.run_action_once();
                }
                return;
            }

            if core.run_action_once() {
                return;
            }
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self, process_remaining: bool) {
        self.core.request_stop(process_remaining);
        let (lock, cvar) = &*self.signal;
        *lock.lock() = true;
        cvar.notify_one();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn notify_count_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_count();
        self.maybe_signal();
        r
    }

    fn notify_amount_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_amount();
        self.maybe_signal();
        r
    }

    fn notify_status_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_status();
        self.maybe_signal();
        r
    }

    fn notify_interval_buffered(&self) -> Result<(), Error> {
        let r = self.core.bump_interval();
        self.maybe_signal();
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
