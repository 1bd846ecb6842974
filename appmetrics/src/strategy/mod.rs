//! Buffer-processing strategies: the three policies that decide *when* the
//! worker thread drains the buffer.
//!
//! All three share [`StrategyCore`] for the parts of the contract that don't
//! vary — the bound action, the error slot, the rethrow policy, and the
//! atomic buffered-item counters — and differ only in the worker-thread
//! loop(s) that decide when to call the action.

mod hybrid;
mod looping;
mod size_limited;

pub use hybrid::Hybrid;
pub use looping::Looping;
pub use size_limited::SizeLimited;

use crate::Error;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// The drain action a strategy invokes from its worker thread(s).
///
/// Bound once, by [`crate::buffer::MetricLoggerBuffer::new`], before
/// `start()` is ever called.
pub type Action = Box<dyn Fn() -> Result<(), Error> + Send + Sync>;

/// Called from the worker thread, at most once per failing drain, with the
/// error the action raised. Must never panic or block.
pub type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;

/// Common contract implemented by [`Looping`], [`SizeLimited`], and
/// [`Hybrid`].
///
/// `notify_*_buffered` are called by the buffer immediately after appending
/// a record to the corresponding queue; `notify_*_cleared` immediately after
/// a drain has finished delivering that queue's batch to the sink.
pub trait BufferProcessingStrategy: Send + Sync {
    /// Binds the drain action. Must be called before [`start`](Self::start);
    /// calling it twice, or calling `start` without ever calling it, is a
    /// [`Error::StrategyMisconfigured`].
    fn bind_action(&self, action: Action, on_processing_error: ErrorCallback);

    /// Starts the worker thread(s). Exactly one call per strategy instance
    /// between constructions.
    fn start(&self) -> Result<(), Error>;

    /// Signals the worker to stop. If `process_remaining` is true, one more
    /// drain runs before the worker exits; otherwise the worker exits after
    /// finishing whatever iteration is already in flight.
    fn stop(&self, process_remaining: bool);

    fn notify_count_buffered(&self) -> Result<(), Error>;
    fn notify_amount_buffered(&self) -> Result<(), Error>;
    fn notify_status_buffered(&self) -> Result<(), Error>;
    fn notify_interval_buffered(&self) -> Result<(), Error>;

    fn notify_count_cleared(&self);
    fn notify_amount_cleared(&self);
    fn notify_status_cleared(&self);
    fn notify_interval_cleared(&self);
}

/// State and behavior shared by all three strategies: the bound action, the
/// one-shot error slot, the rethrow policy, and the four buffered-item
/// counters.
pub(crate) struct StrategyCore {
    action: Mutex<Option<Action>>,
    on_processing_error: Mutex<Option<ErrorCallback>>,
    rethrow_on_next_logging_call: bool,
    error_slot: Mutex<Option<Error>>,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) worker_terminated: AtomicBool,
    process_remaining: AtomicBool,
    count_buffered: AtomicU32,
    amount_buffered: AtomicU32,
    status_buffered: AtomicU32,
    interval_buffered: AtomicU32,
}

impl StrategyCore {
    pub(crate) fn new(rethrow_on_next_logging_call: bool) -> Self {
        Self {
            action: Mutex::new(None),
            on_processing_error: Mutex::new(None),
            rethrow_on_next_logging_call,
            error_slot: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            worker_terminated: AtomicBool::new(false),
            process_remaining: AtomicBool::new(true),
            count_buffered: AtomicU32::new(0),
            amount_buffered: AtomicU32::new(0),
            status_buffered: AtomicU32::new(0),
            interval_buffered: AtomicU32::new(0),
        }
    }

    pub(crate) fn bind(&self, action: Action, on_processing_error: ErrorCallback) {
        *self.action.lock() = Some(action);
        *self.on_processing_error.lock() = Some(on_processing_error);
    }

    pub(crate) fn has_action(&self) -> bool {
        self.action.lock().is_some()
    }

    /// Runs the bound action, routing a failure into the error slot and the
    /// `on_processing_error` callback. Returns whether the worker should
    /// terminate.
    pub(crate) fn run_action_once(&self) -> bool {
        let ran = {
            let guard = self.action.lock();
            guard.as_ref().map(|action| action())
        };
        match ran {
            Some(Ok(())) => false,
            Some(Err(e)) => {
                if let Some(cb) = self.on_processing_error.lock().as_ref() {
                    cb(&e);
                }
                *self.error_slot.lock() = Some(e);
                self.worker_terminated.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Called by every `notify_*_buffered`: rethrows a stored worker error,
    /// wrapped as [`Error::WorkerThread`], if one is pending and the
    /// rethrow policy is enabled.
    fn check_rethrow(&self) -> Result<(), Error> {
        if !self.rethrow_on_next_logging_call {
            return Ok(());
        }
        let mut slot = self.error_slot.lock();
        if let Some(e) = slot.take() {
            return Err(e.into_worker_thread_error(Utc::now()));
        }
        Ok(())
    }

    pub(crate) fn bump_count(&self) -> Result<(), Error> {
        self.count_buffered.fetch_add(1, Ordering::AcqRel);
        self.check_rethrow()
    }

    pub(crate) fn bump_amount(&self) -> Result<(), Error> {
        self.amount_buffered.fetch_add(1, Ordering::AcqRel);
        self.check_rethrow()
    }

    pub(crate) fn bump_status(&self) -> Result<(), Error> {
        self.status_buffered.fetch_add(1, Ordering::AcqRel);
        self.check_rethrow()
    }

    pub(crate) fn bump_interval(&self) -> Result<(), Error> {
        self.interval_buffered.fetch_add(1, Ordering::AcqRel);
        self.check_rethrow()
    }

    pub(crate) fn clear_count(&self) {
        self.count_buffered.store(0, Ordering::Release);
    }

    pub(crate) fn clear_amount(&self) {
        self.amount_buffered.store(0, Ordering::Release);
    }

    pub(crate) fn clear_status(&self) {
        self.status_buffered.store(0, Ordering::Release);
    }

    pub(crate) fn clear_interval(&self) {
        self.interval_buffered.store(0, Ordering::Release);
    }

    /// Total buffered items across all four kinds, used by `SizeLimited`
    /// and `Hybrid` to decide when to signal the processing thread.
    pub(crate) fn total_buffered(&self) -> u32 {
        self.count_buffered.load(Ordering::Acquire)
            + self.amount_buffered.load(Ordering::Acquire)
            + self.status_buffered.load(Ordering::Acquire)
            + self.interval_buffered.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self, process_remaining: bool) {
        self.process_remaining.store(process_remaining, Ordering::Release);
        self.stop_requested.store(true, Ordering::Release);
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn process_remaining(&self) -> bool {
        self.process_remaining.load(Ordering::Acquire)
    }
}

pub(crate) fn require_action(core: &StrategyCore) -> Result<(), Error> {
    if core.has_action() {
        Ok(())
    } else {
        Err(Error::StrategyMisconfigured {
            reason: "start() called with no drain action bound".to_string(),
        })
    }
}

pub(crate) type Shared = Arc<StrategyCore>;
