//! Interpreter Lifecycle and Invocation Lock
//!
//! The embedded interpreter is a process-wide resource: it is started once
//! and only one native thread may drive it at a time. This module owns both
//! halves of that contract.
//!
//! ## Strategies
//!
//! - **ensure_interpreter**: one-shot, idempotent interpreter startup
//! - **InvocationGuard**: RAII guard over the single invocation lock
//! - **Thread-local depth**: detects a thread re-entering the bridge while it
//!   already holds the lock
//!
//! The guard is always taken *before* attaching to the interpreter, so a
//! thread parked on the lock never holds the GIL.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use pyo3::prelude::*;
use tracing::{error, trace, warn};

use crate::error::{BridgeError, BridgeResult};

// ============================================================================
// Process-wide State
// ============================================================================

/// The single lock serializing every call into the interpreter
static INVOCATION_LOCK: Mutex<()> = Mutex::new(());

/// Total successful acquisitions
static ACQUIRE_COUNT: AtomicU64 = AtomicU64::new(0);

/// Acquisitions that had to wait for another holder
static CONTENDED_COUNT: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Guards held by this thread (0 or 1)
    static LOCK_DEPTH: Cell<usize> = const { Cell::new(0) };
}

// ============================================================================
// Interpreter Startup
// ============================================================================

/// Start the embedded interpreter if it is not already running.
///
/// Safe to call any number of times; the interpreter is initialized exactly
/// once per process.
pub fn ensure_interpreter() -> BridgeResult<()> {
    Python::initialize();

    if !is_interpreter_initialized() {
        error!("embedded Python interpreter failed to initialize");
        return Err(BridgeError::InterpreterNotInitialized);
    }

    Ok(())
}

/// Check if the embedded interpreter reports itself as initialized
pub fn is_interpreter_initialized() -> bool {
    // SAFETY: Py_IsInitialized may be called at any time, with or without the GIL.
    unsafe { pyo3::ffi::Py_IsInitialized() != 0 }
}

// ============================================================================
// InvocationGuard - RAII Lock Acquisition
// ============================================================================

/// RAII guard for the invocation lock.
///
/// # Example
///
/// ```ignore
/// let _guard = InvocationGuard::acquire("condd")?;
/// Python::attach(|py| { /* lookup, marshal, call, capture */ });
/// // lock released when _guard is dropped
/// ```
pub struct InvocationGuard {
    _lock: MutexGuard<'static, ()>,
    /// Not Send: the depth counter belongs to the acquiring thread
    _marker: PhantomData<*mut ()>,
}

impl InvocationGuard {
    /// Block until the lock is free.
    ///
    /// `function` names the call, for the re-entrancy error only.
    pub fn acquire(function: &str) -> BridgeResult<Self> {
        Self::check_reentry(function)?;

        let lock = match INVOCATION_LOCK.try_lock() {
            Some(lock) => lock,
            None => {
                CONTENDED_COUNT.fetch_add(1, Ordering::Relaxed);
                trace!(function, "waiting for invocation lock");
                INVOCATION_LOCK.lock()
            }
        };

        Ok(Self::enter(lock))
    }

    /// Wait at most `timeout` for the lock.
    pub fn acquire_timeout(function: &str, timeout: Duration) -> BridgeResult<Self> {
        Self::check_reentry(function)?;

        let lock = match INVOCATION_LOCK.try_lock() {
            Some(lock) => lock,
            None => {
                CONTENDED_COUNT.fetch_add(1, Ordering::Relaxed);
                INVOCATION_LOCK.try_lock_for(timeout).ok_or_else(|| {
                    let waited_ms = timeout.as_millis() as u64;
                    warn!(function, waited_ms, "invocation lock timed out");
                    BridgeError::LockTimeout { waited_ms }
                })?
            }
        };

        Ok(Self::enter(lock))
    }

    /// Acquire with an optional timeout
    pub fn acquire_with(function: &str, timeout: Option<Duration>) -> BridgeResult<Self> {
        match timeout {
            Some(timeout) => Self::acquire_timeout(function, timeout),
            None => Self::acquire(function),
        }
    }

    fn check_reentry(function: &str) -> BridgeResult<()> {
        if LOCK_DEPTH.with(|depth| depth.get()) > 0 {
            return Err(BridgeError::ReentrantCall {
                function: function.to_string(),
            });
        }
        Ok(())
    }

    fn enter(lock: MutexGuard<'static, ()>) -> Self {
        LOCK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        ACQUIRE_COUNT.fetch_add(1, Ordering::Relaxed);

        Self {
            _lock: lock,
            _marker: PhantomData,
        }
    }
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        LOCK_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

impl fmt::Debug for InvocationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationGuard").finish_non_exhaustive()
    }
}

/// Whether the current thread holds the invocation lock
pub fn holds_invocation_lock() -> bool {
    LOCK_DEPTH.with(|depth| depth.get() > 0)
}

// ============================================================================
// Debug Utilities
// ============================================================================

/// Get statistics about invocation lock usage.
pub fn invocation_stats() -> InvocationStats {
    InvocationStats {
        total_acquires: ACQUIRE_COUNT.load(Ordering::Relaxed),
        contended_acquires: CONTENDED_COUNT.load(Ordering::Relaxed),
        held_by_current_thread: holds_invocation_lock(),
    }
}

/// Invocation lock statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationStats {
    /// Total number of acquisitions
    pub total_acquires: u64,
    /// Acquisitions that found the lock already held
    pub contended_acquires: u64,
    /// Whether the calling thread holds the lock
    pub held_by_current_thread: bool,
}

impl fmt::Display for InvocationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invocation Stats: acquires={}, contended={}, held={}",
            self.total_acquires, self.contended_acquires, self.held_by_current_thread
        )
    }
}
