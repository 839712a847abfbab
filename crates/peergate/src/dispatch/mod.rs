// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conditions, WaitSet, cancellation, and the dispatch loop.
//!
//! A [`WaitSet`] blocks until at least one attached [`Condition`] has
//! `trigger_value == true`. Conditions register a waker when attached so
//! they can wake blocked waiters the moment their trigger flips. The
//! [`DispatchLoop`] drives a dispatch table (condition id -> handler) with
//! a bounded wait per iteration so an external [`CancelToken`] is observed
//! within one timeout interval even when no event ever fires.
//!
//! All handlers run on the loop's thread, strictly sequentially. Nothing
//! in this module assumes or defends against concurrent listener
//! execution.

use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static NEXT_CONDITION_ID: AtomicU64 = AtomicU64::new(1);

fn next_condition_id() -> u64 {
    NEXT_CONDITION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Wakes a blocked [`WaitSet`]. One waker per waitset, shared by every
/// attached condition.
pub struct WaitSetWaker {
    signalled: Mutex<bool>,
    cv: Condvar,
}

impl WaitSetWaker {
    fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Signal the waitset. Safe from any thread.
    pub fn signal(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.cv.notify_all();
    }

    /// Wait up to `timeout` for a signal; consumes it. Returns `true` if
    /// signalled.
    fn wait(&self, timeout: Duration) -> bool {
        let mut signalled = self.signalled.lock();
        if !*signalled {
            let _ = self.cv.wait_for(&mut signalled, timeout);
        }
        let was = *signalled;
        *signalled = false;
        was
    }
}

/// A waitable condition with a boolean trigger value.
pub trait Condition: Send + Sync {
    /// Current trigger value.
    fn trigger_value(&self) -> bool;

    /// Process-unique id, used for dispatch-table lookup and duplicate
    /// attachment checks.
    fn condition_id(&self) -> u64;

    /// Called by the waitset on attach so the condition can wake it later.
    fn attach_waker(&self, waker: Arc<WaitSetWaker>);
}

/// Shared trigger state behind [`GuardCondition`] and [`StatusCondition`].
struct SignalCell {
    id: u64,
    trigger: AtomicBool,
    wakers: Mutex<Vec<Weak<WaitSetWaker>>>,
}

impl SignalCell {
    fn new() -> Self {
        Self {
            id: next_condition_id(),
            trigger: AtomicBool::new(false),
            wakers: Mutex::new(Vec::new()),
        }
    }

    fn set_trigger(&self, value: bool) {
        self.trigger.store(value, Ordering::SeqCst);
        if value {
            let mut wakers = self.wakers.lock();
            wakers.retain(|weak| match weak.upgrade() {
                Some(waker) => {
                    waker.signal();
                    true
                }
                None => false,
            });
        }
    }

    fn attach(&self, waker: Arc<WaitSetWaker>) {
        // Signal immediately if already triggered so the attach itself
        // cannot lose a wakeup.
        if self.trigger.load(Ordering::SeqCst) {
            waker.signal();
        }
        self.wakers.lock().push(Arc::downgrade(&waker));
    }
}

/// Manually-triggered condition.
///
/// DDS v1.4 Sec.2.2.4: "a condition whose trigger_value is under the
/// control of the application".
pub struct GuardCondition {
    cell: SignalCell,
}

impl GuardCondition {
    /// Create with `trigger_value == false`.
    pub fn new() -> Self {
        Self {
            cell: SignalCell::new(),
        }
    }

    /// Set the trigger value, waking attached waitsets on `true`.
    pub fn set_trigger(&self, value: bool) {
        self.cell.set_trigger(value);
    }
}

impl Default for GuardCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition for GuardCondition {
    fn trigger_value(&self) -> bool {
        self.cell.trigger.load(Ordering::SeqCst)
    }

    fn condition_id(&self) -> u64 {
        self.cell.id
    }

    fn attach_waker(&self, waker: Arc<WaitSetWaker>) {
        self.cell.attach(waker);
    }
}

/// Condition triggered by the bus when discovery records or data samples
/// arrive. Readers clear it before draining their queue.
pub struct StatusCondition {
    cell: SignalCell,
}

impl StatusCondition {
    pub(crate) fn new() -> Self {
        Self {
            cell: SignalCell::new(),
        }
    }

    pub(crate) fn set_trigger(&self, value: bool) {
        self.cell.set_trigger(value);
    }
}

impl Condition for StatusCondition {
    fn trigger_value(&self) -> bool {
        self.cell.trigger.load(Ordering::SeqCst)
    }

    fn condition_id(&self) -> u64 {
        self.cell.id
    }

    fn attach_waker(&self, waker: Arc<WaitSetWaker>) {
        self.cell.attach(waker);
    }
}

/// Cooperative cancellation token.
///
/// Clones share the same flag. The embedded guard condition lets a
/// waitset wake immediately on cancellation instead of waiting out the
/// current timeout.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    guard: Arc<GuardCondition>,
}

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            guard: Arc::new(GuardCondition::new()),
        }
    }

    /// Request cancellation. Safe from any thread, including signal
    /// handlers via `ctrlc`.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.guard.set_trigger(true);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Condition that triggers on cancellation.
    pub fn condition(&self) -> Arc<GuardCondition> {
        Arc::clone(&self.guard)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// WaitSet - wait for multiple conditions.
pub struct WaitSet {
    waker: Arc<WaitSetWaker>,
    conditions: Mutex<Vec<Arc<dyn Condition>>>,
}

impl WaitSet {
    /// Create a new WaitSet.
    pub fn new() -> Self {
        Self {
            waker: Arc::new(WaitSetWaker::new()),
            conditions: Mutex::new(Vec::new()),
        }
    }

    /// Attach a condition.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the condition is already attached.
    pub fn attach_condition(&self, condition: Arc<dyn Condition>) -> Result<()> {
        let id = condition.condition_id();
        let mut conditions = self.conditions.lock();
        if conditions.iter().any(|c| c.condition_id() == id) {
            return Err(Error::Config(format!("condition {} already attached", id)));
        }
        condition.attach_waker(Arc::clone(&self.waker));
        conditions.push(condition);
        Ok(())
    }

    /// Block until at least one attached condition is triggered.
    ///
    /// # Errors
    ///
    /// [`Error::WouldBlock`] when the timeout elapses with nothing
    /// triggered. That is the dispatch loop's normal idle path, not a
    /// failure.
    pub fn wait(&self, timeout: Duration) -> Result<Vec<Arc<dyn Condition>>> {
        let deadline = Instant::now() + timeout;
        loop {
            let triggered: Vec<Arc<dyn Condition>> = self
                .conditions
                .lock()
                .iter()
                .filter(|c| c.trigger_value())
                .cloned()
                .collect();
            if !triggered.is_empty() {
                return Ok(triggered);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::WouldBlock);
            }
            self.waker.wait(deadline - now);
        }
    }
}

impl Default for WaitSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for and dispatching events.
    Running,
    /// External cancellation observed; no further dispatch.
    ShuttingDown,
    /// Completion target reached; no further dispatch.
    Done,
}

type Handler = Box<dyn FnMut() -> Result<()>>;

/// Bounded, cancellable wait-and-dispatch loop.
///
/// Handlers are dispatched in registration order, so registering
/// discovery handlers before data handlers guarantees admission is
/// decided before data from the same wake-up is processed.
pub struct DispatchLoop {
    waitset: WaitSet,
    handlers: Vec<(u64, Handler)>,
    cancel: CancelToken,
    timeout: Duration,
}

impl DispatchLoop {
    /// Default per-iteration wait bound.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    /// Create a loop observing `cancel` once per iteration.
    pub fn new(cancel: CancelToken) -> Self {
        let waitset = WaitSet::new();
        // Attach so cancellation wakes the wait immediately; the guard has
        // no handler, it only terminates the iteration.
        #[allow(clippy::expect_used)]
        waitset
            .attach_condition(cancel.condition())
            .expect("fresh waitset cannot hold a duplicate");
        Self {
            waitset,
            handlers: Vec::new(),
            cancel,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-iteration wait bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a condition together with the handler dispatched when it
    /// triggers.
    pub fn register(&mut self, condition: Arc<dyn Condition>, handler: Handler) -> Result<()> {
        let id = condition.condition_id();
        self.waitset.attach_condition(condition)?;
        self.handlers.push((id, handler));
        Ok(())
    }

    fn dispatch(&mut self, triggered: &[Arc<dyn Condition>]) -> Result<()> {
        for (id, handler) in &mut self.handlers {
            if triggered.iter().any(|c| c.condition_id() == *id) {
                handler()?;
            }
        }
        Ok(())
    }

    /// Run until `complete` returns true (-> [`LoopState::Done`]) or the
    /// cancel token fires (-> [`LoopState::ShuttingDown`]).
    ///
    /// Handler errors propagate and terminate the run attempt.
    pub fn run(&mut self, mut complete: impl FnMut() -> bool) -> Result<LoopState> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(LoopState::ShuttingDown);
            }
            if complete() {
                return Ok(LoopState::Done);
            }
            match self.waitset.wait(self.timeout) {
                Ok(triggered) => {
                    if self.cancel.is_cancelled() {
                        return Ok(LoopState::ShuttingDown);
                    }
                    self.dispatch(&triggered)?;
                }
                Err(Error::WouldBlock) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Service events for `period`, then return. Used by the publisher to
    /// keep listeners live between paced writes. Returns early on
    /// cancellation.
    pub fn drive_for(&mut self, period: Duration) -> Result<()> {
        let deadline = Instant::now() + period;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let remaining = (deadline - now).min(self.timeout);
            match self.waitset.wait(remaining) {
                Ok(triggered) => {
                    if self.cancel.is_cancelled() {
                        return Ok(());
                    }
                    self.dispatch(&triggered)?;
                }
                Err(Error::WouldBlock) => {}
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread;

    #[test]
    fn wait_times_out_with_nothing_triggered() {
        let waitset = WaitSet::new();
        let guard: Arc<GuardCondition> = Arc::new(GuardCondition::new());
        waitset.attach_condition(guard).unwrap();
        match waitset.wait(Duration::from_millis(20)) {
            Err(Error::WouldBlock) => {}
            other => panic!("expected WouldBlock, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn guard_trigger_wakes_wait_from_other_thread() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new());
        waitset
            .attach_condition(Arc::clone(&guard) as Arc<dyn Condition>)
            .unwrap();

        let trigger = Arc::clone(&guard);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.set_trigger(true);
        });

        let start = Instant::now();
        let triggered = waitset.wait(Duration::from_secs(5)).unwrap();
        assert_eq!(triggered.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn duplicate_attach_is_a_config_error() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new());
        waitset
            .attach_condition(Arc::clone(&guard) as Arc<dyn Condition>)
            .unwrap();
        assert!(matches!(
            waitset.attach_condition(guard as Arc<dyn Condition>),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn already_triggered_condition_is_seen_on_attach() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new());
        guard.set_trigger(true);
        waitset
            .attach_condition(guard as Arc<dyn Condition>)
            .unwrap();
        assert!(waitset.wait(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn loop_completes_when_target_reached() {
        let cancel = CancelToken::new();
        let mut dispatch = DispatchLoop::new(cancel).with_timeout(Duration::from_millis(10));

        let guard = Arc::new(GuardCondition::new());
        let count = Arc::new(AtomicU32::new(0));
        let in_handler = Arc::clone(&count);
        let clear = Arc::clone(&guard);
        dispatch
            .register(
                Arc::clone(&guard) as Arc<dyn Condition>,
                Box::new(move || {
                    in_handler.fetch_add(1, Ordering::SeqCst);
                    clear.set_trigger(false);
                    Ok(())
                }),
            )
            .unwrap();

        guard.set_trigger(true);
        let state = dispatch
            .run(|| count.load(Ordering::SeqCst) >= 1)
            .unwrap();
        assert_eq!(state, LoopState::Done);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loop_stops_within_one_interval_of_cancellation() {
        let cancel = CancelToken::new();
        let mut dispatch =
            DispatchLoop::new(cancel.clone()).with_timeout(Duration::from_millis(500));

        let canceller = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let start = Instant::now();
        let state = dispatch.run(|| false).unwrap();
        assert_eq!(state, LoopState::ShuttingDown);
        assert!(start.elapsed() < Duration::from_millis(500));
        handle.join().unwrap();
    }

    #[test]
    fn handler_error_terminates_the_run() {
        let cancel = CancelToken::new();
        let mut dispatch = DispatchLoop::new(cancel).with_timeout(Duration::from_millis(10));

        let guard = Arc::new(GuardCondition::new());
        dispatch
            .register(
                Arc::clone(&guard) as Arc<dyn Condition>,
                Box::new(|| Err(Error::InvalidState("listener failed".into()))),
            )
            .unwrap();
        guard.set_trigger(true);

        assert!(matches!(
            dispatch.run(|| false),
            Err(Error::InvalidState(_))
        ));
    }
}
