//! Re-entrancy guards.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Keeps recalculation non-reentrant. A trigger that arrives while a cycle
/// is running is coalesced into exactly one follow-up cycle.
#[derive(Debug, Default)]
pub struct RecalcGuard {
    running: AtomicBool,
    pending: AtomicBool,
}

impl RecalcGuard {
    /// Create an idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a cycle is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run `cycle`, then once more if a trigger arrived meanwhile. Called
    /// during a cycle, it only records the trigger. Returns the number of
    /// cycles run.
    pub fn run(&self, mut cycle: impl FnMut()) -> usize {
        if self.running.swap(true, Ordering::SeqCst) {
            self.pending.store(true, Ordering::SeqCst);
            debug!("recalculation already running; coalesced");
            return 0;
        }
        let mut cycles = 0;
        loop {
            cycle();
            cycles += 1;
            if !self.pending.swap(false, Ordering::SeqCst) {
                break;
            }
        }
        self.running.store(false, Ordering::SeqCst);
        cycles
    }

    /// Record a data change. Returns true when the caller should start a
    /// cycle itself; false when a running cycle will pick it up.
    pub fn trigger(&self) -> bool {
        if self.is_running() {
            self.pending.store(true, Ordering::SeqCst);
            false
        } else {
            true
        }
    }
}

/// Tracks which task lists are being opened on the current call stack.
#[derive(Debug, Default)]
pub struct CircularGuard {
    open: RefCell<BTreeSet<String>>,
}

/// Removes its name from the guard when dropped.
#[derive(Debug)]
pub struct CircularScope<'a> {
    guard: &'a CircularGuard,
    name: String,
}

impl CircularGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `name`. `None` when it is already open further up the stack.
    pub fn enter(&self, name: &str) -> Option<CircularScope<'_>> {
        if !self.open.borrow_mut().insert(name.to_string()) {
            warn!(task_list = name, "circular task list reference");
            return None;
        }
        Some(CircularScope { guard: self, name: name.to_string() })
    }

    /// True when `name` is open.
    pub fn is_open(&self, name: &str) -> bool {
        self.open.borrow().contains(name)
    }
}

impl Drop for CircularScope<'_> {
    fn drop(&mut self) {
        self.guard.open.borrow_mut().remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recalc_guard_coalesces_nested_triggers() {
        let guard = RecalcGuard::new();
        let mut runs = 0;
        let cycles = guard.run(|| {
            runs += 1;
            if runs == 1 {
                // Three triggers mid-cycle collapse into one follow-up.
                assert!(!guard.trigger());
                assert!(!guard.trigger());
                assert_eq!(guard.run(|| unreachable!()), 0);
            }
        });
        assert_eq!(cycles, 2);
        assert_eq!(runs, 2);
        assert!(!guard.is_running());
        assert!(guard.trigger());
    }

    #[test]
    fn test_circular_guard_scopes() {
        let guard = CircularGuard::new();
        {
            let _a = guard.enter("A").unwrap();
            assert!(guard.is_open("A"));
            assert!(guard.enter("A").is_none());
            let _b = guard.enter("B").unwrap();
        }
        assert!(!guard.is_open("A"));
        assert!(guard.enter("A").is_some());
    }
}
