//! Progress reporting and cancellation.
//!
//! Long-running steps take `&mut dyn ProgressMonitor`. Nested steps carve a
//! fixed slice of the caller's budget with [`SubMonitor`], so a child never
//! has to know how much work its parent planned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Begin / sub-task / worked / cancel / done protocol.
pub trait ProgressMonitor {
    fn begin_task(&mut self, name: &str, total_work: u32);

    fn sub_task(&mut self, _name: &str) {}

    fn worked(&mut self, work: u32);

    fn is_canceled(&self) -> bool;

    fn done(&mut self);
}

/// Shared cancellation switch; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Monitor that discards progress, optionally bound to a [`CancelFlag`].
#[derive(Debug, Clone, Default)]
pub struct NullMonitor {
    cancel: Option<CancelFlag>,
}

impl NullMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self {
            cancel: Some(cancel),
        }
    }
}

impl ProgressMonitor for NullMonitor {
    fn begin_task(&mut self, _name: &str, _total_work: u32) {}

    fn worked(&mut self, _work: u32) {}

    fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_canceled)
    }

    fn done(&mut self) {}
}

/// A child monitor that owns `budget` ticks of its parent.
///
/// Whatever total the child announces in `begin_task` is scaled onto the
/// budget; `done` hands the parent any ticks that were not reported yet.
pub struct SubMonitor<'a> {
    parent: &'a mut dyn ProgressMonitor,
    budget: u32,
    total: u32,
    consumed: u32,
    reported: u32,
}

impl<'a> SubMonitor<'a> {
    pub fn new(parent: &'a mut dyn ProgressMonitor, budget: u32) -> Self {
        Self {
            parent,
            budget,
            total: 0,
            consumed: 0,
            reported: 0,
        }
    }

    fn report_up_to(&mut self, target: u32) {
        let target = target.min(self.budget);
        if target > self.reported {
            self.parent.worked(target - self.reported);
            self.reported = target;
        }
    }
}

impl ProgressMonitor for SubMonitor<'_> {
    fn begin_task(&mut self, name: &str, total_work: u32) {
        self.total = total_work;
        self.consumed = 0;
        if !name.is_empty() {
            self.parent.sub_task(name);
        }
    }

    fn sub_task(&mut self, name: &str) {
        self.parent.sub_task(name);
    }

    fn worked(&mut self, work: u32) {
        if self.total == 0 {
            return;
        }
        self.consumed = self.consumed.saturating_add(work).min(self.total);
        let scaled = (u64::from(self.consumed) * u64::from(self.budget) / u64::from(self.total)) as u32;
        self.report_up_to(scaled);
    }

    fn is_canceled(&self) -> bool {
        self.parent.is_canceled()
    }

    fn done(&mut self) {
        let budget = self.budget;
        self.report_up_to(budget);
    }
}
