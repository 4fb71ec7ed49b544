//! Carried state of the forward scan
//!
//! The only state that survives from one bar to the next. Detectors take it
//! by value and return the updated copy, so any prefix of a scan can be
//! replayed in isolation.

use crate::TrapKind;

/// Most recent accepted event indices. `None` means "no prior event".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pub last_bull: Option<usize>,
    pub last_bear: Option<usize>,
    /// Furthest confirmed trap index of either kind
    pub last_trap: Option<usize>,
    pub last_normal: Option<usize>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted trap index of the given kind
    #[inline]
    pub fn last_of(&self, kind: TrapKind) -> Option<usize> {
        match kind {
            TrapKind::Bull => self.last_bull,
            TrapKind::Bear => self.last_bear,
        }
    }

    /// Record an accepted trap confirmed at `index`.
    ///
    /// `last_trap` never moves backwards: a bear confirmation may land before
    /// an earlier-evaluated bull confirmation.
    #[must_use]
    pub fn with_trap(mut self, kind: TrapKind, index: usize) -> Self {
        match kind {
            TrapKind::Bull => self.last_bull = Some(index),
            TrapKind::Bear => self.last_bear = Some(index),
        }
        self.last_trap = Some(self.last_trap.map_or(index, |t| t.max(index)));
        self
    }

    #[must_use]
    pub fn with_normal(mut self, index: usize) -> Self {
        self.last_normal = Some(index);
        self
    }
}

/// True if `index` lies at least `gap` bars after `last` (or there is no `last`).
///
/// An index before `last` is never spaced.
#[inline]
pub fn is_spaced(last: Option<usize>, index: usize, gap: usize) -> bool {
    match last {
        None => true,
        Some(last) => index.checked_sub(last).is_some_and(|d| d >= gap),
    }
}
