//! Active index and completion tracking.

use crate::error::{EngineError, Result};
use std::collections::BTreeSet;

/// What a navigation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// The active index changed.
    Moved { from: usize, to: usize },
    /// Nothing to do (retreat at 0, jump to the active index).
    Stayed,
    /// Advanced past the last item.
    Exhausted,
}

/// How a progress-bar segment should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Seen,
    Active,
    Pending,
}

#[derive(Debug, Clone)]
pub struct NavigationManager {
    len: usize,
    active: usize,
    completed: BTreeSet<usize>,
}

impl NavigationManager {
    /// `len` must be at least 1 and `start` inside it.
    pub fn new(len: usize, start: usize) -> Result<Self> {
        if len == 0 {
            return Err(EngineError::EmptySequence);
        }
        if start >= len {
            return Err(EngineError::StartOutOfRange { index: start, len });
        }
        Ok(Self {
            len,
            active: start,
            completed: BTreeSet::new(),
        })
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn is_last(&self) -> bool {
        self.active + 1 == self.len
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    pub fn completed(&self) -> impl Iterator<Item = usize> + '_ {
        self.completed.iter().copied()
    }

    /// Mark the active item as seen and move to the next one. At the last
    /// item the index stays put and the sequence is exhausted.
    pub fn advance(&mut self) -> NavOutcome {
        self.completed.insert(self.active);
        if self.is_last() {
            return NavOutcome::Exhausted;
        }
        let from = self.active;
        self.active += 1;
        NavOutcome::Moved {
            from,
            to: self.active,
        }
    }

    /// Step back one item. Completion marks are never removed.
    pub fn retreat(&mut self) -> NavOutcome {
        if self.active == 0 {
            return NavOutcome::Stayed;
        }
        let from = self.active;
        self.active -= 1;
        NavOutcome::Moved {
            from,
            to: self.active,
        }
    }

    /// Jump straight to `index`. Skipped-over items (and the one being left)
    /// count as seen on a forward jump.
    pub fn jump_to(&mut self, index: usize) -> Result<NavOutcome> {
        if index >= self.len {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }

        let from = self.active;
        if index == from {
            return Ok(NavOutcome::Stayed);
        }
        if index > from {
            self.completed.extend(from..index);
        }
        self.active = index;
        Ok(NavOutcome::Moved { from, to: index })
    }

    pub fn segment(&self, index: usize) -> SegmentState {
        if index == self.active {
            SegmentState::Active
        } else if self.completed.contains(&index) {
            SegmentState::Seen
        } else {
            SegmentState::Pending
        }
    }

    pub fn segments(&self) -> Vec<SegmentState> {
        (0..self.len).map(|i| self.segment(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_construction() {
        assert!(matches!(
            NavigationManager::new(0, 0),
            Err(EngineError::EmptySequence)
        ));
        assert!(matches!(
            NavigationManager::new(3, 3),
            Err(EngineError::StartOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn advance_walks_to_exhaustion() {
        let mut nav = NavigationManager::new(3, 0).unwrap();
        assert_eq!(nav.advance(), NavOutcome::Moved { from: 0, to: 1 });
        assert_eq!(nav.advance(), NavOutcome::Moved { from: 1, to: 2 });
        assert_eq!(nav.advance(), NavOutcome::Exhausted);
        assert_eq!(nav.active_index(), 2);
        assert_eq!(nav.completed().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn single_item_exhausts_immediately() {
        let mut nav = NavigationManager::new(1, 0).unwrap();
        assert_eq!(nav.advance(), NavOutcome::Exhausted);
        assert_eq!(nav.active_index(), 0);
    }

    #[test]
    fn retreat_at_zero_stays() {
        let mut nav = NavigationManager::new(3, 0).unwrap();
        assert_eq!(nav.retreat(), NavOutcome::Stayed);
        assert_eq!(nav.active_index(), 0);
    }

    #[test]
    fn retreat_keeps_completion() {
        let mut nav = NavigationManager::new(3, 0).unwrap();
        nav.advance();
        nav.advance();
        assert_eq!(nav.retreat(), NavOutcome::Moved { from: 2, to: 1 });
        assert!(nav.is_completed(0));
        assert!(nav.is_completed(1));
        assert!(!nav.is_completed(2));

        // Re-completing an index is idempotent.
        nav.advance();
        assert_eq!(nav.completed().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn forward_jump_marks_skipped_items() {
        let mut nav = NavigationManager::new(3, 0).unwrap();
        assert_eq!(nav.jump_to(2).unwrap(), NavOutcome::Moved { from: 0, to: 2 });
        assert_eq!(nav.completed().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(
            nav.segments(),
            vec![SegmentState::Seen, SegmentState::Seen, SegmentState::Active]
        );
    }

    #[test]
    fn backward_jump_leaves_completion() {
        let mut nav = NavigationManager::new(4, 3).unwrap();
        assert_eq!(nav.jump_to(1).unwrap(), NavOutcome::Moved { from: 3, to: 1 });
        assert_eq!(nav.completed().count(), 0);
        assert_eq!(nav.segment(3), SegmentState::Pending);
    }

    #[test]
    fn jump_validates_range_and_ignores_self() {
        let mut nav = NavigationManager::new(3, 1).unwrap();
        assert!(matches!(
            nav.jump_to(3),
            Err(EngineError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert_eq!(nav.jump_to(1).unwrap(), NavOutcome::Stayed);
        assert_eq!(nav.completed().count(), 0);
    }
}
