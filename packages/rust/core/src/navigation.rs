//! Navigation controller.
//!
//! Tracks the current page and drives timed page-turn transitions. State is
//! an explicit value threaded through pure transition functions: a turn is
//! begun (returning a [`PageTurn`] value), the fixed delay elapses, and the
//! turn is settled. Holding the turn as a value keeps the delay out of the
//! state machine, so tests can drive it with tokio's virtual time and a
//! caller can cancel an in-flight turn by aborting instead of settling.
//!
//! Navigation requests received while a turn is in flight are ignored
//! outright — no queueing, no coalescing.

use std::time::Duration;

use tokio::time::sleep;

/// Navigation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    AnimatingForward,
    AnimatingBackward,
}

/// A navigation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    /// Advance one page.
    Next,
    /// Go back one page.
    Prev,
    /// Jump to the first page (animates backward).
    First,
    /// Jump to the last page (animates forward).
    Last,
}

/// An in-flight page turn. Settle it to commit the new index, or abort it to
/// cancel; either returns the controller to `Idle`.
#[derive(Debug)]
#[must_use = "a begun page turn must be settled or aborted"]
pub struct PageTurn {
    target: usize,
}

/// Current-page tracker and page-turn state machine.
#[derive(Debug)]
pub struct Navigator {
    state: NavState,
    current: usize,
    page_count: usize,
    turn_duration: Duration,
}

impl Navigator {
    /// Create a navigator over `page_count` pages, starting idle at page 0.
    pub fn new(page_count: usize, turn_duration: Duration) -> Self {
        Self {
            state: NavState::Idle,
            current: 0,
            page_count,
            turn_duration,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Whether a page transition is currently in flight. This is the
    /// advisory flag callers check before issuing further requests; the
    /// controller itself simply ignores requests while animating.
    pub fn is_animating(&self) -> bool {
        self.state != NavState::Idle
    }

    /// Replace the page count after the page sequence was recomputed,
    /// clamping the current index if the sequence shrank.
    pub fn set_page_count(&mut self, page_count: usize) {
        self.page_count = page_count;
        self.current = self.current.min(page_count.saturating_sub(1));
    }

    /// Begin a page turn. Returns `None` — and changes nothing — when the
    /// controller is not idle or the command's guard fails.
    pub fn begin(&mut self, command: NavCommand) -> Option<PageTurn> {
        if self.state != NavState::Idle {
            return None;
        }

        let (target, state) = match command {
            NavCommand::Next if self.current + 1 < self.page_count => {
                (self.current + 1, NavState::AnimatingForward)
            }
            NavCommand::Prev if self.current > 0 => {
                (self.current - 1, NavState::AnimatingBackward)
            }
            NavCommand::First if self.current > 0 => (0, NavState::AnimatingBackward),
            NavCommand::Last if self.current + 1 < self.page_count => {
                (self.page_count - 1, NavState::AnimatingForward)
            }
            _ => return None,
        };

        self.state = state;
        Some(PageTurn { target })
    }

    /// Commit a begun turn: move to its target page and return to idle.
    /// The target is clamped in case the page sequence shrank mid-turn.
    pub fn settle(&mut self, turn: PageTurn) {
        self.current = turn.target.min(self.page_count.saturating_sub(1));
        self.state = NavState::Idle;
    }

    /// Cancel a begun turn without moving.
    pub fn abort(&mut self, _turn: PageTurn) {
        self.state = NavState::Idle;
    }

    /// Begin a turn, wait out the fixed animation delay, then settle.
    /// Returns false when the request was ignored.
    pub async fn apply(&mut self, command: NavCommand) -> bool {
        match self.begin(command) {
            Some(turn) => {
                sleep(self.turn_duration).await;
                self.settle(turn);
                true
            }
            None => false,
        }
    }
}
