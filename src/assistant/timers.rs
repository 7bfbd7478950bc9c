//! Named single-shot timeouts

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What to do when a timeout expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Forget the conversation id
    ResetConversationId,
    /// Stop the playback sink
    StopSpeaker,
    /// Playback went quiet; finish the response
    PlaybackIdle,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    deadline: Instant,
    action: TimerAction,
}

/// Set of pending timeouts keyed by name
///
/// Arming a name that is already armed replaces it. Cancelling a name that
/// is not armed does nothing.
#[derive(Debug, Default)]
pub struct Timers {
    armed: HashMap<&'static str, Armed>,
}

impl Timers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `name` to fire `action` once `after` has elapsed from `now`
    pub fn set_timeout(
        &mut self,
        name: &'static str,
        now: Instant,
        after: Duration,
        action: TimerAction,
    ) {
        self.armed.insert(
            name,
            Armed {
                deadline: now + after,
                action,
            },
        );
    }

    /// Disarm `name`
    pub fn cancel_timeout(&mut self, name: &str) {
        self.armed.remove(name);
    }

    /// Whether `name` is armed
    #[must_use]
    pub fn is_armed(&self, name: &str) -> bool {
        self.armed.contains_key(name)
    }

    /// Number of armed timeouts
    #[must_use]
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Disarm and return every timeout due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<(&'static str, TimerAction)> {
        let mut due: Vec<(&'static str, Armed)> = self
            .armed
            .iter()
            .filter(|(_, armed)| armed.deadline <= now)
            .map(|(&name, &armed)| (name, armed))
            .collect();

        for (name, _) in &due {
            self.armed.remove(name);
        }

        due.sort_by_key(|(_, armed)| armed.deadline);
        due.into_iter()
            .map(|(name, armed)| (name, armed.action))
            .collect()
    }
}
