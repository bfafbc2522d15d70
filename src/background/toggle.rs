//! Click/drag disambiguation for group tabs.
//!
//! Activating a group tab arms a pending toggle. If a move of the same
//! group claims it within the click window, the mover applies it after its
//! own corrective moves; otherwise the activation handler applies it.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::group::TabId;

#[derive(Debug, Clone, Copy)]
struct Pending {
    token: u64,
    previous: Option<TabId>,
}

#[derive(Debug, Default)]
pub struct ToggleDebounce {
    pending: Mutex<HashMap<TabId, Pending>>,
    next_token: Mutex<u64>,
}

impl ToggleDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a toggle for `group`, replacing any earlier one
    pub fn arm(&self, group: TabId, previous: Option<TabId>) -> u64 {
        let token = {
            let mut next = self.next_token.lock();
            *next += 1;
            *next
        };
        self.pending
            .lock()
            .insert(group, Pending { token, previous });
        token
    }

    /// Take the toggle armed with `token` if nobody claimed or re-armed it.
    ///
    /// Returns the tab that was active before the click.
    pub fn take(&self, group: TabId, token: u64) -> Option<Option<TabId>> {
        let mut pending = self.pending.lock();
        match pending.get(&group) {
            Some(p) if p.token == token => pending.remove(&group).map(|p| p.previous),
            _ => None,
        }
    }

    /// Claim the pending toggle on behalf of a group move
    pub fn claim(&self, group: TabId) -> Option<Option<TabId>> {
        self.pending.lock().remove(&group).map(|p| p.previous)
    }

    /// Drop a pending toggle (the group went away)
    pub fn cancel(&self, group: TabId) {
        self.pending.lock().remove(&group);
    }

    pub fn is_armed(&self, group: TabId) -> bool {
        self.pending.lock().contains_key(&group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_after_arm() {
        let toggles = ToggleDebounce::new();
        let token = toggles.arm(1, Some(5));
        assert_eq!(toggles.take(1, token), Some(Some(5)));
        assert_eq!(toggles.take(1, token), None);
    }

    #[test]
    fn test_claim_wins_over_take() {
        let toggles = ToggleDebounce::new();
        let token = toggles.arm(1, None);
        assert_eq!(toggles.claim(1), Some(None));
        assert_eq!(toggles.take(1, token), None);
        assert_eq!(toggles.claim(1), None);
    }

    #[test]
    fn test_rearm_invalidates_older_click() {
        let toggles = ToggleDebounce::new();
        let first = toggles.arm(1, Some(2));
        let second = toggles.arm(1, Some(3));
        assert_eq!(toggles.take(1, first), None);
        assert_eq!(toggles.take(1, second), Some(Some(3)));
    }
}
