//! Tab-strip geometry.
//!
//! Pure functions over a window's tab order. A group's range is its
//! container slot `g` followed by the slots of its `m` members present in
//! the strip; a tab dropped at `at` is inside another group when
//! `g < at <= g + m`. The container slot itself is never inside.

use crate::group::{GroupTab, TabId, WindowId};
use crate::platform::TabInfo;

/// What a tab position change means for group membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveKind {
    /// A container moved; `dropped_into` is the group it landed inside of
    GroupMove {
        group_id: TabId,
        dropped_into: Option<TabId>,
    },
    /// A member moved within its own group's range
    Reorder { group_id: TabId, to: usize },
    /// A member of a pinned group left its range; it goes back
    Restore { group_id: TabId },
    Transfer {
        from_group: TabId,
        to_group: TabId,
        offset: usize,
    },
    Ejection { group_id: TabId },
    Admission { group_id: TabId, offset: usize },
    Free,
}

/// Slots of one group within a strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub group_id: TabId,
    /// Container slot
    pub start: usize,
    /// Members present in the strip
    pub members: usize,
}

impl Range {
    /// Strict admission range: after the container, up to the last member
    pub fn contains(&self, at: usize) -> bool {
        at > self.start && at <= self.start + self.members
    }

    /// Slot of the last member (the container's slot when empty)
    pub fn end(&self) -> usize {
        self.start + self.members
    }

    /// Range a member of this group may be dropped in without leaving it
    fn reorders(&self, at: usize) -> bool {
        at > self.start && at <= self.end() + 1
    }
}

/// Tab ids of one window in strip order
pub fn window_strip(tabs: &[TabInfo], window_id: WindowId) -> Vec<TabId> {
    let mut strip: Vec<&TabInfo> = tabs.iter().filter(|t| t.window_id == window_id).collect();
    strip.sort_by_key(|t| t.index);
    strip.into_iter().map(|t| t.id).collect()
}

/// Ranges of every group whose container sits in `strip`, in strip order
pub fn ranges(strip: &[TabId], groups: &[GroupTab]) -> Vec<Range> {
    let mut ranges: Vec<Range> = groups
        .iter()
        .filter_map(|group| {
            let start = strip.iter().position(|&id| id == group.id)?;
            let members = strip.iter().filter(|&&id| group.contains(id)).count();
            Some(Range {
                group_id: group.id,
                start,
                members,
            })
        })
        .collect();
    ranges.sort_by_key(|r| r.start);
    ranges
}

/// The range `at` falls strictly inside, if any
pub fn range_at(strip: &[TabId], at: usize, groups: &[GroupTab]) -> Option<Range> {
    ranges(strip, groups).into_iter().find(|r| r.contains(at))
}

/// `at`, or the slot just past the range it would split
pub fn outside_ranges(strip: &[TabId], at: usize, groups: &[GroupTab]) -> usize {
    match range_at(strip, at, groups) {
        Some(range) => range.end() + 1,
        None => at,
    }
}

/// Classify the current position of `moved`.
///
/// `tabs` spans all windows; the moved tab's own window is the destination.
/// Coordinates are taken in that strip with the moved tab removed, so `at`
/// is the slot it was dropped into.
pub fn classify(tabs: &[TabInfo], moved: TabId, groups: &[GroupTab]) -> MoveKind {
    let Some(moved_tab) = tabs.iter().find(|t| t.id == moved) else {
        return MoveKind::Free;
    };
    let strip = window_strip(tabs, moved_tab.window_id);
    let Some(at) = strip.iter().position(|&id| id == moved) else {
        return MoveKind::Free;
    };
    let others: Vec<TabId> = strip.into_iter().filter(|&id| id != moved).collect();
    let ranges = ranges(&others, groups);
    let inside = |skip: TabId| {
        ranges
            .iter()
            .find(|r| r.group_id != skip && r.contains(at))
            .copied()
    };

    if groups.iter().any(|g| g.id == moved) {
        return MoveKind::GroupMove {
            group_id: moved,
            dropped_into: inside(moved).map(|r| r.group_id),
        };
    }

    if let Some(owner) = groups.iter().find(|g| g.contains(moved)) {
        if let Some(own) = ranges.iter().find(|r| r.group_id == owner.id) {
            if own.reorders(at) {
                return MoveKind::Reorder {
                    group_id: owner.id,
                    to: at - own.start - 1,
                };
            }
        }
        let pinned = tabs.iter().any(|t| t.id == owner.id && t.pinned);
        if pinned {
            return MoveKind::Restore { group_id: owner.id };
        }
        return match inside(owner.id) {
            Some(target) => MoveKind::Transfer {
                from_group: owner.id,
                to_group: target.group_id,
                offset: at - target.start - 1,
            },
            None => MoveKind::Ejection { group_id: owner.id },
        };
    }

    match inside(moved) {
        Some(target) => MoveKind::Admission {
            group_id: target.group_id,
            offset: at - target.start - 1,
        },
        None => MoveKind::Free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabs(window: WindowId, ids: &[TabId]) -> Vec<TabInfo> {
        ids.iter()
            .enumerate()
            .map(|(index, &id)| TabInfo {
                id,
                window_id: window,
                index,
                pinned: false,
                hidden: false,
                active: false,
                url: String::new(),
                title: String::new(),
                opener_tab_id: None,
            })
            .collect()
    }

    fn group(id: TabId, members: &[TabId]) -> GroupTab {
        GroupTab::new(id, "G", members.to_vec()).unwrap()
    }

    #[test]
    fn test_range_excludes_container_slot() {
        let range = Range {
            group_id: 1,
            start: 2,
            members: 2,
        };
        assert!(!range.contains(2));
        assert!(range.contains(3));
        assert!(range.contains(4));
        assert!(!range.contains(5));

        let empty = Range {
            group_id: 1,
            start: 2,
            members: 0,
        };
        assert!(!empty.contains(3));
    }

    #[test]
    fn test_admission_offsets() {
        let groups = [group(100, &[102])];
        // 103 dropped between the container and its (possibly hidden) member
        let all = tabs(1, &[99, 100, 103, 102]);
        assert_eq!(
            classify(&all, 103, &groups),
            MoveKind::Admission {
                group_id: 100,
                offset: 0
            }
        );

        let all = tabs(1, &[99, 100, 102, 103]);
        assert_eq!(classify(&all, 103, &groups), MoveKind::Free);

        let all = tabs(1, &[103, 99, 100, 102]);
        assert_eq!(classify(&all, 103, &groups), MoveKind::Free);
    }

    #[test]
    fn test_member_moves() {
        let groups = [group(10, &[11, 12, 13]), group(20, &[21, 22])];

        let all = tabs(1, &[10, 12, 13, 11, 20, 21, 22]);
        assert_eq!(
            classify(&all, 11, &groups),
            MoveKind::Reorder {
                group_id: 10,
                to: 2
            }
        );

        let all = tabs(1, &[10, 12, 13, 20, 21, 11, 22]);
        assert_eq!(
            classify(&all, 11, &groups),
            MoveKind::Transfer {
                from_group: 10,
                to_group: 20,
                offset: 1
            }
        );

        let all = tabs(1, &[10, 12, 13, 20, 21, 22, 11]);
        assert_eq!(
            classify(&all, 11, &groups),
            MoveKind::Ejection { group_id: 10 }
        );

        // Ahead of its own container
        let all = tabs(1, &[11, 10, 12, 13]);
        assert_eq!(
            classify(&all, 11, &groups),
            MoveKind::Ejection { group_id: 10 }
        );
    }

    #[test]
    fn test_group_move_into_other_group() {
        let groups = [group(10, &[11]), group(20, &[21, 22])];

        let all = tabs(1, &[11, 20, 21, 10, 22]);
        assert_eq!(
            classify(&all, 10, &groups),
            MoveKind::GroupMove {
                group_id: 10,
                dropped_into: Some(20)
            }
        );

        let all = tabs(1, &[11, 20, 21, 22, 10]);
        assert_eq!(
            classify(&all, 10, &groups),
            MoveKind::GroupMove {
                group_id: 10,
                dropped_into: None
            }
        );
    }

    #[test]
    fn test_contiguous_layout_is_a_no_op() {
        let groups = [group(10, &[11, 12])];
        let all = tabs(1, &[1, 10, 11, 12, 2]);
        assert_eq!(
            classify(&all, 11, &groups),
            MoveKind::Reorder {
                group_id: 10,
                to: 0
            }
        );
        assert_eq!(
            classify(&all, 12, &groups),
            MoveKind::Reorder {
                group_id: 10,
                to: 1
            }
        );
    }

    #[test]
    fn test_pinned_group_member_restores() {
        let groups = [group(10, &[11]), group(20, &[21])];
        let mut all = tabs(1, &[10]);
        all[0].pinned = true;
        all.extend(tabs(2, &[20, 11, 21]));

        assert_eq!(
            classify(&all, 11, &groups),
            MoveKind::Restore { group_id: 10 }
        );
    }

    #[test]
    fn test_cross_window_member_transfer() {
        let groups = [group(10, &[11]), group(20, &[21])];
        let mut all = tabs(1, &[10]);
        all.extend(tabs(2, &[20, 11, 21]));

        assert_eq!(
            classify(&all, 11, &groups),
            MoveKind::Transfer {
                from_group: 10,
                to_group: 20,
                offset: 0
            }
        );
    }

    #[test]
    fn test_outside_ranges() {
        let groups = [group(10, &[11, 12])];
        let strip = [1, 10, 11, 12, 2];
        assert_eq!(outside_ranges(&strip, 1, &groups), 1);
        assert_eq!(outside_ranges(&strip, 3, &groups), 4);
        assert_eq!(outside_ranges(&strip, 4, &groups), 4);
    }
}
