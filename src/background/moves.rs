//! Tab-move resolver.
//!
//! `Moved` and `Attached` events both end up here. The move is classified
//! against the live strip, confirmed when settings ask for it, re-classified
//! after any dialog, and then committed. Every corrective move goes through
//! `assert_contiguity` or lands outside all ranges, so the events it causes
//! classify as no-ops.

use std::collections::HashSet;

use super::strip::{self, MoveKind};
use super::Background;
use crate::error::Result;
use crate::group::TabId;
use crate::platform::DialogRequest;
use crate::storage::TabRole;

/// Re-classifications allowed after dialogs before giving up on a move
const MAX_PASSES: usize = 3;

enum Step {
    Done,
    Superseded(MoveKind),
}

impl Background {
    pub(super) async fn handle_move(&self, tab_id: TabId) -> Result<()> {
        if self.is_pending(tab_id) {
            tracing::debug!("Ignoring move of tab {} while it is pending", tab_id);
            return Ok(());
        }

        let mut kind = self.classify(tab_id).await?;
        for _ in 0..MAX_PASSES {
            tracing::debug!("Tab {} moved: {:?}", tab_id, kind);
            match self.apply_move(tab_id, kind).await? {
                Step::Done => return Ok(()),
                Step::Superseded(next) => kind = next,
            }
        }
        tracing::warn!("Move of tab {} kept changing while confirming, reverting", tab_id);
        match self.storage.get_group_tab_or_inner_tab_by_id(tab_id) {
            Some(TabRole::Inner { group, .. }) => self.assert_contiguity(group.id).await,
            Some(TabRole::Group(group)) => self.assert_contiguity(group.id).await,
            None => self.push_out(tab_id).await,
        }
        Ok(())
    }

    async fn classify(&self, tab_id: TabId) -> Result<MoveKind> {
        let tabs = self.platform.query_tabs(None).await?;
        Ok(strip::classify(&tabs, tab_id, &self.storage.all_group_tabs()))
    }

    async fn apply_move(&self, tab_id: TabId, kind: MoveKind) -> Result<Step> {
        let settings = self.storage.settings();
        match kind {
            MoveKind::Free => {}

            MoveKind::GroupMove {
                group_id,
                dropped_into,
            } => {
                let claimed = self.toggles.claim(group_id);
                match dropped_into {
                    Some(other) => self.place_after(group_id, other).await,
                    None => self.assert_contiguity(group_id).await,
                }
                if let Some(previous) = claimed {
                    self.apply_toggle(group_id, previous).await?;
                }
            }

            MoveKind::Reorder { group_id, to } => {
                self.storage.reorder_inner_tab(group_id, tab_id, to).await?;
                self.assert_contiguity(group_id).await;
            }

            MoveKind::Restore { group_id } => {
                self.assert_contiguity(group_id).await;
                if let Some(group) = self.storage.get_group_tab_by_id(group_id) {
                    self.sync_visibility(&group).await;
                }
            }

            MoveKind::Transfer {
                from_group,
                to_group,
                ..
            } => {
                let message = format!(
                    "Move this tab from \"{}\" to \"{}\"?",
                    self.group_name(from_group),
                    self.group_name(to_group)
                );
                if !self
                    .confirm(tab_id, settings.confirm_move_between_groups, message)
                    .await
                {
                    self.assert_contiguity(from_group).await;
                    return Ok(Step::Done);
                }
                let offset = match self.classify(tab_id).await? {
                    MoveKind::Transfer {
                        from_group: f,
                        to_group: t,
                        offset,
                    } if f == from_group && t == to_group => offset,
                    other => return Ok(Step::Superseded(other)),
                };

                self.storage
                    .transfer_inner_tab(from_group, to_group, tab_id, Some(offset))
                    .await?;
                self.assert_contiguity(to_group).await;
                self.assert_contiguity(from_group).await;
                self.sync_member_visibility(to_group, tab_id).await?;
            }

            MoveKind::Ejection { group_id } => {
                let message = format!(
                    "Remove this tab from \"{}\"?",
                    self.group_name(group_id)
                );
                if !self
                    .confirm(tab_id, settings.confirm_move_out_of_group, message)
                    .await
                {
                    self.assert_contiguity(group_id).await;
                    return Ok(Step::Done);
                }
                match self.classify(tab_id).await? {
                    MoveKind::Ejection { group_id: g } if g == group_id => {}
                    other => return Ok(Step::Superseded(other)),
                }

                self.storage.remove_inner_tab(group_id, tab_id).await?;
                if let Err(e) = self.platform.show_tabs(&[tab_id]).await {
                    tracing::warn!("Showing ejected tab {} failed: {}", tab_id, e);
                }
            }

            MoveKind::Admission { group_id, .. } => {
                let message = format!("Move this tab into \"{}\"?", self.group_name(group_id));
                if !self
                    .confirm(tab_id, settings.confirm_move_into_group, message)
                    .await
                {
                    self.push_out(tab_id).await;
                    return Ok(Step::Done);
                }
                let offset = match self.classify(tab_id).await? {
                    MoveKind::Admission {
                        group_id: g,
                        offset,
                    } if g == group_id => offset,
                    other => return Ok(Step::Superseded(other)),
                };

                self.storage
                    .add_inner_tab(group_id, tab_id, Some(offset))
                    .await?;
                self.assert_contiguity(group_id).await;
                self.sync_member_visibility(group_id, tab_id).await?;
            }
        }
        Ok(Step::Done)
    }

    /// Ask the user when `enabled`. Any dialog failure counts as a decline.
    async fn confirm(&self, tab_id: TabId, enabled: bool, message: String) -> bool {
        if !enabled {
            return true;
        }
        self.set_pending(tab_id, true);
        let outcome = self
            .platform
            .show_dialog(tab_id, DialogRequest::confirm("Group Tabs", message))
            .await;
        self.set_pending(tab_id, false);

        match outcome {
            Ok(outcome) => outcome.is_accepted(),
            Err(e) => {
                tracing::debug!("Confirmation on tab {} failed, declining: {}", tab_id, e);
                false
            }
        }
    }

    fn group_name(&self, group_id: TabId) -> String {
        self.storage
            .get_group_tab_by_id(group_id)
            .map(|g| g.name)
            .unwrap_or_default()
    }

    /// Move a declined tab to just past the range it was dropped into
    pub(super) async fn push_out(&self, tab_id: TabId) {
        let result: Result<()> = async {
            let tabs = self.platform.query_tabs(None).await?;
            let Some(tab) = tabs.iter().find(|t| t.id == tab_id) else {
                return Ok(());
            };
            let strip = strip::window_strip(&tabs, tab.window_id);
            let at = strip
                .iter()
                .position(|&id| id == tab_id)
                .unwrap_or_default();
            let others: Vec<TabId> = strip.into_iter().filter(|&id| id != tab_id).collect();
            let index = strip::outside_ranges(&others, at, &self.storage.all_group_tabs());
            if index == at {
                return Ok(());
            }
            self.platform.move_tabs(&[tab_id], tab.window_id, index).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Pushing tab {} out of its group range failed: {}", tab_id, e);
        }
    }

    /// Put group `group_id` with its members right after `other`'s range
    async fn place_after(&self, group_id: TabId, other: TabId) {
        let result: Result<()> = async {
            let Some(group) = self.storage.get_group_tab_by_id(group_id) else {
                return Ok(());
            };
            let tabs = self.platform.query_tabs(None).await?;
            let Some(target) = tabs.iter().find(|t| t.id == other) else {
                self.assert_contiguity(group_id).await;
                return Ok(());
            };
            let window = target.window_id;

            let open: HashSet<TabId> = tabs.iter().map(|t| t.id).collect();
            let mut block = vec![group_id];
            block.extend(group.inner_tabs.iter().filter(|&&id| open.contains(&id)));

            let others: Vec<TabId> = strip::window_strip(&tabs, window)
                .into_iter()
                .filter(|id| !block.contains(id))
                .collect();
            let index = strip::ranges(&others, &self.storage.all_group_tabs())
                .into_iter()
                .find(|r| r.group_id == other)
                .map(|r| r.end() + 1)
                .unwrap_or(others.len());

            tracing::debug!("Group {} dropped inside group {}, moving it after", group_id, other);
            self.platform.move_tabs(&block, window, index).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Moving group {} out of group {} failed: {}", group_id, other, e);
        }
    }
}
