//! Tab lifecycle handlers: created, removed, activated.

use super::strip::{self, MoveKind};
use super::Background;
use crate::error::Result;
use crate::group::{group_page_url, GroupTab, TabId};
use crate::platform::{CreateTab, TabInfo};
use crate::session::{tags, MEMBER_TAG};
use crate::storage::Removal;

impl Background {
    pub(super) async fn on_created(&self, tab: TabInfo) -> Result<()> {
        if self.storage.is_group(tab.id) || self.is_pending(tab.id) {
            return Ok(());
        }

        let platform = self.platform.as_ref();
        let group_tag = tags::read_group_tag(platform, tab.id).await;
        let mut member_tag = tags::read_member_tag(platform, tab.id).await;

        if let Some(record) = group_tag {
            if !self.storage.is_group(record.id) {
                return self.reopen_group(&tab, record).await;
            }
            // A duplicate of a live container is an ordinary tab, placed like any other.
            tracing::debug!("Tab {} duplicates group tab {}, untagging", tab.id, record.id);
            tags::clear_tags(platform, tab.id).await;
            member_tag = None;
        }

        let tabs = platform.query_tabs(None).await?;
        let groups = self.storage.all_group_tabs();

        let mut target = match strip::classify(&tabs, tab.id, &groups) {
            MoveKind::Admission { group_id, offset } => Some((group_id, offset)),
            _ => None,
        };
        if target.is_none() {
            let reopened = member_tag.and_then(|old| self.reopened.lock().get(&old).copied());
            let opener_group = tab
                .opener_tab_id
                .and_then(|opener| groups.iter().find(|g| g.contains(opener)).map(|g| g.id));
            if let Some(owner) = reopened.or(opener_group) {
                target = appended_after(&tabs, tab.id, owner, &groups).map(|offset| (owner, offset));
            }
        }

        match target {
            Some((group_id, offset)) => {
                tracing::debug!("Tab {} opened inside group {}", tab.id, group_id);
                self.storage
                    .add_inner_tab(group_id, tab.id, Some(offset))
                    .await?;
                self.sync_member_visibility(group_id, tab.id).await?;
            }
            None if member_tag.is_some() => {
                if let Err(e) = platform.remove_tab_value(tab.id, MEMBER_TAG).await {
                    tracing::debug!("Clearing stale member tag on {} failed: {}", tab.id, e);
                }
            }
            None => {}
        }
        Ok(())
    }

    /// A container tab came back (undo close) under a new id
    async fn reopen_group(&self, tab: &TabInfo, record: GroupTab) -> Result<()> {
        let group = self
            .storage
            .add_group_tab(tab.id, record.name.clone(), Vec::new())
            .await?;
        if record.icon.is_some() {
            self.storage
                .update_group_tab_icon(group.id, record.icon.clone())
                .await?;
        }
        if record.is_closed_group_mode != group.is_closed_group_mode {
            self.storage
                .set_closed_group_mode(group.id, record.is_closed_group_mode)
                .await?;
        }
        self.reopened.lock().insert(record.id, tab.id);

        if let Err(e) = self
            .platform
            .update_tab(tab.id, Some(group_page_url(tab.id)), Some(record.name))
            .await
        {
            tracing::warn!("Updating reopened group tab {} failed: {}", tab.id, e);
        }
        tracing::info!("Group {} reopened as {}", record.id, tab.id);
        Ok(())
    }

    pub(super) async fn on_removed(&self, tab_id: TabId, is_window_closing: bool) -> Result<()> {
        self.toggles.cancel(tab_id);
        self.set_pending(tab_id, false);

        let Removal::Group(group) = self.storage.remove_tab_from_storage(tab_id).await? else {
            return Ok(());
        };
        self.reopened.lock().retain(|_, new| *new != tab_id);
        if is_window_closing {
            return Ok(());
        }

        let settings = self.storage.settings();
        if !group.inner_tabs.is_empty() {
            let result = if settings.close_inner_tabs_with_group {
                self.platform.remove_tabs(&group.inner_tabs).await
            } else {
                self.platform.show_tabs(&group.inner_tabs).await
            };
            if let Err(e) = result {
                tracing::warn!("Releasing tabs of closed group {} failed: {}", group.id, e);
            }
        }

        if settings.show_notifications {
            let message = if settings.close_inner_tabs_with_group {
                format!(
                    "\"{}\" was closed with its {} tab(s)",
                    group.name,
                    group.inner_tabs.len()
                )
            } else {
                format!(
                    "\"{}\" was closed, its {} tab(s) are no longer grouped",
                    group.name,
                    group.inner_tabs.len()
                )
            };
            if let Err(e) = self.platform.notify("Group closed", &message).await {
                tracing::debug!("Notification failed: {}", e);
            }
        }
        Ok(())
    }

    /// Clicking a group tab toggles it, unless a drag claims the toggle
    /// within the click window.
    pub(super) async fn on_activated(&self, tab_id: TabId, previous: Option<TabId>) -> Result<()> {
        let Some(group) = self.storage.get_group_tab_by_id(tab_id) else {
            return Ok(());
        };
        if group.is_closed_group_mode {
            tracing::debug!("Group {} is in closed-group mode, not toggling", tab_id);
            return Ok(());
        }

        let token = self.toggles.arm(tab_id, previous);
        tokio::time::sleep(self.storage.settings().click_window()).await;
        match self.toggles.take(tab_id, token) {
            Some(previous) => self.apply_toggle(tab_id, previous).await,
            None => Ok(()),
        }
    }

    pub(super) async fn apply_toggle(&self, group_id: TabId, previous: Option<TabId>) -> Result<()> {
        let group = self.storage.toggle_group_tab_visibility(group_id).await?;
        tracing::debug!(
            "Group {} {}",
            group_id,
            if group.is_open { "opened" } else { "closed" }
        );
        self.sync_visibility(&group).await;
        self.resolve_focus(&group, previous).await;
        Ok(())
    }

    /// Move focus off the group tab: back to the previous tab, else to the
    /// nearest visible tab, else to a new blank tab after the range.
    async fn resolve_focus(&self, group: &GroupTab, previous: Option<TabId>) {
        let container = match self.platform.get_tab(group.id).await {
            Ok(tab) => tab,
            Err(e) => {
                tracing::debug!("Group tab {} gone before focus moved: {}", group.id, e);
                return;
            }
        };
        if !container.active {
            return;
        }

        if let Some(previous) = previous {
            if let Ok(info) = self.platform.get_tab(previous).await {
                if !info.hidden && !self.storage.is_group(previous) {
                    match self.platform.activate_tab(previous).await {
                        Ok(()) => return,
                        Err(e) => tracing::warn!("Focusing tab {} failed: {}", previous, e),
                    }
                }
            }
        }

        let window = container.window_id;
        let tabs = self
            .platform
            .query_tabs(Some(window))
            .await
            .unwrap_or_default();
        let strip = strip::window_strip(&tabs, window);
        let start = strip
            .iter()
            .position(|&id| id == group.id)
            .unwrap_or(container.index);
        let end = start + strip.iter().filter(|&&id| group.contains(id)).count();

        let nearest = tabs
            .iter()
            .filter(|t| !t.hidden && !self.storage.is_group(t.id))
            .filter_map(|t| {
                let at = strip.iter().position(|&id| id == t.id)?;
                let distance = if at < start {
                    start - at
                } else {
                    at.saturating_sub(end)
                };
                Some(((distance, at < start), t.id))
            })
            .min_by_key(|&(key, _)| key);

        if let Some((_, id)) = nearest {
            match self.platform.activate_tab(id).await {
                Ok(()) => return,
                Err(e) => tracing::warn!("Focusing tab {} failed: {}", id, e),
            }
        }

        if let Err(e) = self
            .platform
            .create_tab(CreateTab::blank(window, end + 1))
            .await
        {
            tracing::warn!("Opening a tab next to group {} failed: {}", group.id, e);
        }
    }
}

/// Offset at the end of `owner` if `tab` sits right after its last member
fn appended_after(
    tabs: &[TabInfo],
    tab: TabId,
    owner: TabId,
    groups: &[GroupTab],
) -> Option<usize> {
    let window = tabs.iter().find(|t| t.id == tab)?.window_id;
    let strip = strip::window_strip(tabs, window);
    let at = strip.iter().position(|&id| id == tab)?;
    let others: Vec<TabId> = strip.into_iter().filter(|&id| id != tab).collect();
    let range = strip::ranges(&others, groups)
        .into_iter()
        .find(|r| r.group_id == owner)?;
    (at == range.end() + 1).then_some(range.members)
}
