//! User commands, reached from menus, messages and the CLI.

use super::strip;
use super::Background;
use crate::config::NewGroupPosition;
use crate::error::{Error, Result};
use crate::group::{group_page_url, GroupTab, TabId, WindowId};
use crate::platform::{CreateTab, DialogOutcome, DialogRequest};
use crate::storage::{Removal, TabRole};

impl Background {
    /// Create a group from `tabs`.
    ///
    /// Without a name the user is prompted; a cancelled prompt returns
    /// `Ok(None)`. Tabs that belong to another group leave it first.
    pub async fn create_group(
        &self,
        name: Option<String>,
        tabs: Vec<TabId>,
        window_id: Option<WindowId>,
    ) -> Result<Option<GroupTab>> {
        let settings = self.storage.settings();
        let all = self.platform.query_tabs(None).await?;

        let mut selected = Vec::new();
        for id in tabs {
            if self.storage.is_group(id) {
                return Err(Error::invalid(format!("tab {id} is a group tab")));
            }
            if !all.iter().any(|t| t.id == id) {
                return Err(Error::platform(format!("Invalid tab ID: {id}")));
            }
            if !selected.contains(&id) {
                selected.push(id);
            }
        }

        let window = window_id
            .or_else(|| {
                let first = selected.first()?;
                all.iter().find(|t| t.id == *first).map(|t| t.window_id)
            })
            .or_else(|| all.first().map(|t| t.window_id))
            .ok_or_else(|| Error::platform("No open window"))?;

        let name = match name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => {
                let context = selected.first().copied().or_else(|| {
                    all.iter()
                        .find(|t| t.window_id == window && t.active)
                        .map(|t| t.id)
                });
                let default = settings.default_group_name.clone();
                match context {
                    Some(tab) => match self.prompt(tab, "Name the new group", &default).await {
                        Some(name) => name,
                        None => return Ok(None),
                    },
                    None => default,
                }
            }
        };

        let mut left = Vec::new();
        for &id in &selected {
            if let Some(TabRole::Inner { group, .. }) =
                self.storage.get_group_tab_or_inner_tab_by_id(id)
            {
                self.storage.remove_inner_tab(group.id, id).await?;
                left.push(group.id);
            }
        }

        // Placement is computed after the prompt; the strip may have changed.
        let tabs = self.platform.query_tabs(None).await?;
        let strip = strip::window_strip(&tabs, window);
        let others: Vec<TabId> = strip
            .iter()
            .copied()
            .filter(|id| !selected.contains(id))
            .collect();
        let slot = match settings.new_group_position {
            NewGroupPosition::End => strip.len(),
            NewGroupPosition::BeforeSelection => {
                match strip.iter().position(|id| selected.contains(id)) {
                    Some(at) => {
                        let index =
                            strip::outside_ranges(&others, at, &self.storage.all_group_tabs());
                        if index == at {
                            at
                        } else {
                            others
                                .get(index)
                                .and_then(|id| strip.iter().position(|s| s == id))
                                .unwrap_or(strip.len())
                        }
                    }
                    None => strip.len(),
                }
            }
        };

        let container = self
            .platform
            .create_tab(CreateTab {
                window_id: Some(window),
                index: Some(slot),
                title: Some(name.clone()),
                ..Default::default()
            })
            .await?;

        self.set_pending(container.id, true);
        let result = self
            .storage
            .add_group_tab(container.id, name.clone(), selected)
            .await;
        self.set_pending(container.id, false);

        let group = match result {
            Ok(group) => group,
            Err(e) => {
                if let Err(close) = self.platform.remove_tabs(&[container.id]).await {
                    tracing::warn!("Closing orphan group tab {} failed: {}", container.id, close);
                }
                return Err(e);
            }
        };

        if let Err(e) = self
            .platform
            .update_tab(group.id, Some(group_page_url(group.id)), Some(name))
            .await
        {
            tracing::warn!("Loading group page in tab {} failed: {}", group.id, e);
        }
        self.assert_contiguity(group.id).await;
        for old in left {
            self.assert_contiguity(old).await;
        }
        self.sync_visibility(&group).await;

        tracing::info!(
            "Created group {} \"{}\" with {} tab(s)",
            group.id,
            group.name,
            group.len()
        );
        Ok(Some(group))
    }

    /// Open a closed-group-mode group and focus its first member
    pub async fn enter_group(&self, group_id: TabId) -> Result<()> {
        let group = self
            .storage
            .get_group_tab_by_id(group_id)
            .ok_or(Error::UnknownGroup(group_id))?;
        self.set_open(group_id, true).await?;
        let target = group.inner_tabs.first().copied().unwrap_or(group_id);
        self.platform.activate_tab(target).await
    }

    /// Dissolve a group, keeping its members open
    pub async fn ungroup(&self, group_id: TabId) -> Result<()> {
        if !self.storage.is_group(group_id) {
            return Err(Error::UnknownGroup(group_id));
        }
        let Removal::Group(group) = self.storage.remove_tab_from_storage(group_id).await? else {
            return Err(Error::UnknownGroup(group_id));
        };
        if !group.inner_tabs.is_empty() {
            if let Err(e) = self.platform.show_tabs(&group.inner_tabs).await {
                tracing::warn!("Showing tabs of group {} failed: {}", group_id, e);
            }
        }

        if let Err(e) = self.platform.remove_tabs(&[group_id]).await {
            tracing::warn!("Closing group tab {} failed: {}", group_id, e);
        }
        Ok(())
    }

    /// Close a group together with its members
    pub async fn close_group(&self, group_id: TabId) -> Result<()> {
        let group = self
            .storage
            .get_group_tab_by_id(group_id)
            .ok_or(Error::UnknownGroup(group_id))?;
        self.storage.remove_tab_from_storage(group_id).await?;

        let mut ids = group.inner_tabs.clone();
        ids.push(group_id);
        if let Err(e) = self.platform.remove_tabs(&ids).await {
            tracing::warn!("Closing tabs of group {} failed: {}", group_id, e);
        }
        Ok(())
    }

    /// Rename, prompting when no name is given
    pub async fn rename_group(
        &self,
        group_id: TabId,
        name: Option<String>,
    ) -> Result<Option<GroupTab>> {
        let current = self
            .storage
            .get_group_tab_by_id(group_id)
            .ok_or(Error::UnknownGroup(group_id))?;
        let name = match name {
            Some(name) => name,
            None => match self.prompt(group_id, "Rename group", &current.name).await {
                Some(name) => name,
                None => return Ok(None),
            },
        };

        let group = self.storage.update_group_tab_name(group_id, &name).await?;
        if let Err(e) = self
            .platform
            .update_tab(group_id, None, Some(group.name.clone()))
            .await
        {
            tracing::warn!("Retitling group tab {} failed: {}", group_id, e);
        }
        Ok(Some(group))
    }

    pub async fn set_group_icon(&self, group_id: TabId, icon: Option<String>) -> Result<GroupTab> {
        self.storage.update_group_tab_icon(group_id, icon).await
    }

    pub async fn set_closed_group_mode(&self, group_id: TabId, enabled: bool) -> Result<GroupTab> {
        self.storage.set_closed_group_mode(group_id, enabled).await
    }

    /// Append `tab` to a group and move it into place
    pub async fn move_tab_into_group(&self, tab: TabId, group_id: TabId) -> Result<()> {
        if self.storage.is_group(tab) {
            return Err(Error::invalid(format!("tab {tab} is a group tab")));
        }
        if !self.storage.is_group(group_id) {
            return Err(Error::UnknownGroup(group_id));
        }

        match self.storage.get_group_tab_or_inner_tab_by_id(tab) {
            Some(TabRole::Inner { group, .. }) if group.id == group_id => return Ok(()),
            Some(TabRole::Inner { group, .. }) => {
                self.storage
                    .transfer_inner_tab(group.id, group_id, tab, None)
                    .await?;
            }
            _ => {
                self.storage.add_inner_tab(group_id, tab, None).await?;
            }
        }
        self.assert_contiguity(group_id).await;
        self.sync_member_visibility(group_id, tab).await
    }

    /// Take `tab` out of its group and out of the group's range
    pub async fn remove_tab_from_group(&self, tab: TabId) -> Result<()> {
        let Some(TabRole::Inner { group, .. }) = self.storage.get_group_tab_or_inner_tab_by_id(tab)
        else {
            return Err(Error::invalid(format!("tab {tab} is not in a group")));
        };
        self.storage.remove_inner_tab(group.id, tab).await?;
        if let Err(e) = self.platform.show_tabs(&[tab]).await {
            tracing::warn!("Showing tab {} failed: {}", tab, e);
        }
        self.push_out(tab).await;
        Ok(())
    }

    /// Ask for a line of text; `None` when cancelled or the dialog failed
    async fn prompt(&self, tab: TabId, message: &str, default: &str) -> Option<String> {
        let request = DialogRequest::prompt("Group Tabs", message, default);
        match self.platform.show_dialog(tab, request).await {
            Ok(DialogOutcome::Cancelled) => None,
            Ok(outcome) => Some(outcome.value().unwrap_or(default).to_string()),
            Err(e) => {
                tracing::debug!("Prompt on tab {} failed: {}", tab, e);
                None
            }
        }
    }
}
