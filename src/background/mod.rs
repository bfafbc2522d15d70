//! Background authority.
//!
//! Owns the storage manager and the browser handle, routes platform events
//! to the lifecycle handlers and the move resolver, and flushes the queued
//! side effects of notifier consumers after each event.

mod commands;
mod lifecycle;
mod moves;
pub mod strip;
mod toggle;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::group::{GroupTab, TabId};
use crate::menus::{MenuAction, MenuSync};
use crate::messaging::{Message, Reply};
use crate::platform::{Platform, TabEvent};
use crate::session::{self, RecoveryReason, RecoveryReport, SessionTagSync};
use crate::storage::{KeyValueStore, StorageManager};

pub use strip::MoveKind;
pub use toggle::ToggleDebounce;

pub struct Background {
    storage: Arc<StorageManager>,
    platform: Arc<dyn Platform>,
    toggles: ToggleDebounce,
    /// Tabs with a confirmation dialog open, or being placed by a command
    pending: Mutex<HashSet<TabId>>,
    /// Old id -> new id of groups re-created from a restored container tab
    reopened: Mutex<HashMap<TabId, TabId>>,
    tags: SessionTagSync,
    menus: MenuSync,
}

impl Background {
    /// Wire consumers to an already-loaded storage manager
    pub fn new(storage: Arc<StorageManager>, platform: Arc<dyn Platform>) -> Arc<Self> {
        let tags = SessionTagSync::new();
        tags.attach(storage.notifiers());
        let menus = MenuSync::new();
        menus.attach(storage.notifiers());

        Arc::new(Self {
            storage,
            platform,
            toggles: ToggleDebounce::new(),
            pending: Mutex::new(HashSet::new()),
            reopened: Mutex::new(HashMap::new()),
            tags,
            menus,
        })
    }

    /// Load state, install menus and optionally recover the session
    pub async fn start(
        store: Arc<dyn KeyValueStore>,
        platform: Arc<dyn Platform>,
        recovery: Option<RecoveryReason>,
    ) -> Result<Arc<Self>> {
        let storage = Arc::new(StorageManager::new(store));
        storage.load_storage().await?;
        let background = Self::new(storage, platform);

        // Recovery re-announces every group it keeps, under its new id.
        let groups = match recovery {
            Some(_) => Vec::new(),
            None => background.storage.all_group_tabs(),
        };
        if let Err(e) = background
            .menus
            .install(background.platform.as_ref(), &groups)
            .await
        {
            tracing::warn!("Installing context menu failed: {}", e);
        }

        if let Some(reason) = recovery {
            let report = background.recover_session(reason).await?;
            tracing::debug!("Recovery report: {:?}", report);
        }
        background.flush().await;
        Ok(background)
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub async fn handle_event(&self, event: TabEvent) -> Result<()> {
        tracing::trace!("Handling {:?}", event);
        let result = match event {
            TabEvent::Created { tab } => self.on_created(tab).await,
            TabEvent::Removed {
                tab_id,
                is_window_closing,
                ..
            } => self.on_removed(tab_id, is_window_closing).await,
            TabEvent::Activated {
                tab_id,
                previous_tab_id,
                ..
            } => self.on_activated(tab_id, previous_tab_id).await,
            TabEvent::Moved { tab_id, .. } | TabEvent::Attached { tab_id, .. } => {
                self.handle_move(tab_id).await
            }
            TabEvent::MenuClicked {
                menu_item_id,
                tab_id,
            } => self.on_menu_clicked(&menu_item_id, tab_id).await,
            TabEvent::MenuShown { tab_id } => {
                self.menus
                    .shown(
                        self.platform.as_ref(),
                        tab_id,
                        &self.storage.all_group_tabs(),
                    )
                    .await
            }
            TabEvent::MenuHidden => self.menus.hidden(self.platform.as_ref()).await,
        };
        self.flush().await;
        result
    }

    async fn on_menu_clicked(&self, menu_item_id: &str, tab_id: TabId) -> Result<()> {
        let Some(action) = MenuAction::parse(menu_item_id) else {
            tracing::debug!("Ignoring unknown menu item {}", menu_item_id);
            return Ok(());
        };
        match action {
            MenuAction::CreateGroup => {
                let window = self.platform.get_tab(tab_id).await?.window_id;
                self.create_group(None, vec![tab_id], Some(window)).await?;
            }
            MenuAction::RemoveFromGroup => self.remove_tab_from_group(tab_id).await?,
            MenuAction::MoveToGroup(group) => self.move_tab_into_group(tab_id, group).await?,
        }
        Ok(())
    }

    pub async fn handle_message(&self, message: Message) -> Result<Reply> {
        let reply = match message {
            Message::AddTab {
                name,
                tab_ids,
                window_id,
            } => match self.create_group(name, tab_ids, window_id).await? {
                Some(group) => Reply::Group(group),
                None => Reply::Cancelled,
            },
            Message::RemoveTab {
                group_id,
                close_inner_tabs,
            } => {
                if close_inner_tabs {
                    self.close_group(group_id).await?;
                } else {
                    self.ungroup(group_id).await?;
                }
                Reply::Ok
            }
            Message::EditTab {
                group_id,
                name,
                icon,
                closed_group_mode,
                is_open,
            } => {
                if !self.storage.is_group(group_id) {
                    return Err(Error::UnknownGroup(group_id));
                }
                if let Some(name) = name {
                    self.rename_group(group_id, Some(name)).await?;
                }
                if let Some(icon) = icon {
                    self.storage.update_group_tab_icon(group_id, icon).await?;
                }
                if let Some(enabled) = closed_group_mode {
                    self.storage.set_closed_group_mode(group_id, enabled).await?;
                }
                if let Some(open) = is_open {
                    self.set_open(group_id, open).await?;
                }
                self.storage
                    .get_group_tab_by_id(group_id)
                    .map(Reply::Group)
                    .ok_or(Error::UnknownGroup(group_id))?
            }
            Message::UpdateSettings(settings) => {
                self.storage.update_settings(settings.clone()).await?;
                Reply::Settings(settings)
            }
        };
        self.flush().await;
        Ok(reply)
    }

    /// Rebuild the group map from session tags and re-assert the layout
    pub async fn recover_session(&self, reason: RecoveryReason) -> Result<RecoveryReport> {
        let report = session::recover(&self.storage, self.platform.as_ref(), reason).await?;
        for group in self.storage.all_group_tabs() {
            self.sync_visibility(&group).await;
            self.assert_contiguity(group.id).await;
        }
        self.flush().await;
        Ok(report)
    }

    /// Apply queued session-tag and menu updates
    pub async fn flush(&self) {
        self.tags.flush(self.platform.as_ref()).await;
        self.menus.flush(self.platform.as_ref()).await;
    }

    fn is_pending(&self, tab: TabId) -> bool {
        self.pending.lock().contains(&tab)
    }

    fn set_pending(&self, tab: TabId, pending: bool) {
        let mut set = self.pending.lock();
        if pending {
            set.insert(tab);
        } else {
            set.remove(&tab);
        }
    }

    /// Make the group's container be followed by its members in stored
    /// order. Issues a move only when the layout differs, so the moved
    /// events it causes classify as no-ops.
    async fn assert_contiguity(&self, group_id: TabId) {
        if let Err(e) = self.try_assert_contiguity(group_id).await {
            tracing::warn!("Could not restore layout of group {}: {}", group_id, e);
        }
    }

    async fn try_assert_contiguity(&self, group_id: TabId) -> Result<()> {
        let Some(group) = self.storage.get_group_tab_by_id(group_id) else {
            return Ok(());
        };
        let tabs = self.platform.query_tabs(None).await?;
        let Some(container) = tabs.iter().find(|t| t.id == group_id) else {
            return Err(Error::platform(format!("group tab {group_id} is not open")));
        };
        let window = container.window_id;

        let open: HashSet<TabId> = tabs.iter().map(|t| t.id).collect();
        let members: Vec<TabId> = group
            .inner_tabs
            .iter()
            .copied()
            .filter(|id| open.contains(id))
            .collect();

        let strip = strip::window_strip(&tabs, window);
        let start = strip
            .iter()
            .position(|&id| id == group_id)
            .unwrap_or_default();
        let in_place = members
            .iter()
            .enumerate()
            .all(|(i, &id)| strip.get(start + 1 + i) == Some(&id));
        if in_place || members.is_empty() {
            return Ok(());
        }

        let anchor = strip
            .iter()
            .filter(|&&id| !members.contains(&id))
            .position(|&id| id == group_id)
            .unwrap_or_default();
        tracing::debug!("Re-asserting layout of group {}", group_id);
        self.platform.move_tabs(&members, window, anchor + 1).await
    }

    /// Show or hide all members according to `isOpen`
    async fn sync_visibility(&self, group: &GroupTab) {
        if group.inner_tabs.is_empty() {
            return;
        }
        let result = if group.is_open {
            self.platform.show_tabs(&group.inner_tabs).await
        } else {
            self.platform.hide_tabs(&group.inner_tabs).await
        };
        if let Err(e) = result {
            tracing::warn!("Syncing visibility of group {} failed: {}", group.id, e);
        }
    }

    /// Visibility for a tab that just joined `group_id`. A focused tab
    /// cannot be hidden, so joining a closed group while focused opens it.
    async fn sync_member_visibility(&self, group_id: TabId, tab: TabId) -> Result<()> {
        let Some(group) = self.storage.get_group_tab_by_id(group_id) else {
            return Ok(());
        };
        if group.is_open {
            return self.platform.show_tabs(&[tab]).await;
        }
        let active = self.platform.get_tab(tab).await?.active;
        if active {
            self.set_open(group_id, true).await
        } else {
            self.platform.hide_tabs(&[tab]).await
        }
    }

    /// Set `isOpen` and make member visibility follow
    async fn set_open(&self, group_id: TabId, open: bool) -> Result<()> {
        self.storage.set_group_tab_visibility(group_id, open).await?;
        if let Some(group) = self.storage.get_group_tab_by_id(group_id) {
            self.sync_visibility(&group).await;
        }
        Ok(())
    }
}
