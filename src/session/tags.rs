//! Per-tab session tags.
//!
//! Membership is mirrored onto the tabs themselves (`groupTab` on the
//! container, `groupTabId` on each member) so the layout can be rebuilt
//! after a restart reassigns tab ids. Notifier callbacks are synchronous, so
//! updates are queued and written by [`SessionTagSync::flush`].

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;
use crate::group::{AddEvent, EditEvent, GroupTab, Notifiers, RemoveEvent, TabId};
use crate::platform::Platform;

/// Session key holding the full group record on a container tab
pub const GROUP_TAG: &str = "groupTab";

/// Session key holding the owning group id on a member tab
pub const MEMBER_TAG: &str = "groupTabId";

#[derive(Debug, Clone, PartialEq)]
pub enum TagUpdate {
    Group(GroupTab),
    ClearGroup(TabId),
    Member { tab: TabId, group: TabId },
    ClearMember(TabId),
}

impl TagUpdate {
    pub fn for_add(event: &AddEvent) -> Vec<TagUpdate> {
        match event {
            AddEvent::GroupTabAdded { group } => {
                let mut updates = vec![TagUpdate::Group(group.clone())];
                updates.extend(group.inner_tabs.iter().map(|&tab| TagUpdate::Member {
                    tab,
                    group: group.id,
                }));
                updates
            }
            AddEvent::InnerTabAdded { group, index } => {
                let mut updates = vec![TagUpdate::Group(group.clone())];
                if let Some(&tab) = group.inner_tabs.get(*index) {
                    updates.push(TagUpdate::Member {
                        tab,
                        group: group.id,
                    });
                }
                updates
            }
        }
    }

    pub fn for_remove(event: &RemoveEvent) -> Vec<TagUpdate> {
        match event {
            RemoveEvent::GroupTabRemoved { group } => {
                let mut updates = vec![TagUpdate::ClearGroup(group.id)];
                updates.extend(group.inner_tabs.iter().map(|&t| TagUpdate::ClearMember(t)));
                updates
            }
            RemoveEvent::InnerTabRemoved { group, tab_id } => vec![
                TagUpdate::Group(group.clone()),
                TagUpdate::ClearMember(*tab_id),
            ],
        }
    }

    pub fn for_edit(event: &EditEvent) -> Vec<TagUpdate> {
        vec![TagUpdate::Group(event.group().clone())]
    }

    async fn apply(&self, platform: &dyn Platform) -> Result<()> {
        match self {
            TagUpdate::Group(group) => {
                platform
                    .set_tab_value(group.id, GROUP_TAG, serde_json::to_value(group)?)
                    .await
            }
            TagUpdate::ClearGroup(id) => platform.remove_tab_value(*id, GROUP_TAG).await,
            TagUpdate::Member { tab, group } => {
                platform
                    .set_tab_value(*tab, MEMBER_TAG, Value::from(*group))
                    .await
            }
            TagUpdate::ClearMember(tab) => platform.remove_tab_value(*tab, MEMBER_TAG).await,
        }
    }
}

/// Notifier consumer that keeps session tags in step with the group map
pub struct SessionTagSync {
    tx: mpsc::UnboundedSender<TagUpdate>,
    rx: Mutex<mpsc::UnboundedReceiver<TagUpdate>>,
}

impl SessionTagSync {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Subscribe to all three notifier channels
    pub fn attach(&self, notifiers: &Notifiers) {
        let tx = self.tx.clone();
        notifiers.add.subscribe(Arc::new(move |e: &AddEvent| {
            for update in TagUpdate::for_add(e) {
                let _ = tx.send(update);
            }
        }));
        let tx = self.tx.clone();
        notifiers.remove.subscribe(Arc::new(move |e: &RemoveEvent| {
            for update in TagUpdate::for_remove(e) {
                let _ = tx.send(update);
            }
        }));
        let tx = self.tx.clone();
        notifiers.edit.subscribe(Arc::new(move |e: &EditEvent| {
            for update in TagUpdate::for_edit(e) {
                let _ = tx.send(update);
            }
        }));
    }

    /// Write queued updates in order. Tabs that are already gone are skipped.
    pub async fn flush(&self, platform: &dyn Platform) -> usize {
        let mut rx = self.rx.lock().await;
        let mut applied = 0;
        while let Ok(update) = rx.try_recv() {
            match update.apply(platform).await {
                Ok(()) => applied += 1,
                Err(e) => tracing::debug!("Skipping session tag update {:?}: {}", update, e),
            }
        }
        applied
    }
}

impl Default for SessionTagSync {
    fn default() -> Self {
        Self::new()
    }
}

/// Group record stored on a container tab, if readable
pub async fn read_group_tag(platform: &dyn Platform, tab: TabId) -> Option<GroupTab> {
    let value = platform.get_tab_value(tab, GROUP_TAG).await.ok()??;
    match serde_json::from_value(value) {
        Ok(group) => Some(group),
        Err(e) => {
            tracing::debug!("Ignoring unreadable group tag on tab {}: {}", tab, e);
            None
        }
    }
}

/// Owning group id stored on a member tab
pub async fn read_member_tag(platform: &dyn Platform, tab: TabId) -> Option<TabId> {
    platform
        .get_tab_value(tab, MEMBER_TAG)
        .await
        .ok()??
        .as_i64()
}

/// Strip both tags from a tab
pub async fn clear_tags(platform: &dyn Platform, tab: TabId) {
    for key in [GROUP_TAG, MEMBER_TAG] {
        if let Err(e) = platform.remove_tab_value(tab, key).await {
            tracing::debug!("Clearing {} on tab {} failed: {}", key, tab, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimBrowser;
    use crate::storage::{MemoryStore, StorageManager};
    use serde_json::json;

    #[tokio::test]
    async fn test_tags_follow_membership() {
        let browser = SimBrowser::new();
        browser.add_window(1, &[(1, "g"), (2, "a"), (3, "b")]);
        let manager = StorageManager::new(Arc::new(MemoryStore::new()));
        manager.load_storage().await.unwrap();
        let sync = SessionTagSync::new();
        sync.attach(manager.notifiers());

        manager.add_group_tab(1, "Work", vec![2]).await.unwrap();
        manager.add_inner_tab(1, 3, None).await.unwrap();
        sync.flush(&browser).await;

        assert_eq!(browser.tab_value(2, MEMBER_TAG), Some(json!(1)));
        assert_eq!(browser.tab_value(3, MEMBER_TAG), Some(json!(1)));
        let record = read_group_tag(&browser, 1).await.unwrap();
        assert_eq!(record.inner_tabs, vec![2, 3]);

        manager.remove_inner_tab(1, 2).await.unwrap();
        manager.update_group_tab_name(1, "Play").await.unwrap();
        sync.flush(&browser).await;

        assert_eq!(read_member_tag(&browser, 2).await, None);
        assert_eq!(read_group_tag(&browser, 1).await.unwrap().name, "Play");
    }

    #[tokio::test]
    async fn test_flush_skips_closed_tabs() {
        let browser = SimBrowser::new();
        browser.add_window(1, &[(1, "g")]);
        let sync = SessionTagSync::new();
        sync.tx.send(TagUpdate::ClearMember(42)).unwrap();
        sync.tx
            .send(TagUpdate::Member { tab: 1, group: 7 })
            .unwrap();

        assert_eq!(sync.flush(&browser).await, 1);
        assert_eq!(read_member_tag(&browser, 1).await, Some(7));
    }
}
