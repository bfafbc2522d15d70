//! Authoritative group state.
//!
//! Every mutation runs under one async write gate: validate, mutate the
//! cache, persist the whole `groupTabs` value, and only then notify. A failed
//! write restores the cache snapshot, so memory never runs ahead of the store.
//! Reads go straight to the cache and never await.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use super::{KeyValueStore, GROUP_TABS_KEY, SETTINGS_KEY};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::group::{AddEvent, EditEvent, GroupTab, Notifiers, RemoveEvent, TabId};

type GroupMap = BTreeMap<TabId, GroupTab>;

/// What a tab id is to the group map
#[derive(Debug, Clone, PartialEq)]
pub enum TabRole {
    Group(GroupTab),
    Inner { group: GroupTab, index: usize },
}

/// Outcome of purging a closed tab
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    Group(GroupTab),
    InnerTab { group: GroupTab, index: usize },
    Nothing,
}

pub struct StorageManager {
    store: Arc<dyn KeyValueStore>,
    groups: RwLock<GroupMap>,
    settings: RwLock<Settings>,
    gate: Mutex<()>,
    loaded: watch::Sender<bool>,
    notifiers: Notifiers,
}

impl StorageManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            store,
            groups: RwLock::new(GroupMap::new()),
            settings: RwLock::new(Settings::default()),
            gate: Mutex::new(()),
            loaded,
            notifiers: Notifiers::new(),
        }
    }

    pub fn notifiers(&self) -> &Notifiers {
        &self.notifiers
    }

    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    /// Populate the cache from the store, writing defaults on first run.
    ///
    /// Mutations issued before this completes wait for it.
    pub async fn load_storage(&self) -> Result<()> {
        let stored_groups = self.store.get(GROUP_TABS_KEY).await?;
        let stored_settings = self.store.get(SETTINGS_KEY).await?;

        if stored_groups.is_none() && stored_settings.is_none() {
            return self.setup_default_storage().await;
        }

        let groups = match stored_groups {
            Some(value) => parse_groups(value)?,
            None => GroupMap::new(),
        };
        let settings = match stored_settings {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!("Stored settings unreadable, using defaults: {}", e);
                Settings::default()
            }),
            None => Settings::default(),
        };

        tracing::info!("Loaded {} group(s) from storage", groups.len());
        *self.groups.write() = groups;
        *self.settings.write() = settings;
        self.loaded.send_replace(true);
        Ok(())
    }

    /// Write an empty group map and default settings
    pub async fn setup_default_storage(&self) -> Result<()> {
        let settings = Settings::default();
        self.store
            .set(GROUP_TABS_KEY, Value::Object(Default::default()))
            .await?;
        self.store
            .set(SETTINGS_KEY, serde_json::to_value(&settings)?)
            .await?;

        *self.groups.write() = GroupMap::new();
        *self.settings.write() = settings;
        self.loaded.send_replace(true);
        tracing::info!("Initialized default storage");
        Ok(())
    }

    async fn wait_loaded(&self) {
        let mut rx = self.loaded.subscribe();
        let _ = rx.wait_for(|loaded| *loaded).await;
    }

    /// Run one read-modify-write step.
    ///
    /// `mutate` returns its output and whether anything changed; unchanged
    /// steps skip the write.
    async fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut GroupMap) -> Result<(T, bool)>,
    ) -> Result<T> {
        self.wait_loaded().await;
        let _gate = self.gate.lock().await;

        let (snapshot, value, out) = {
            let mut groups = self.groups.write();
            let snapshot = groups.clone();
            let (out, changed) = match mutate(&mut *groups) {
                Ok(result) => result,
                Err(e) => {
                    *groups = snapshot;
                    return Err(e);
                }
            };
            if !changed {
                return Ok(out);
            }
            match serde_json::to_value(&*groups) {
                Ok(value) => (snapshot, value, out),
                Err(e) => {
                    *groups = snapshot;
                    return Err(e.into());
                }
            }
        };

        if let Err(e) = self.store.set(GROUP_TABS_KEY, value).await {
            tracing::warn!("Persisting groups failed, rolling back: {}", e);
            *self.groups.write() = snapshot;
            return Err(e);
        }
        Ok(out)
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    pub async fn add_group_tab(
        &self,
        id: TabId,
        name: impl Into<String>,
        inner_tabs: Vec<TabId>,
    ) -> Result<GroupTab> {
        let mut group = GroupTab::new(id, name, inner_tabs)?;
        group.is_closed_group_mode = self.settings.read().closed_group_mode_default;

        let group = self
            .commit(|groups| {
                if groups.contains_key(&id) {
                    return Err(Error::DuplicateGroup(id));
                }
                if let Some(owner) = owner_of(groups, id) {
                    return Err(Error::invalid(format!(
                        "tab {id} is already a member of group {owner}"
                    )));
                }
                for &tab in &group.inner_tabs {
                    ensure_free(groups, tab, None)?;
                }
                groups.insert(id, group.clone());
                Ok((group, true))
            })
            .await?;

        tracing::debug!("Added group {} ({})", group.id, group.name);
        self.notifiers.add.notify(&AddEvent::GroupTabAdded {
            group: group.clone(),
        });
        Ok(group)
    }

    /// Insert `tab` into a group at `index` (clamped) or at the end.
    ///
    /// Returns the resolved index, or `None` if the tab already was a member.
    pub async fn add_inner_tab(
        &self,
        group_id: TabId,
        tab: TabId,
        index: Option<usize>,
    ) -> Result<Option<usize>> {
        let added = self
            .commit(|groups| {
                let group = groups.get(&group_id).ok_or(Error::UnknownGroup(group_id))?;
                if group.contains(tab) {
                    return Ok((None, false));
                }
                if tab == group_id || tab < 0 {
                    return Err(Error::invalid(format!(
                        "tab {tab} cannot join group {group_id}"
                    )));
                }
                ensure_free(groups, tab, None)?;

                let group = groups
                    .get_mut(&group_id)
                    .ok_or(Error::UnknownGroup(group_id))?;
                let index = index.unwrap_or(group.len()).min(group.len());
                group.inner_tabs.insert(index, tab);
                Ok((Some((group.clone(), index)), true))
            })
            .await?;

        Ok(added.map(|(group, index)| {
            self.notifiers
                .add
                .notify(&AddEvent::InnerTabAdded { group, index });
            index
        }))
    }

    pub async fn remove_inner_tab(&self, group_id: TabId, tab: TabId) -> Result<GroupTab> {
        let group = self
            .commit(|groups| {
                let group = groups
                    .get_mut(&group_id)
                    .ok_or(Error::UnknownGroup(group_id))?;
                let index = group.position(tab).ok_or(Error::NotAMember {
                    group: group_id,
                    tab,
                })?;
                group.inner_tabs.remove(index);
                Ok((group.clone(), true))
            })
            .await?;

        self.notifiers.remove.notify(&RemoveEvent::InnerTabRemoved {
            group: group.clone(),
            tab_id: tab,
        });
        Ok(group)
    }

    /// Purge a closed tab: a group id deletes the group, a member id leaves
    /// its group, anything else is a no-op.
    pub async fn remove_tab_from_storage(&self, id: TabId) -> Result<Removal> {
        let removal = self
            .commit(|groups| {
                if let Some(group) = groups.remove(&id) {
                    return Ok((Removal::Group(group), true));
                }
                for group in groups.values_mut() {
                    if let Some(index) = group.position(id) {
                        group.inner_tabs.remove(index);
                        return Ok((
                            Removal::InnerTab {
                                group: group.clone(),
                                index,
                            },
                            true,
                        ));
                    }
                }
                Ok((Removal::Nothing, false))
            })
            .await?;

        match &removal {
            Removal::Group(group) => {
                self.notifiers.remove.notify(&RemoveEvent::GroupTabRemoved {
                    group: group.clone(),
                })
            }
            Removal::InnerTab { group, .. } => {
                self.notifiers.remove.notify(&RemoveEvent::InnerTabRemoved {
                    group: group.clone(),
                    tab_id: id,
                })
            }
            Removal::Nothing => {}
        }
        Ok(removal)
    }

    /// Replace a group's record wholesale
    pub async fn update_group_tab(&self, new_state: GroupTab) -> Result<GroupTab> {
        new_state.validate()?;
        let group = self
            .commit(|groups| {
                if !groups.contains_key(&new_state.id) {
                    return Err(Error::UnknownGroup(new_state.id));
                }
                for &tab in &new_state.inner_tabs {
                    ensure_free(groups, tab, Some(new_state.id))?;
                }
                groups.insert(new_state.id, new_state.clone());
                Ok((new_state, true))
            })
            .await?;

        self.notifiers.edit.notify(&EditEvent::GroupTabReplaced {
            group: group.clone(),
        });
        Ok(group)
    }

    /// Move a member to a new position inside its own group.
    ///
    /// Returns false when the member already sits there.
    pub async fn reorder_inner_tab(&self, group_id: TabId, tab: TabId, to: usize) -> Result<bool> {
        let reordered = self
            .commit(|groups| {
                let group = groups
                    .get_mut(&group_id)
                    .ok_or(Error::UnknownGroup(group_id))?;
                let from = group.position(tab).ok_or(Error::NotAMember {
                    group: group_id,
                    tab,
                })?;
                let to = to.min(group.len() - 1);
                if from == to {
                    return Ok((None, false));
                }
                let moved = group.inner_tabs.remove(from);
                group.inner_tabs.insert(to, moved);
                Ok((Some(group.clone()), true))
            })
            .await?;

        match reordered {
            Some(group) => {
                self.notifiers
                    .edit
                    .notify(&EditEvent::GroupTabReplaced { group });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move a member from one group to another in a single step.
    ///
    /// Returns the resolved index in the target group.
    pub async fn transfer_inner_tab(
        &self,
        from_group: TabId,
        to_group: TabId,
        tab: TabId,
        index: Option<usize>,
    ) -> Result<usize> {
        if from_group == to_group {
            return Err(Error::invalid(format!(
                "transfer of tab {tab} within group {from_group}"
            )));
        }

        let (from, to, index) = self
            .commit(|groups| {
                if !groups.contains_key(&to_group) {
                    return Err(Error::UnknownGroup(to_group));
                }
                let from = groups
                    .get_mut(&from_group)
                    .ok_or(Error::UnknownGroup(from_group))?;
                let position = from.position(tab).ok_or(Error::NotAMember {
                    group: from_group,
                    tab,
                })?;
                from.inner_tabs.remove(position);
                let from = from.clone();

                let to = groups
                    .get_mut(&to_group)
                    .ok_or(Error::UnknownGroup(to_group))?;
                let index = index.unwrap_or(to.len()).min(to.len());
                to.inner_tabs.insert(index, tab);
                Ok(((from, to.clone(), index), true))
            })
            .await?;

        self.notifiers.remove.notify(&RemoveEvent::InnerTabRemoved {
            group: from,
            tab_id: tab,
        });
        self.notifiers
            .add
            .notify(&AddEvent::InnerTabAdded { group: to, index });
        Ok(index)
    }

    pub async fn toggle_group_tab_visibility(&self, group_id: TabId) -> Result<GroupTab> {
        self.edit(group_id, |group| {
            group.is_open = !group.is_open;
            Ok(true)
        })
        .await
    }

    /// Set `isOpen`; returns whether it changed
    pub async fn set_group_tab_visibility(&self, group_id: TabId, open: bool) -> Result<bool> {
        let (_, changed) = self
            .edit_tracked(group_id, |group| {
                let changed = group.is_open != open;
                group.is_open = open;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    pub async fn update_group_tab_name(&self, group_id: TabId, name: &str) -> Result<GroupTab> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("group name must not be empty"));
        }
        self.edit(group_id, |group| {
            let changed = group.name != name;
            group.name = name.to_string();
            Ok(changed)
        })
        .await
    }

    pub async fn update_group_tab_icon(
        &self,
        group_id: TabId,
        icon: Option<String>,
    ) -> Result<GroupTab> {
        self.edit(group_id, |group| {
            let changed = group.icon != icon;
            group.icon = icon;
            Ok(changed)
        })
        .await
    }

    pub async fn set_closed_group_mode(&self, group_id: TabId, enabled: bool) -> Result<GroupTab> {
        self.edit(group_id, |group| {
            let changed = group.is_closed_group_mode != enabled;
            group.is_closed_group_mode = enabled;
            Ok(changed)
        })
        .await
    }

    /// Field-level edit that fires `GroupTabEdited` when something changed
    async fn edit(
        &self,
        group_id: TabId,
        apply: impl FnOnce(&mut GroupTab) -> Result<bool>,
    ) -> Result<GroupTab> {
        Ok(self.edit_tracked(group_id, apply).await?.0)
    }

    async fn edit_tracked(
        &self,
        group_id: TabId,
        apply: impl FnOnce(&mut GroupTab) -> Result<bool>,
    ) -> Result<(GroupTab, bool)> {
        let (group, changed) = self
            .commit(|groups| {
                let group = groups
                    .get_mut(&group_id)
                    .ok_or(Error::UnknownGroup(group_id))?;
                let changed = apply(group)?;
                Ok(((group.clone(), changed), changed))
            })
            .await?;

        if changed {
            self.notifiers.edit.notify(&EditEvent::GroupTabEdited {
                group: group.clone(),
            });
        }
        Ok((group, changed))
    }

    /// Swap in a rebuilt map (session recovery) and announce every group
    pub async fn restore_groups(&self, restored: Vec<GroupTab>) -> Result<()> {
        let mut map = GroupMap::new();
        for group in restored {
            group.validate()?;
            if map.contains_key(&group.id) {
                return Err(Error::DuplicateGroup(group.id));
            }
            for &tab in &group.inner_tabs {
                ensure_free(&map, tab, None)?;
            }
            map.insert(group.id, group);
        }
        for group in map.values() {
            if let Some(owner) = owner_of(&map, group.id) {
                return Err(Error::invalid(format!(
                    "group {} is listed as a member of group {owner}",
                    group.id
                )));
            }
        }

        let announced: Vec<GroupTab> = map.values().cloned().collect();
        self.commit(move |groups| {
            *groups = map;
            Ok(((), true))
        })
        .await?;

        for group in announced {
            self.notifiers.add.notify(&AddEvent::GroupTabAdded { group });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get_group_tab_by_id(&self, id: TabId) -> Option<GroupTab> {
        self.groups.read().get(&id).cloned()
    }

    pub fn get_group_tab_or_inner_tab_by_id(&self, id: TabId) -> Option<TabRole> {
        let groups = self.groups.read();
        if let Some(group) = groups.get(&id) {
            return Some(TabRole::Group(group.clone()));
        }
        groups.values().find_map(|group| {
            group.position(id).map(|index| TabRole::Inner {
                group: group.clone(),
                index,
            })
        })
    }

    pub fn get_all_group_tab_ids(&self) -> Vec<TabId> {
        self.groups.read().keys().copied().collect()
    }

    pub fn all_group_tabs(&self) -> Vec<GroupTab> {
        self.groups.read().values().cloned().collect()
    }

    pub fn is_group(&self, id: TabId) -> bool {
        self.groups.read().contains_key(&id)
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<()> {
        self.wait_loaded().await;
        let _gate = self.gate.lock().await;
        self.store
            .set(SETTINGS_KEY, serde_json::to_value(&settings)?)
            .await?;
        *self.settings.write() = settings;
        tracing::debug!("Settings updated");
        Ok(())
    }
}

fn owner_of(groups: &GroupMap, tab: TabId) -> Option<TabId> {
    groups
        .values()
        .find(|group| group.contains(tab))
        .map(|group| group.id)
}

/// A tab may join a group only if it is not a group itself and belongs to no
/// other group (`allowed` is the group being written, if any).
fn ensure_free(groups: &GroupMap, tab: TabId, allowed: Option<TabId>) -> Result<()> {
    if groups.contains_key(&tab) {
        return Err(Error::invalid(format!("tab {tab} is a group tab")));
    }
    match owner_of(groups, tab) {
        Some(owner) if Some(owner) != allowed => Err(Error::invalid(format!(
            "tab {tab} is already a member of group {owner}"
        ))),
        _ => Ok(()),
    }
}

/// Parse the stored map, dropping records that break the invariants
fn parse_groups(value: Value) -> Result<GroupMap> {
    let raw: BTreeMap<String, Value> = serde_json::from_value(value)?;
    let mut groups = GroupMap::new();

    for (key, record) in raw {
        let group: GroupTab = match serde_json::from_value(record) {
            Ok(group) => group,
            Err(e) => {
                tracing::warn!("Dropping unreadable group record {}: {}", key, e);
                continue;
            }
        };
        if let Err(e) = group.validate() {
            tracing::warn!("Dropping invalid group {}: {}", group.id, e);
            continue;
        }
        groups.insert(group.id, group);
    }

    // Enforce one owner per tab and no group-in-group, first group wins.
    let group_ids: HashSet<TabId> = groups.keys().copied().collect();
    let mut claimed = HashSet::new();
    for group in groups.values_mut() {
        group
            .inner_tabs
            .retain(|tab| !group_ids.contains(tab) && claimed.insert(*tab));
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use parking_lot::Mutex as SyncMutex;
    use proptest::prelude::*;
    use serde_json::json;

    async fn manager() -> (Arc<MemoryStore>, StorageManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = StorageManager::new(store.clone());
        manager.load_storage().await.unwrap();
        (store, manager)
    }

    #[tokio::test]
    async fn test_add_group_and_duplicate() {
        let (store, manager) = manager().await;
        manager.add_group_tab(1, "Work", vec![2, 3]).await.unwrap();

        let err = manager.add_group_tab(1, "Again", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateGroup(1)));
        assert_eq!(manager.get_group_tab_by_id(1).unwrap().name, "Work");

        let stored = store.snapshot(GROUP_TABS_KEY).unwrap();
        assert_eq!(stored["1"]["innerTabs"], json!([2, 3]));
    }

    #[tokio::test]
    async fn test_membership_invariants() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2]).await.unwrap();
        manager.add_group_tab(10, "B", vec![]).await.unwrap();

        // Already a member elsewhere, a group id, or the group itself.
        assert!(manager.add_inner_tab(10, 2, None).await.is_err());
        assert!(manager.add_inner_tab(10, 1, None).await.is_err());
        assert!(manager.add_inner_tab(10, 10, None).await.is_err());
        assert!(manager.add_group_tab(2, "C", vec![]).await.is_err());

        // Idempotent insert.
        assert_eq!(manager.add_inner_tab(1, 3, Some(0)).await.unwrap(), Some(0));
        assert_eq!(manager.add_inner_tab(1, 3, None).await.unwrap(), None);
        assert_eq!(manager.get_group_tab_by_id(1).unwrap().inner_tabs, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_add_inner_tab_clamps_index() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2]).await.unwrap();
        assert_eq!(manager.add_inner_tab(1, 5, Some(99)).await.unwrap(), Some(1));
        assert_eq!(manager.get_group_tab_by_id(1).unwrap().inner_tabs, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_remove_twice() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2, 3]).await.unwrap();

        manager.remove_inner_tab(1, 2).await.unwrap();
        let err = manager.remove_inner_tab(1, 2).await.unwrap_err();
        assert!(matches!(err, Error::NotAMember { group: 1, tab: 2 }));

        assert_eq!(
            manager.remove_tab_from_storage(3).await.unwrap(),
            Removal::InnerTab {
                group: manager.get_group_tab_by_id(1).unwrap(),
                index: 0
            }
        );
        assert_eq!(
            manager.remove_tab_from_storage(3).await.unwrap(),
            Removal::Nothing
        );
    }

    #[tokio::test]
    async fn test_remove_group_tab() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2]).await.unwrap();
        let removed = Arc::new(SyncMutex::new(Vec::new()));
        let sink = removed.clone();
        manager
            .notifiers()
            .remove
            .subscribe(Arc::new(move |e: &RemoveEvent| sink.lock().push(e.clone())));

        match manager.remove_tab_from_storage(1).await.unwrap() {
            Removal::Group(group) => assert_eq!(group.inner_tabs, vec![2]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(manager.get_all_group_tab_ids().is_empty());
        assert!(matches!(
            removed.lock().as_slice(),
            [RemoveEvent::GroupTabRemoved { .. }]
        ));
    }

    #[tokio::test]
    async fn test_toggle_twice_emits_two_edits() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![]).await.unwrap();
        let edits = Arc::new(SyncMutex::new(0));
        let counter = edits.clone();
        manager.notifiers().edit.subscribe(Arc::new(move |e: &EditEvent| {
            if matches!(e, EditEvent::GroupTabEdited { .. }) {
                *counter.lock() += 1;
            }
        }));

        assert!(!manager.toggle_group_tab_visibility(1).await.unwrap().is_open);
        assert!(manager.toggle_group_tab_visibility(1).await.unwrap().is_open);
        assert_eq!(*edits.lock(), 2);

        let err = manager.toggle_group_tab_visibility(99).await.unwrap_err();
        assert!(matches!(err, Error::UnknownGroup(99)));
    }

    #[tokio::test]
    async fn test_reorder_round_trip() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2, 3, 4]).await.unwrap();

        assert!(manager.reorder_inner_tab(1, 2, 2).await.unwrap());
        assert_eq!(manager.get_group_tab_by_id(1).unwrap().inner_tabs, vec![3, 4, 2]);
        assert!(manager.reorder_inner_tab(1, 2, 0).await.unwrap());
        assert_eq!(manager.get_group_tab_by_id(1).unwrap().inner_tabs, vec![2, 3, 4]);
        assert!(!manager.reorder_inner_tab(1, 2, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_transfer_inner_tab() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2, 3]).await.unwrap();
        manager.add_group_tab(10, "B", vec![11]).await.unwrap();

        assert_eq!(manager.transfer_inner_tab(1, 10, 3, Some(0)).await.unwrap(), 0);
        assert_eq!(manager.get_group_tab_by_id(1).unwrap().inner_tabs, vec![2]);
        assert_eq!(manager.get_group_tab_by_id(10).unwrap().inner_tabs, vec![3, 11]);

        let err = manager.transfer_inner_tab(1, 10, 3, None).await.unwrap_err();
        assert!(matches!(err, Error::NotAMember { .. }));
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let (store, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2]).await.unwrap();

        store.set_fail_writes(true);
        assert!(manager.add_inner_tab(1, 3, None).await.is_err());
        assert!(manager.remove_tab_from_storage(1).await.is_err());
        assert!(manager.update_group_tab_name(1, "B").await.is_err());

        let group = manager.get_group_tab_by_id(1).unwrap();
        assert_eq!(group.inner_tabs, vec![2]);
        assert_eq!(group.name, "A");
    }

    #[tokio::test]
    async fn test_lookup_roles() {
        let (_, manager) = manager().await;
        manager.add_group_tab(1, "A", vec![2, 3]).await.unwrap();

        assert!(matches!(
            manager.get_group_tab_or_inner_tab_by_id(1),
            Some(TabRole::Group(_))
        ));
        assert!(matches!(
            manager.get_group_tab_or_inner_tab_by_id(3),
            Some(TabRole::Inner { index: 1, .. })
        ));
        assert!(manager.get_group_tab_or_inner_tab_by_id(4).is_none());
    }

    #[tokio::test]
    async fn test_mutation_waits_for_load() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                GROUP_TABS_KEY,
                json!({ "1": { "id": 1, "name": "A", "innerTabs": [2], "isOpen": true } }),
            )
            .await
            .unwrap();
        let manager = Arc::new(StorageManager::new(store));

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.add_inner_tab(1, 3, None).await })
        };
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        manager.load_storage().await.unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), Some(1));
        assert_eq!(manager.get_group_tab_by_id(1).unwrap().inner_tabs, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_load_drops_conflicting_members() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                GROUP_TABS_KEY,
                json!({
                    "1": { "id": 1, "name": "A", "innerTabs": [2, 3] },
                    "5": { "id": 5, "name": "B", "innerTabs": [3, 1, 6] },
                    "9": { "id": 9, "name": "" }
                }),
            )
            .await
            .unwrap();
        let manager = StorageManager::new(store);
        manager.load_storage().await.unwrap();

        assert_eq!(manager.get_all_group_tab_ids(), vec![1, 5]);
        assert_eq!(manager.get_group_tab_by_id(5).unwrap().inner_tabs, vec![6]);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Add {
            group: TabId,
            tab: TabId,
            index: Option<usize>,
        },
        Remove {
            group: TabId,
            tab: TabId,
        },
        Reorder {
            group: TabId,
            tab: TabId,
            to: usize,
        },
        Transfer {
            from: TabId,
            to: TabId,
            tab: TabId,
        },
    }

    const GROUP_IDS: [TabId; 2] = [1, 10];

    fn op_strategy() -> impl Strategy<Value = Op> {
        let group = || prop::sample::select(GROUP_IDS.to_vec());
        // Tab ids overlap the group ids on purpose
        let tab = || 0_i64..14;
        prop_oneof![
            (group(), tab(), prop::option::of(0_usize..6))
                .prop_map(|(group, tab, index)| Op::Add { group, tab, index }),
            (group(), tab()).prop_map(|(group, tab)| Op::Remove { group, tab }),
            (group(), tab(), 0_usize..6).prop_map(|(group, tab, to)| Op::Reorder { group, tab, to }),
            (group(), tab()).prop_map(|(from, tab)| Op::Transfer {
                from,
                to: if from == GROUP_IDS[0] { GROUP_IDS[1] } else { GROUP_IDS[0] },
                tab,
            }),
        ]
    }

    async fn apply(manager: &StorageManager, op: Op) -> Result<()> {
        match op {
            Op::Add { group, tab, index } => manager.add_inner_tab(group, tab, index).await.map(drop),
            Op::Remove { group, tab } => manager.remove_inner_tab(group, tab).await.map(drop),
            Op::Reorder { group, tab, to } => {
                manager.reorder_inner_tab(group, tab, to).await.map(drop)
            }
            Op::Transfer { from, to, tab } => {
                manager.transfer_inner_tab(from, to, tab, None).await.map(drop)
            }
        }
    }

    fn memberships(manager: &StorageManager) -> Vec<(TabId, Vec<TabId>)> {
        manager
            .all_group_tabs()
            .into_iter()
            .map(|g| (g.id, g.inner_tabs))
            .collect()
    }

    fn assert_membership(manager: &StorageManager) {
        let mut seen = HashSet::new();
        for (group, members) in memberships(manager) {
            for tab in members {
                assert_ne!(tab, group, "group {group} lists itself");
                assert!(!manager.is_group(tab), "group tab {tab} listed as a member");
                assert!(seen.insert(tab), "tab {tab} listed twice");
            }
        }
    }

    proptest! {
        #[test]
        fn proptest_membership_holds_over_any_sequence(
            ops in prop::collection::vec(op_strategy(), 0..60)
        ) {
            tokio_test::block_on(async move {
                let (_, manager) = manager().await;
                manager.add_group_tab(1, "A", vec![2, 3]).await.unwrap();
                manager.add_group_tab(10, "B", vec![]).await.unwrap();

                for op in ops {
                    let before = memberships(&manager);
                    if apply(&manager, op).await.is_err() {
                        assert_eq!(memberships(&manager), before, "rejected {op:?} changed the map");
                    }
                    assert_membership(&manager);
                }
            });
        }

        #[test]
        fn proptest_admit_then_eject_restores_members(
            members in prop::collection::btree_set(2_i64..40, 0..8),
            tab in 40_i64..60,
            index in prop::option::of(0_usize..10),
        ) {
            tokio_test::block_on(async move {
                let (_, manager) = manager().await;
                let members: Vec<TabId> = members.into_iter().collect();
                manager.add_group_tab(1, "A", members.clone()).await.unwrap();

                manager.add_inner_tab(1, tab, index).await.unwrap();
                manager.remove_inner_tab(1, tab).await.unwrap();
                assert_eq!(manager.get_group_tab_by_id(1).unwrap().inner_tabs, members);
            });
        }
    }
}
