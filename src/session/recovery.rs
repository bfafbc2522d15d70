//! Rebuild the group map after tab ids were reassigned.
//!
//! Container tabs are found by their `groupTab` tag (or their group page
//! URL); members are the run of tabs right after a container whose
//! `groupTabId` tag names the same old group. Missing containers are looked
//! up in the recently-closed history and reopened.

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::tags::{self, GROUP_TAG, MEMBER_TAG};
use crate::background::strip::window_strip;
use crate::error::Result;
use crate::group::{group_page_url, parse_group_page_url, GroupTab, TabId};
use crate::platform::{Platform, TabInfo};
use crate::storage::StorageManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    /// Browser restored its session; every tab id is new
    BrowserStartup,
    /// Extension reloaded; tab ids usually survive
    ExtensionUpdate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// (old id, new id) per rebuilt group
    pub recovered: Vec<(TabId, TabId)>,
    /// Old ids whose container came back from the closed-tab history
    pub restored_from_history: Vec<TabId>,
    /// Old ids with no container anywhere
    pub dropped: Vec<TabId>,
    /// Tagged tabs found outside their group's run
    pub omitted_members: Vec<TabId>,
}

impl RecoveryReport {
    pub fn new_id(&self, old: TabId) -> Option<TabId> {
        self.recovered
            .iter()
            .find(|(o, _)| *o == old)
            .map(|&(_, new)| new)
    }
}

struct Tagged {
    tab: TabInfo,
    group: Option<GroupTab>,
    member_of: Option<TabId>,
}

async fn read_tags(platform: &dyn Platform) -> Result<Vec<Tagged>> {
    let tabs = platform.query_tabs(None).await?;
    let reads = tabs.into_iter().map(|tab| async move {
        let group = tags::read_group_tag(platform, tab.id).await;
        let member_of = tags::read_member_tag(platform, tab.id).await;
        Tagged {
            tab,
            group,
            member_of,
        }
    });
    Ok(join_all(reads).await)
}

/// Old group id a tab anchors, with the record to rebuild from
fn anchor_of(tagged: &Tagged, known: &BTreeMap<TabId, GroupTab>) -> Option<GroupTab> {
    if let Some(record) = &tagged.group {
        return Some(known.get(&record.id).cloned().unwrap_or_else(|| record.clone()));
    }
    // Members can show a group page too, e.g. a duplicated container
    if tagged.member_of.is_some() {
        return None;
    }
    let old = parse_group_page_url(&tagged.tab.url)?;
    known.get(&old).cloned()
}

pub async fn recover(
    storage: &StorageManager,
    platform: &dyn Platform,
    reason: RecoveryReason,
) -> Result<RecoveryReport> {
    let known: BTreeMap<TabId, GroupTab> = storage
        .all_group_tabs()
        .into_iter()
        .map(|g| (g.id, g))
        .collect();
    let mut report = RecoveryReport::default();

    let mut tagged = read_tags(platform).await?;
    if known.is_empty() && tagged.iter().all(|t| t.group.is_none()) {
        return Ok(report);
    }

    // Reopen containers that are not open anymore.
    let anchored: HashSet<TabId> = tagged
        .iter()
        .filter_map(|t| anchor_of(t, &known).map(|g| g.id))
        .collect();
    let missing: Vec<TabId> = known
        .keys()
        .copied()
        .filter(|id| !anchored.contains(id))
        .collect();
    if !missing.is_empty() {
        let closed = platform.recently_closed().await.unwrap_or_else(|e| {
            tracing::warn!("Could not read recently closed tabs: {}", e);
            Vec::new()
        });
        for old in missing {
            let entry = closed.iter().find(|c| {
                let tagged_id = c
                    .values
                    .get(GROUP_TAG)
                    .and_then(|v| v.get("id"))
                    .and_then(|v| v.as_i64());
                tagged_id == Some(old) || parse_group_page_url(&c.url) == Some(old)
            });
            let Some(entry) = entry else { continue };
            match platform.restore_session(&entry.session_id).await {
                Ok(tab) => {
                    tracing::info!("Reopened container of group {} as tab {}", old, tab.id);
                    report.restored_from_history.push(old);
                }
                Err(e) => tracing::warn!("Reopening group {} failed: {}", old, e),
            }
        }
        if !report.restored_from_history.is_empty() {
            tagged = read_tags(platform).await?;
        }
    }

    let tabs: Vec<TabInfo> = tagged.iter().map(|t| t.tab.clone()).collect();
    let by_id: HashMap<TabId, &Tagged> = tagged.iter().map(|t| (t.tab.id, t)).collect();

    let mut anchors: Vec<(GroupTab, &Tagged)> = Vec::new();
    let mut seen = HashSet::new();
    for t in &tagged {
        if let Some(record) = anchor_of(t, &known) {
            if seen.insert(record.id) {
                anchors.push((record, t));
            } else {
                tracing::debug!("Tab {} duplicates the container of {}", t.tab.id, record.id);
            }
        }
    }
    let anchor_ids: HashSet<TabId> = anchors.iter().map(|(_, t)| t.tab.id).collect();

    let mut rebuilt = Vec::new();
    let mut claimed = HashSet::new();
    for (record, container) in &anchors {
        let old = record.id;
        let strip = window_strip(&tabs, container.tab.window_id);
        let start = strip.iter().position(|&id| id == container.tab.id).unwrap_or(0);

        let mut members = Vec::new();
        for id in strip.iter().skip(start + 1) {
            let Some(candidate) = by_id.get(id) else { break };
            let tagged_here = candidate.member_of == Some(old);
            let kept = reason == RecoveryReason::ExtensionUpdate
                && candidate.member_of.is_none()
                && record.contains(*id);
            if anchor_ids.contains(id) || !(tagged_here || kept) || claimed.contains(id) {
                break;
            }
            claimed.insert(*id);
            members.push(*id);
        }

        for t in &tagged {
            if t.member_of == Some(old) && !members.contains(&t.tab.id) {
                report.omitted_members.push(t.tab.id);
            }
        }

        let mut group = record.clone();
        group.id = container.tab.id;
        group.inner_tabs = members;
        report.recovered.push((old, group.id));
        rebuilt.push(group);
    }

    report.dropped = known
        .keys()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();
    for old in &report.dropped {
        tracing::info!("Dropping group {}: its container tab is gone", old);
    }

    for &tab in &report.omitted_members {
        if let Err(e) = platform.remove_tab_value(tab, MEMBER_TAG).await {
            tracing::debug!("Clearing stale member tag on {} failed: {}", tab, e);
        }
    }

    storage.restore_groups(rebuilt.clone()).await?;

    for group in &rebuilt {
        if let Err(e) = platform
            .update_tab(group.id, Some(group_page_url(group.id)), Some(group.name.clone()))
            .await
        {
            tracing::warn!("Updating container of group {} failed: {}", group.id, e);
        }
    }

    tracing::info!(
        "Recovered {} group(s) ({:?}), dropped {}",
        report.recovered.len(),
        reason,
        report.dropped.len()
    );
    Ok(report)
}
