//! Scripted sessions replayed against the simulated browser.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::background::Background;
use crate::config::Settings;
use crate::group::{GroupTab, TabId, WindowId};
use crate::messaging::{Message, Reply};
use crate::platform::{DialogOutcome, SimBrowser, TabEvent};
use crate::session::RecoveryReason;
use crate::storage::{KeyValueStore, SETTINGS_KEY};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Settings written before the background starts
    #[serde(default)]
    pub settings: Option<Settings>,
    pub windows: Vec<WindowSeed>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct WindowSeed {
    pub id: WindowId,
    pub tabs: Vec<TabSeed>,
}

#[derive(Debug, Deserialize)]
pub struct TabSeed {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    CreateGroup {
        #[serde(default)]
        name: Option<String>,
        tabs: Vec<TabId>,
    },
    Move {
        tab: TabId,
        index: usize,
    },
    Attach {
        tab: TabId,
        window: WindowId,
        index: usize,
    },
    Activate {
        tab: TabId,
    },
    Close {
        tab: TabId,
    },
    CloseWindow {
        window: WindowId,
    },
    Open {
        window: WindowId,
        index: usize,
        #[serde(default)]
        url: String,
        #[serde(default)]
        opener: Option<TabId>,
    },
    /// Queue the answer for the next dialog
    Answer {
        answer: DialogOutcome,
    },
    Menu {
        item: String,
        tab: TabId,
    },
    Message {
        message: Message,
    },
    /// Restart the browser with session restore
    Restart,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    pub id: TabId,
    pub url: String,
    pub hidden: bool,
    pub active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    pub id: WindowId,
    pub tabs: Vec<TabState>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub groups: Vec<GroupTab>,
    pub windows: Vec<WindowState>,
    pub notifications: Vec<(String, String)>,
    pub replies: Vec<Reply>,
    pub events: usize,
}

pub async fn load_script(path: &Path) -> anyhow::Result<Script> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing script {}", path.display()))
}

pub async fn replay(script: Script, store: Arc<dyn KeyValueStore>) -> anyhow::Result<ReplayOutcome> {
    if let Some(settings) = &script.settings {
        store.set(SETTINGS_KEY, serde_json::to_value(settings)?).await?;
    }

    let browser = Arc::new(SimBrowser::new());
    for window in &script.windows {
        let tabs: Vec<(TabId, &str)> = window
            .tabs
            .iter()
            .map(|t| (t.id, t.url.as_str()))
            .collect();
        browser.add_window(window.id, &tabs);
        for tab in window.tabs.iter().filter(|t| t.pinned) {
            browser.set_pinned(tab.id, true)?;
        }
    }

    // Groups left over from an earlier run point at tabs that no longer exist.
    let mut background = Background::start(
        store.clone(),
        browser.clone(),
        Some(RecoveryReason::ExtensionUpdate),
    )
    .await?;

    let mut events = 0;
    let mut replies = Vec::new();
    for (n, step) in script.steps.into_iter().enumerate() {
        tracing::debug!("Step {}: {:?}", n + 1, step);
        let context = || format!("step {}", n + 1);
        match step {
            Step::CreateGroup { name, tabs } => {
                background
                    .create_group(name, tabs, None)
                    .await
                    .with_context(context)?;
            }
            Step::Move { tab, index } => browser.user_move(tab, index).with_context(context)?,
            Step::Attach { tab, window, index } => browser
                .user_attach(tab, window, index)
                .with_context(context)?,
            Step::Activate { tab } => browser.user_activate(tab).with_context(context)?,
            Step::Close { tab } => browser.user_close(tab).with_context(context)?,
            Step::CloseWindow { window } => browser.close_window(window).with_context(context)?,
            Step::Open {
                window,
                index,
                url,
                opener,
            } => {
                browser
                    .user_open(window, index, &url, opener)
                    .with_context(context)?;
            }
            Step::Answer { answer } => browser.answer_dialog(answer),
            Step::Menu { item, tab } => {
                background
                    .handle_event(TabEvent::MenuClicked {
                        menu_item_id: item,
                        tab_id: tab,
                    })
                    .await
                    .with_context(context)?;
            }
            Step::Message { message } => {
                replies.push(
                    background
                        .handle_message(message)
                        .await
                        .with_context(context)?,
                );
            }
            Step::Restart => {
                browser.restart();
                background = Background::start(
                    store.clone(),
                    browser.clone(),
                    Some(RecoveryReason::BrowserStartup),
                )
                .await
                .with_context(context)?;
            }
        }
        events += browser.run_until_idle(&background).await?;
    }

    let windows = browser
        .window_ids()
        .into_iter()
        .map(|id| WindowState {
            id,
            tabs: browser
                .tab_ids(id)
                .into_iter()
                .filter_map(|tab| browser.tab(tab))
                .map(|tab| TabState {
                    id: tab.id,
                    url: tab.url,
                    hidden: tab.hidden,
                    active: tab.active,
                })
                .collect(),
        })
        .collect();

    Ok(ReplayOutcome {
        groups: background.storage().all_group_tabs(),
        windows,
        notifications: browser.notifications(),
        replies,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const SCRIPT: &str = r#"{
        "windows": [{ "id": 1, "tabs": [{ "id": 1 }, { "id": 2 }, { "id": 3 }] }],
        "steps": [
            { "action": "create_group", "tabs": [2] },
            { "action": "answer", "answer": { "outcome": "cancelled" } },
            { "action": "move", "tab": 2, "index": 3 },
            { "action": "restart" }
        ]
    }"#;

    #[test]
    fn test_load_script_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"windows\": ").unwrap();

        let err = tokio_test::block_on(load_script(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }

    #[tokio::test]
    async fn test_replay_survives_restart() {
        let script: Script = serde_json::from_str(SCRIPT).unwrap();
        let outcome = replay(script, Arc::new(MemoryStore::new())).await.unwrap();

        // Declined ejection kept the tab; the restart renumbered everything
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.name, "New Group");
        assert_eq!(group.inner_tabs.len(), 1);
        let strip: Vec<TabId> = outcome.windows[0].tabs.iter().map(|t| t.id).collect();
        assert_eq!(strip, vec![strip[0], group.id, group.inner_tabs[0], strip[3]]);
        assert!(group.id > 4);
    }
}
