//! In-memory browser.
//!
//! Keeps a tab strip per window and queues the same events a real browser
//! would fire, both for simulated user actions (`user_*`) and for commands
//! issued through [`Platform`]. Hidden tabs keep their strip positions.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use super::{
    ClosedTab, CreateTab, DialogKind, DialogOutcome, DialogRequest, MenuItem, MenuUpdate, Platform,
    TabEvent, TabInfo,
};
use crate::background::Background;
use crate::error::{Error, Result};
use crate::group::{TabId, WindowId};

/// Rounds of event fan-out before the driver gives up on a move loop
const MAX_ROUNDS: usize = 32;

const BLANK_URL: &str = "about:blank";

#[derive(Debug, Clone)]
struct SimTab {
    id: TabId,
    url: String,
    title: String,
    pinned: bool,
    hidden: bool,
    opener_tab_id: Option<TabId>,
}

impl SimTab {
    fn new(id: TabId, url: &str) -> Self {
        Self {
            id,
            url: url.to_string(),
            title: String::new(),
            pinned: false,
            hidden: false,
            opener_tab_id: None,
        }
    }
}

#[derive(Debug, Default)]
struct SimWindow {
    tabs: Vec<SimTab>,
    active: Option<TabId>,
}

#[derive(Debug)]
struct ClosedEntry {
    session_id: String,
    window_id: WindowId,
    index: usize,
    tab: SimTab,
    values: Map<String, Value>,
}

/// A queued dialog answer
#[derive(Debug)]
enum Answer {
    Ready(DialogOutcome),
    /// Given by the test later; the dialog stays open until then
    Held(oneshot::Receiver<DialogOutcome>),
}

#[derive(Debug, Default)]
struct SimState {
    windows: BTreeMap<WindowId, SimWindow>,
    next_tab_id: TabId,
    values: HashMap<TabId, Map<String, Value>>,
    /// Oldest first
    closed: Vec<ClosedEntry>,
    next_session: u64,
    menus: BTreeMap<String, MenuItem>,
    notifications: Vec<(String, String)>,
    answers: VecDeque<Answer>,
    dialogs: Vec<DialogRequest>,
    events: VecDeque<TabEvent>,
}

impl SimState {
    fn alloc_id(&mut self) -> TabId {
        let id = self.next_tab_id;
        self.next_tab_id += 1;
        id
    }

    fn locate(&self, id: TabId) -> Option<(WindowId, usize)> {
        self.windows.iter().find_map(|(&window_id, window)| {
            window
                .tabs
                .iter()
                .position(|t| t.id == id)
                .map(|index| (window_id, index))
        })
    }

    fn require(&self, id: TabId) -> Result<(WindowId, usize)> {
        self.locate(id)
            .ok_or_else(|| Error::platform(format!("Invalid tab ID: {id}")))
    }

    fn window_mut(&mut self, window_id: WindowId) -> Result<&mut SimWindow> {
        self.windows
            .get_mut(&window_id)
            .ok_or_else(|| Error::platform(format!("Invalid window ID: {window_id}")))
    }

    fn info(&self, id: TabId) -> Option<TabInfo> {
        let (window_id, index) = self.locate(id)?;
        let window = &self.windows[&window_id];
        Some(to_info(window_id, index, &window.tabs[index], window.active))
    }

    fn all_infos(&self, only: Option<WindowId>) -> Vec<TabInfo> {
        self.windows
            .iter()
            .filter(|(&window_id, _)| only.map_or(true, |w| w == window_id))
            .flat_map(|(&window_id, window)| {
                window
                    .tabs
                    .iter()
                    .enumerate()
                    .map(move |(index, tab)| to_info(window_id, index, tab, window.active))
            })
            .collect()
    }

    fn insert(&mut self, window_id: WindowId, index: usize, tab: SimTab) -> usize {
        let window = self.windows.entry(window_id).or_default();
        let index = index.min(window.tabs.len());
        window.tabs.insert(index, tab);
        index
    }

    /// Detach a tab from its window, moving focus off it if needed
    fn take(&mut self, id: TabId) -> Result<(WindowId, usize, SimTab)> {
        let (window_id, index) = self.require(id)?;
        let window = self.window_mut(window_id)?;
        let tab = window.tabs.remove(index);
        if window.active == Some(id) {
            window.active = None;
        }
        Ok((window_id, index, tab))
    }

    /// Focus the nearest visible tab after the active one went away
    fn refocus(&mut self, window_id: WindowId, around: usize) {
        let Some(window) = self.windows.get_mut(&window_id) else {
            return;
        };
        if window.active.is_some() {
            return;
        }
        let right = window.tabs.iter().skip(around).find(|t| !t.hidden);
        let left = window.tabs.iter().take(around).rev().find(|t| !t.hidden);
        if let Some(next) = right.or(left).map(|t| t.id) {
            window.active = Some(next);
            self.events.push_back(TabEvent::Activated {
                tab_id: next,
                window_id,
                previous_tab_id: None,
            });
        }
    }

    fn close(&mut self, id: TabId, is_window_closing: bool) -> Result<()> {
        let (window_id, index, tab) = self.take(id)?;
        let values = self.values.remove(&id).unwrap_or_default();
        self.next_session += 1;
        self.closed.push(ClosedEntry {
            session_id: format!("session-{}", self.next_session),
            window_id,
            index,
            tab,
            values,
        });
        self.events.push_back(TabEvent::Removed {
            tab_id: id,
            window_id,
            is_window_closing,
        });
        if !is_window_closing {
            self.refocus(window_id, index);
        }
        Ok(())
    }

    fn activate(&mut self, id: TabId) -> Result<()> {
        let (window_id, index) = self.require(id)?;
        let window = self.window_mut(window_id)?;
        let previous = window.active;
        window.tabs[index].hidden = false;
        if previous == Some(id) {
            return Ok(());
        }
        window.active = Some(id);
        self.events.push_back(TabEvent::Activated {
            tab_id: id,
            window_id,
            previous_tab_id: previous,
        });
        Ok(())
    }

    fn values_mut(&mut self, id: TabId) -> Result<&mut Map<String, Value>> {
        self.require(id)?;
        Ok(self.values.entry(id).or_default())
    }
}

fn to_info(window_id: WindowId, index: usize, tab: &SimTab, active: Option<TabId>) -> TabInfo {
    TabInfo {
        id: tab.id,
        window_id,
        index,
        pinned: tab.pinned,
        hidden: tab.hidden,
        active: active == Some(tab.id),
        url: tab.url.clone(),
        title: tab.title.clone(),
        opener_tab_id: tab.opener_tab_id,
    }
}

/// Simulated browser implementing [`Platform`]
#[derive(Debug, Default)]
pub struct SimBrowser {
    state: Mutex<SimState>,
}

impl SimBrowser {
    pub fn new() -> Self {
        let browser = Self::default();
        browser.state.lock().next_tab_id = 1;
        browser
    }

    /// Seed a window with tabs (no events). The first tab becomes active.
    pub fn add_window(&self, window_id: WindowId, tabs: &[(TabId, &str)]) {
        let mut state = self.state.lock();
        let window = state.windows.entry(window_id).or_default();
        for &(id, url) in tabs {
            window.tabs.push(SimTab::new(id, url));
        }
        if window.active.is_none() {
            window.active = window.tabs.first().map(|t| t.id);
        }
        let max = tabs.iter().map(|&(id, _)| id).max().unwrap_or(0);
        state.next_tab_id = state.next_tab_id.max(max + 1);
    }

    pub fn set_pinned(&self, id: TabId, pinned: bool) -> Result<()> {
        let mut state = self.state.lock();
        let (window_id, index) = state.require(id)?;
        state.window_mut(window_id)?.tabs[index].pinned = pinned;
        Ok(())
    }

    /// Seed a session value directly (no events)
    pub fn put_tab_value(&self, id: TabId, key: &str, value: Value) -> Result<()> {
        self.state
            .lock()
            .values_mut(id)?
            .insert(key.to_string(), value);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Simulated user actions
    // ---------------------------------------------------------------------

    /// Drag a tab within its window
    pub fn user_move(&self, id: TabId, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        let (window_id, from, tab) = state.take(id)?;
        let to = state.insert(window_id, index, tab);
        let window = state.window_mut(window_id)?;
        if window.active.is_none() {
            window.active = Some(id);
        }
        if from != to {
            state.events.push_back(TabEvent::Moved {
                tab_id: id,
                window_id,
                from_index: from,
                to_index: to,
            });
        }
        Ok(())
    }

    /// Drag a tab into another window
    pub fn user_attach(&self, id: TabId, window_id: WindowId, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        let (old_window, old_index, tab) = state.take(id)?;
        let position = state.insert(window_id, index, tab);
        state.refocus(old_window, old_index);
        if let Some(window) = state.windows.get_mut(&window_id) {
            window.active = Some(id);
        }
        state.events.push_back(TabEvent::Attached {
            tab_id: id,
            new_window_id: window_id,
            new_position: position,
        });
        Ok(())
    }

    pub fn user_activate(&self, id: TabId) -> Result<()> {
        self.state.lock().activate(id)
    }

    pub fn user_close(&self, id: TabId) -> Result<()> {
        self.state.lock().close(id, false)
    }

    /// Open a tab the way a link click or new-tab button would
    pub fn user_open(
        &self,
        window_id: WindowId,
        index: usize,
        url: &str,
        opener_tab_id: Option<TabId>,
    ) -> Result<TabId> {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        let mut tab = SimTab::new(id, url);
        tab.opener_tab_id = opener_tab_id;
        state.insert(window_id, index, tab);
        let info = state
            .info(id)
            .ok_or_else(|| Error::platform(format!("Invalid tab ID: {id}")))?;
        state.events.push_back(TabEvent::Created { tab: info });
        Ok(id)
    }

    pub fn close_window(&self, window_id: WindowId) -> Result<()> {
        let mut state = self.state.lock();
        let ids: Vec<TabId> = state
            .windows
            .get(&window_id)
            .ok_or_else(|| Error::platform(format!("Invalid window ID: {window_id}")))?
            .tabs
            .iter()
            .map(|t| t.id)
            .collect();
        for id in ids {
            state.close(id, true)?;
        }
        state.windows.remove(&window_id);
        Ok(())
    }

    /// Restart with session restore: same strips, new tab ids.
    ///
    /// Returns the old -> new id mapping.
    pub fn restart(&self) -> HashMap<TabId, TabId> {
        let mut state = self.state.lock();
        let mut mapping = HashMap::new();
        let windows = std::mem::take(&mut state.windows);
        let mut values = std::mem::take(&mut state.values);

        for (window_id, window) in windows {
            let mut restored = SimWindow::default();
            for mut tab in window.tabs {
                let new_id = state.alloc_id();
                mapping.insert(tab.id, new_id);
                if let Some(v) = values.remove(&tab.id) {
                    state.values.insert(new_id, v);
                }
                if window.active == Some(tab.id) {
                    restored.active = Some(new_id);
                }
                tab.id = new_id;
                tab.opener_tab_id = None;
                restored.tabs.push(tab);
            }
            state.windows.insert(window_id, restored);
        }

        state.events.clear();
        state.menus.clear();
        mapping
    }

    /// Restart without session restore: every tab lands in recently-closed
    /// and each window reopens with a single blank tab.
    pub fn restart_without_restore(&self) {
        let mut state = self.state.lock();
        let windows = std::mem::take(&mut state.windows);
        for (window_id, window) in windows {
            for (index, tab) in window.tabs.into_iter().enumerate() {
                let values = state.values.remove(&tab.id).unwrap_or_default();
                state.next_session += 1;
                let session_id = format!("session-{}", state.next_session);
                state.closed.push(ClosedEntry {
                    session_id,
                    window_id,
                    index,
                    tab,
                    values,
                });
            }
            let id = state.alloc_id();
            state.windows.insert(
                window_id,
                SimWindow {
                    tabs: vec![SimTab::new(id, BLANK_URL)],
                    active: Some(id),
                },
            );
        }
        state.events.clear();
        state.menus.clear();
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    /// Queue the answer for the next dialog; unanswered dialogs accept
    pub fn answer_dialog(&self, outcome: DialogOutcome) {
        self.state.lock().answers.push_back(Answer::Ready(outcome));
    }

    /// Keep the next dialog open until the returned sender answers it.
    /// Dropping the sender dismisses the dialog with an error.
    pub fn hold_dialog(&self) -> oneshot::Sender<DialogOutcome> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().answers.push_back(Answer::Held(rx));
        tx
    }

    pub fn dialogs(&self) -> Vec<DialogRequest> {
        self.state.lock().dialogs.clone()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.state.lock().notifications.clone()
    }

    pub fn menu(&self, id: &str) -> Option<MenuItem> {
        self.state.lock().menus.get(id).cloned()
    }

    pub fn menu_ids(&self) -> Vec<String> {
        self.state.lock().menus.keys().cloned().collect()
    }

    pub fn tab_ids(&self, window_id: WindowId) -> Vec<TabId> {
        self.state
            .lock()
            .windows
            .get(&window_id)
            .map(|w| w.tabs.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.state.lock().windows.keys().copied().collect()
    }

    pub fn tab(&self, id: TabId) -> Option<TabInfo> {
        self.state.lock().info(id)
    }

    pub fn active_tab(&self, window_id: WindowId) -> Option<TabId> {
        self.state.lock().windows.get(&window_id)?.active
    }

    pub fn tab_value(&self, id: TabId, key: &str) -> Option<Value> {
        self.state.lock().values.get(&id)?.get(key).cloned()
    }

    pub fn take_events(&self) -> Vec<TabEvent> {
        self.state.lock().events.drain(..).collect()
    }

    /// Feed queued events to the background until the browser goes quiet.
    ///
    /// Each round's events run as concurrent tasks, so on a current-thread
    /// runtime they interleave only at real suspension points. Returns the
    /// number of events handled.
    pub async fn run_until_idle(&self, background: &Arc<Background>) -> Result<usize> {
        let mut handled = 0;
        for _ in 0..MAX_ROUNDS {
            let events = self.take_events();
            if events.is_empty() {
                return Ok(handled);
            }
            handled += events.len();

            let tasks: Vec<_> = events
                .into_iter()
                .map(|event| {
                    let background = background.clone();
                    tokio::spawn(async move { background.handle_event(event).await })
                })
                .collect();

            for task in futures::future::join_all(tasks).await {
                match task {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!("Event handler failed: {}", e),
                    Err(e) => return Err(Error::Other(format!("event task failed: {e}"))),
                }
            }
        }
        Err(Error::Other(format!(
            "events did not settle after {MAX_ROUNDS} rounds"
        )))
    }
}

#[async_trait]
impl Platform for SimBrowser {
    async fn get_tab(&self, id: TabId) -> Result<TabInfo> {
        self.state
            .lock()
            .info(id)
            .ok_or_else(|| Error::platform(format!("Invalid tab ID: {id}")))
    }

    async fn query_tabs(&self, window_id: Option<WindowId>) -> Result<Vec<TabInfo>> {
        Ok(self.state.lock().all_infos(window_id))
    }

    async fn create_tab(&self, options: CreateTab) -> Result<TabInfo> {
        let mut state = self.state.lock();
        let window_id = match options.window_id {
            Some(w) => w,
            None => *state
                .windows
                .keys()
                .next()
                .ok_or_else(|| Error::platform("No open window"))?,
        };
        state.window_mut(window_id)?;

        let id = state.alloc_id();
        let mut tab = SimTab::new(id, options.url.as_deref().unwrap_or(BLANK_URL));
        tab.title = options.title.unwrap_or_default();
        tab.opener_tab_id = options.opener_tab_id;
        let len = state.windows[&window_id].tabs.len();
        state.insert(window_id, options.index.unwrap_or(len), tab);

        let created = state
            .info(id)
            .ok_or_else(|| Error::platform(format!("Invalid tab ID: {id}")))?;
        state.events.push_back(TabEvent::Created { tab: created });
        if options.active {
            state.activate(id)?;
        }
        state
            .info(id)
            .ok_or_else(|| Error::platform(format!("Invalid tab ID: {id}")))
    }

    async fn move_tabs(&self, ids: &[TabId], window_id: WindowId, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.window_mut(window_id)?;

        // Origins and focus come from the strips as they were before the move.
        let mut origins = Vec::with_capacity(ids.len());
        for &id in ids {
            let (from_window, from_index) = state.require(id)?;
            let was_active = state.windows[&from_window].active == Some(id);
            origins.push((from_window, from_index, was_active));
        }
        let mut block = Vec::with_capacity(ids.len());
        for &id in ids {
            let (_, _, tab) = state.take(id)?;
            block.push(tab);
        }

        let start = index.min(state.windows[&window_id].tabs.len());
        for (offset, tab) in block.into_iter().enumerate() {
            state.insert(window_id, start + offset, tab);
        }

        for (offset, (&id, (from_window, from_index, was_active))) in
            ids.iter().zip(origins).enumerate()
        {
            let to_index = start + offset;
            if was_active {
                if from_window == window_id {
                    state.window_mut(window_id)?.active = Some(id);
                } else {
                    state.refocus(from_window, from_index);
                }
            }
            if from_window == window_id {
                if from_index != to_index {
                    state.events.push_back(TabEvent::Moved {
                        tab_id: id,
                        window_id,
                        from_index,
                        to_index,
                    });
                }
            } else {
                state.events.push_back(TabEvent::Attached {
                    tab_id: id,
                    new_window_id: window_id,
                    new_position: to_index,
                });
            }
        }
        Ok(())
    }

    async fn activate_tab(&self, id: TabId) -> Result<()> {
        self.state.lock().activate(id)
    }

    async fn hide_tabs(&self, ids: &[TabId]) -> Result<()> {
        let mut state = self.state.lock();
        for &id in ids {
            let (window_id, index) = state.require(id)?;
            let window = state.window_mut(window_id)?;
            // The active tab cannot be hidden.
            if window.active != Some(id) {
                window.tabs[index].hidden = true;
            }
        }
        Ok(())
    }

    async fn show_tabs(&self, ids: &[TabId]) -> Result<()> {
        let mut state = self.state.lock();
        for &id in ids {
            let (window_id, index) = state.require(id)?;
            state.window_mut(window_id)?.tabs[index].hidden = false;
        }
        Ok(())
    }

    async fn remove_tabs(&self, ids: &[TabId]) -> Result<()> {
        let mut state = self.state.lock();
        for &id in ids {
            state.close(id, false)?;
        }
        Ok(())
    }

    async fn update_tab(
        &self,
        id: TabId,
        url: Option<String>,
        title: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let (window_id, index) = state.require(id)?;
        let tab = &mut state.window_mut(window_id)?.tabs[index];
        if let Some(url) = url {
            tab.url = url;
        }
        if let Some(title) = title {
            tab.title = title;
        }
        Ok(())
    }

    async fn get_tab_value(&self, id: TabId, key: &str) -> Result<Option<Value>> {
        let state = self.state.lock();
        state.require(id)?;
        Ok(state.values.get(&id).and_then(|v| v.get(key)).cloned())
    }

    async fn set_tab_value(&self, id: TabId, key: &str, value: Value) -> Result<()> {
        self.state
            .lock()
            .values_mut(id)?
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_tab_value(&self, id: TabId, key: &str) -> Result<()> {
        self.state.lock().values_mut(id)?.remove(key);
        Ok(())
    }

    async fn recently_closed(&self) -> Result<Vec<ClosedTab>> {
        Ok(self
            .state
            .lock()
            .closed
            .iter()
            .rev()
            .map(|entry| ClosedTab {
                session_id: entry.session_id.clone(),
                window_id: entry.window_id,
                url: entry.tab.url.clone(),
                title: entry.tab.title.clone(),
                values: entry.values.clone(),
            })
            .collect())
    }

    async fn restore_session(&self, session_id: &str) -> Result<TabInfo> {
        let mut state = self.state.lock();
        let position = state
            .closed
            .iter()
            .position(|e| e.session_id == session_id)
            .ok_or_else(|| Error::platform(format!("Unknown session: {session_id}")))?;
        let entry = state.closed.remove(position);

        let window_id = if state.windows.contains_key(&entry.window_id) {
            entry.window_id
        } else {
            state.windows.keys().next().copied().unwrap_or(entry.window_id)
        };
        let id = state.alloc_id();
        let mut tab = entry.tab;
        tab.id = id;
        tab.hidden = false;
        state.insert(window_id, entry.index, tab);
        if !entry.values.is_empty() {
            state.values.insert(id, entry.values);
        }

        let info = state
            .info(id)
            .ok_or_else(|| Error::platform(format!("Invalid tab ID: {id}")))?;
        state
            .events
            .push_back(TabEvent::Created { tab: info.clone() });
        Ok(info)
    }

    async fn create_menu_item(&self, item: MenuItem) -> Result<()> {
        let mut state = self.state.lock();
        if state.menus.contains_key(&item.id) {
            return Err(Error::platform(format!("Duplicate menu id: {}", item.id)));
        }
        state.menus.insert(item.id.clone(), item);
        Ok(())
    }

    async fn update_menu_item(&self, id: &str, update: MenuUpdate) -> Result<()> {
        let mut state = self.state.lock();
        let item = state
            .menus
            .get_mut(id)
            .ok_or_else(|| Error::platform(format!("Unknown menu id: {id}")))?;
        if let Some(title) = update.title {
            item.title = title;
        }
        if let Some(enabled) = update.enabled {
            item.enabled = enabled;
        }
        if let Some(visible) = update.visible {
            item.visible = visible;
        }
        Ok(())
    }

    async fn remove_menu_item(&self, id: &str) -> Result<()> {
        self.state
            .lock()
            .menus
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::platform(format!("Unknown menu id: {id}")))
    }

    async fn notify(&self, title: &str, message: &str) -> Result<()> {
        self.state
            .lock()
            .notifications
            .push((title.to_string(), message.to_string()));
        Ok(())
    }

    async fn show_dialog(&self, tab_id: TabId, request: DialogRequest) -> Result<DialogOutcome> {
        let answer = {
            let mut state = self.state.lock();
            state.require(tab_id)?;
            let fallback = match request.kind {
                DialogKind::Confirm => DialogOutcome::Confirmed,
                DialogKind::Prompt => {
                    DialogOutcome::Submitted(request.default_value.clone().unwrap_or_default())
                }
            };
            state.dialogs.push(request);
            state.answers.pop_front().unwrap_or(Answer::Ready(fallback))
        };

        match answer {
            Answer::Ready(outcome) => Ok(outcome),
            Answer::Held(rx) => rx
                .await
                .map_err(|_| Error::platform(format!("Dialog on tab {tab_id} was dismissed"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn browser() -> SimBrowser {
        let browser = SimBrowser::new();
        browser.add_window(1, &[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);
        browser
    }

    #[tokio::test]
    async fn test_move_tabs_places_block() {
        let browser = browser();
        browser.move_tabs(&[1, 2], 1, 2).await.unwrap();
        assert_eq!(browser.tab_ids(1), vec![3, 4, 1, 2]);

        let events = browser.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            TabEvent::Moved {
                tab_id: 1,
                from_index: 0,
                to_index: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_move_tabs_keeps_focus_and_origins() {
        let browser = browser();
        browser.move_tabs(&[1, 2], 1, 2).await.unwrap();
        assert_eq!(browser.tab_ids(1), vec![3, 4, 1, 2]);
        assert_eq!(browser.active_tab(1), Some(1));

        let events = browser.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            TabEvent::Moved {
                tab_id: 2,
                from_index: 1,
                to_index: 3,
                ..
            }
        ));
        assert!(!events
            .iter()
            .any(|e| matches!(e, TabEvent::Activated { .. })));
    }

    #[tokio::test]
    async fn test_move_tabs_across_windows() {
        let browser = browser();
        browser.add_window(2, &[(10, "x")]);
        browser.move_tabs(&[3, 4], 2, 0).await.unwrap();
        assert_eq!(browser.tab_ids(1), vec![1, 2]);
        assert_eq!(browser.tab_ids(2), vec![3, 4, 10]);
        assert!(browser
            .take_events()
            .iter()
            .all(|e| matches!(e, TabEvent::Attached { new_window_id: 2, .. })));
    }

    #[tokio::test]
    async fn test_active_tab_cannot_be_hidden() {
        let browser = browser();
        browser.hide_tabs(&[1, 2]).await.unwrap();
        assert!(!browser.tab(1).unwrap().hidden);
        assert!(browser.tab(2).unwrap().hidden);

        browser.user_activate(2).unwrap();
        assert!(!browser.tab(2).unwrap().hidden);
    }

    #[tokio::test]
    async fn test_close_and_restore_keeps_values() {
        let browser = browser();
        browser.put_tab_value(3, "k", json!(5)).unwrap();
        browser.user_close(3).unwrap();
        assert!(browser.tab(3).is_none());

        let closed = browser.recently_closed().await.unwrap();
        assert_eq!(closed[0].values.get("k"), Some(&json!(5)));

        let restored = browser.restore_session(&closed[0].session_id).await.unwrap();
        assert_eq!(restored.index, 2);
        assert_eq!(browser.tab_value(restored.id, "k"), Some(json!(5)));
    }

    #[test]
    fn test_restart_reassigns_ids() {
        let browser = browser();
        browser.put_tab_value(2, "k", json!("v")).unwrap();
        let mapping = browser.restart();

        let new_two = mapping[&2];
        assert_ne!(new_two, 2);
        assert_eq!(browser.tab_ids(1)[1], new_two);
        assert_eq!(browser.tab_value(new_two, "k"), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_dialog_answers() {
        let browser = browser();
        browser.answer_dialog(DialogOutcome::Cancelled);
        let first = browser
            .show_dialog(1, DialogRequest::confirm("t", "m"))
            .await
            .unwrap();
        let second = browser
            .show_dialog(1, DialogRequest::prompt("t", "m", "Work"))
            .await
            .unwrap();
        assert_eq!(first, DialogOutcome::Cancelled);
        assert_eq!(second.value(), Some("Work"));
        assert!(browser.show_dialog(99, DialogRequest::confirm("t", "m")).await.is_err());
    }

    #[tokio::test]
    async fn test_held_dialog_waits_for_answer() {
        let browser = Arc::new(browser());
        let answer = browser.hold_dialog();

        let asking = browser.clone();
        let dialog = tokio::spawn(async move {
            asking
                .show_dialog(1, DialogRequest::confirm("t", "m"))
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(browser.dialogs().len(), 1);
        assert!(!dialog.is_finished());

        answer.send(DialogOutcome::Cancelled).unwrap();
        assert_eq!(dialog.await.unwrap().unwrap(), DialogOutcome::Cancelled);

        let dismissed = browser.hold_dialog();
        drop(dismissed);
        assert!(browser
            .show_dialog(1, DialogRequest::confirm("t", "m"))
            .await
            .is_err());
    }
}
