//! Boundary to the host browser.
//!
//! Everything the background authority needs from the browser goes through
//! [`Platform`]; everything the browser tells it arrives as a [`TabEvent`].

mod sim;
mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::group::{TabId, WindowId};

pub use sim::SimBrowser;
pub use types::{
    ClosedTab, CreateTab, DialogKind, DialogOutcome, DialogRequest, MenuItem, MenuUpdate, TabInfo,
};

/// Platform event inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TabEvent {
    Created {
        tab: TabInfo,
    },
    Removed {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        is_window_closing: bool,
    },
    Activated {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        previous_tab_id: Option<TabId>,
    },
    /// Position change inside one window
    Moved {
        tab_id: TabId,
        window_id: WindowId,
        from_index: usize,
        to_index: usize,
    },
    /// Re-attachment into another window
    Attached {
        tab_id: TabId,
        new_window_id: WindowId,
        new_position: usize,
    },
    MenuClicked {
        menu_item_id: String,
        tab_id: TabId,
    },
    MenuShown {
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    MenuHidden,
}

/// Browser commands used by the background authority.
///
/// Every method fails with `PlatformCommandFailed` when the browser rejects
/// the command (unknown tab, closed window, ...).
#[async_trait]
pub trait Platform: Send + Sync {
    async fn get_tab(&self, id: TabId) -> Result<TabInfo>;

    /// Tabs of one window, or of all windows, ordered by window then index
    async fn query_tabs(&self, window_id: Option<WindowId>) -> Result<Vec<TabInfo>>;

    async fn create_tab(&self, options: CreateTab) -> Result<TabInfo>;

    /// Move `ids` as one block so that, afterwards, they occupy consecutive
    /// positions of `window_id` starting at `index` (clamped to the end).
    async fn move_tabs(&self, ids: &[TabId], window_id: WindowId, index: usize) -> Result<()>;

    async fn activate_tab(&self, id: TabId) -> Result<()>;

    async fn hide_tabs(&self, ids: &[TabId]) -> Result<()>;

    async fn show_tabs(&self, ids: &[TabId]) -> Result<()>;

    async fn remove_tabs(&self, ids: &[TabId]) -> Result<()>;

    async fn update_tab(&self, id: TabId, url: Option<String>, title: Option<String>)
        -> Result<()>;

    // Session values, kept with the tab across restarts
    async fn get_tab_value(&self, id: TabId, key: &str) -> Result<Option<Value>>;

    async fn set_tab_value(&self, id: TabId, key: &str, value: Value) -> Result<()>;

    async fn remove_tab_value(&self, id: TabId, key: &str) -> Result<()>;

    /// Recently closed tabs, most recent first
    async fn recently_closed(&self) -> Result<Vec<ClosedTab>>;

    async fn restore_session(&self, session_id: &str) -> Result<TabInfo>;

    async fn create_menu_item(&self, item: MenuItem) -> Result<()>;

    async fn update_menu_item(&self, id: &str, update: MenuUpdate) -> Result<()>;

    async fn remove_menu_item(&self, id: &str) -> Result<()>;

    async fn notify(&self, title: &str, message: &str) -> Result<()>;

    /// Render a dialog in the context of `tab_id` and wait for the answer
    async fn show_dialog(&self, tab_id: TabId, request: DialogRequest) -> Result<DialogOutcome>;
}
