use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::group::{TabId, WindowId};

/// Snapshot of one browser tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    pub index: usize,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener_tab_id: Option<TabId>,
}

/// Options for opening a tab
#[derive(Debug, Clone, Default)]
pub struct CreateTab {
    pub window_id: Option<WindowId>,
    pub index: Option<usize>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub active: bool,
    pub opener_tab_id: Option<TabId>,
}

impl CreateTab {
    pub fn blank(window_id: WindowId, index: usize) -> Self {
        Self {
            window_id: Some(window_id),
            index: Some(index),
            active: true,
            ..Default::default()
        }
    }
}

/// Entry of the browser's recently-closed history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTab {
    pub session_id: String,
    pub window_id: WindowId,
    pub url: String,
    pub title: String,
    /// Session values the tab carried when it was closed
    #[serde(default)]
    pub values: serde_json::Map<String, Value>,
}

/// Context-menu entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub enabled: bool,
    pub visible: bool,
}

impl MenuItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parent_id: None,
            enabled: true,
            visible: true,
        }
    }

    pub fn child_of(mut self, parent: impl Into<String>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuUpdate {
    pub title: Option<String>,
    pub enabled: Option<bool>,
    pub visible: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Confirm,
    Prompt,
}

/// Structured request for the dialog surface; user text is data, never code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogRequest {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: DialogKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl DialogRequest {
    pub fn confirm(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            kind: DialogKind::Confirm,
            default_value: None,
        }
    }

    pub fn prompt(
        title: impl Into<String>,
        message: impl Into<String>,
        default_value: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            kind: DialogKind::Prompt,
            default_value: Some(default_value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "lowercase")]
pub enum DialogOutcome {
    Confirmed,
    Submitted(String),
    Cancelled,
}

impl DialogOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Submitted prompt text, trimmed; `None` for anything else or blank text
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Submitted(v) if !v.trim().is_empty() => Some(v.trim()),
            _ => None,
        }
    }
}
