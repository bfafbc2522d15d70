//! Envelope exchanged between UI pages and the background authority.
//!
//! Pages share no memory with the background, so every request crosses as
//! `{ "type": ..., "data": ... }`.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::group::{GroupTab, TabId, WindowId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Create a group from the given tabs
    AddTab {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "tabIds")]
        tab_ids: Vec<TabId>,
        #[serde(default, rename = "windowId")]
        window_id: Option<WindowId>,
    },
    /// Ungroup, or close the group together with its members
    RemoveTab {
        #[serde(rename = "groupId")]
        group_id: TabId,
        #[serde(default, rename = "closeInnerTabs")]
        close_inner_tabs: bool,
    },
    EditTab {
        #[serde(rename = "groupId")]
        group_id: TabId,
        #[serde(default)]
        name: Option<String>,
        /// `Some(None)` clears the icon
        #[serde(default, with = "double_option")]
        icon: Option<Option<String>>,
        #[serde(default, rename = "closedGroupMode")]
        closed_group_mode: Option<bool>,
        #[serde(default, rename = "isOpen")]
        is_open: Option<bool>,
    },
    UpdateSettings(Settings),
}

impl Message {
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    Ok,
    Group(GroupTab),
    Settings(Settings),
    /// The user dismissed a dialog the request needed
    Cancelled,
}

/// Distinguishes a missing field from an explicit `null`
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let message = Message::RemoveTab {
            group_id: 5,
            close_inner_tabs: true,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "type": "REMOVE_TAB", "data": { "groupId": 5, "closeInnerTabs": true } })
        );
    }

    #[test]
    fn test_parse_add_tab_defaults() {
        let message = Message::from_json(r#"{"type":"ADD_TAB","data":{"tabIds":[3,4]}}"#).unwrap();
        assert_eq!(
            message,
            Message::AddTab {
                name: None,
                tab_ids: vec![3, 4],
                window_id: None
            }
        );
    }

    #[test]
    fn test_edit_tab_icon_null_clears() {
        let clear =
            Message::from_json(r#"{"type":"EDIT_TAB","data":{"groupId":1,"icon":null}}"#).unwrap();
        let keep = Message::from_json(r#"{"type":"EDIT_TAB","data":{"groupId":1}}"#).unwrap();
        assert!(matches!(clear, Message::EditTab { icon: Some(None), .. }));
        assert!(matches!(keep, Message::EditTab { icon: None, .. }));
    }

    #[test]
    fn test_update_settings_partial() {
        let message = Message::from_json(
            r#"{"type":"UPDATE_SETTINGS","data":{"closeInnerTabsWithGroup":true}}"#,
        )
        .unwrap();
        match message {
            Message::UpdateSettings(settings) => {
                assert!(settings.close_inner_tabs_with_group);
                assert_eq!(settings.default_group_name, Settings::default().default_group_name);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(Message::from_json(r#"{"type":"DELETE_ALL","data":{}}"#).is_err());
    }
}
