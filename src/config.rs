use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};

/// Where a new group tab is placed relative to the tabs it is created from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum NewGroupPosition {
    /// Just before the left-most grouped tab
    #[default]
    BeforeSelection,
    /// At the end of the window
    End,
}

/// User settings, persisted under the `settings` key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Ask before a free tab dragged into a group joins it
    pub confirm_move_into_group: bool,
    /// Ask before a member dragged out of its group leaves it
    pub confirm_move_out_of_group: bool,
    /// Ask before a member dragged into another group switches groups
    pub confirm_move_between_groups: bool,
    /// Close member tabs together with their group tab
    pub close_inner_tabs_with_group: bool,
    /// New groups start in closed-group mode
    pub closed_group_mode_default: bool,
    pub new_group_position: NewGroupPosition,
    pub default_group_name: String,
    pub show_notifications: bool,
    /// Window in which a group-tab activation may still turn out to be a drag
    pub click_window_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            confirm_move_into_group: false,
            confirm_move_out_of_group: true,
            confirm_move_between_groups: true,
            close_inner_tabs_with_group: false,
            closed_group_mode_default: false,
            new_group_position: NewGroupPosition::BeforeSelection,
            default_group_name: "New Group".to_string(),
            show_notifications: true,
            click_window_ms: 250,
        }
    }
}

impl Settings {
    pub fn click_window(&self) -> Duration {
        Duration::from_millis(self.click_window_ms)
    }

    /// Set a single field by its camelCase name.
    ///
    /// `raw` is parsed as JSON first and falls back to a plain string, so
    /// `true`, `300` and `Work` all work from a command line.
    pub fn set_field(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut value = serde_json::to_value(&*self)?;
        let map = value
            .as_object_mut()
            .ok_or_else(|| Error::config("settings are not an object"))?;
        if !map.contains_key(key) {
            return Err(Error::config(format!("Unknown setting: {key}")));
        }

        let parsed = serde_json::from_str::<serde_json::Value>(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        map.insert(key.to_string(), parsed);

        *self = serde_json::from_value(value)
            .map_err(|e| Error::config(format!("Invalid value for {key}: {e}")))?;
        Ok(())
    }
}

/// Host configuration for the command-line driver (`config.json`)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Override for the persistent store document
    #[serde(default)]
    store_path: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default)]
    log_filter: Option<String>,
}

impl ConfigFile {
    /// Base directory for all group-tabs data
    pub fn data_dir() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| Error::config("Cannot determine home directory"))?;
        Ok(home.join(".group-tabs"))
    }

    pub async fn load() -> Result<Option<Self>> {
        let path = Self::data_dir()?.join("config.json");
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        let cfg = serde_json::from_str::<Self>(&content)?;
        Ok(Some(cfg))
    }

    /// Store document path, falling back to `<data dir>/store.json`
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::data_dir()?.join("store.json")),
        }
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.log_filter.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "confirmMoveIntoGroup": true }"#).unwrap();
        assert!(settings.confirm_move_into_group);
        assert_eq!(settings.click_window_ms, 250);
        assert_eq!(settings.default_group_name, "New Group");
    }

    #[test]
    fn test_set_field() {
        let mut settings = Settings::default();
        settings.set_field("showNotifications", "false").unwrap();
        settings.set_field("defaultGroupName", "Inbox").unwrap();
        settings.set_field("newGroupPosition", "end").unwrap();
        assert!(!settings.show_notifications);
        assert_eq!(settings.default_group_name, "Inbox");
        assert_eq!(settings.new_group_position, NewGroupPosition::End);

        assert!(settings.set_field("nope", "1").is_err());
        assert!(settings.set_field("clickWindowMs", "soon").is_err());
        assert_eq!(settings.click_window_ms, 250);
    }
}
