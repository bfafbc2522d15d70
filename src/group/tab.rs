use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::TabId;
use crate::error::{Error, Result};

/// One group: a container tab followed by its member tabs (persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTab {
    pub id: TabId,
    pub name: String,
    /// Member ids in tab-strip order
    #[serde(default)]
    pub inner_tabs: Vec<TabId>,
    #[serde(default = "default_open")]
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_closed_group_mode: bool,
}

fn default_open() -> bool {
    true
}

impl GroupTab {
    /// Create a validated group record
    pub fn new(id: TabId, name: impl Into<String>, inner_tabs: Vec<TabId>) -> Result<Self> {
        let group = Self {
            id,
            name: name.into(),
            inner_tabs,
            is_open: true,
            icon: None,
            is_closed_group_mode: false,
        };
        group.validate()?;
        Ok(group)
    }

    /// Check the record-local invariants
    pub fn validate(&self) -> Result<()> {
        if self.id < 0 {
            return Err(Error::invalid(format!("negative group id {}", self.id)));
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid("group name must not be empty"));
        }

        let mut seen = HashSet::with_capacity(self.inner_tabs.len());
        for &tab in &self.inner_tabs {
            if tab < 0 {
                return Err(Error::invalid(format!("negative tab id {tab}")));
            }
            if tab == self.id {
                return Err(Error::invalid(format!(
                    "group {} cannot contain itself",
                    self.id
                )));
            }
            if !seen.insert(tab) {
                return Err(Error::invalid(format!(
                    "tab {tab} listed twice in group {}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, tab: TabId) -> bool {
        self.inner_tabs.contains(&tab)
    }

    pub fn position(&self, tab: TabId) -> Option<usize> {
        self.inner_tabs.iter().position(|&t| t == tab)
    }

    pub fn len(&self) -> usize {
        self.inner_tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner_tabs.is_empty()
    }
}

impl PartialEq for GroupTab {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GroupTab {}

impl Hash for GroupTab {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_records() {
        assert!(GroupTab::new(-1, "g", vec![]).is_err());
        assert!(GroupTab::new(1, "  ", vec![]).is_err());
        assert!(GroupTab::new(1, "g", vec![2, 2]).is_err());
        assert!(GroupTab::new(1, "g", vec![2, 1]).is_err());
        assert!(GroupTab::new(1, "g", vec![-5]).is_err());
        assert!(GroupTab::new(1, "g", vec![2, 3]).is_ok());
    }

    #[test]
    fn test_equality_by_id() {
        let a = GroupTab::new(7, "a", vec![1]).unwrap();
        let mut b = GroupTab::new(7, "b", vec![]).unwrap();
        b.is_open = false;
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_layout() {
        let group = GroupTab::new(10, "Work", vec![11, 12]).unwrap();
        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(value["innerTabs"], serde_json::json!([11, 12]));
        assert_eq!(value["isOpen"], serde_json::json!(true));
        assert!(value.get("icon").is_none());

        let parsed: GroupTab =
            serde_json::from_value(serde_json::json!({ "id": 3, "name": "x" })).unwrap();
        assert!(parsed.is_open);
        assert!(parsed.inner_tabs.is_empty());
    }
}
