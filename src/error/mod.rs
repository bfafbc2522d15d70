use thiserror::Error;

use crate::group::TabId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Group already exists: {0}")]
    DuplicateGroup(TabId),

    #[error("Group not found: {0}")]
    UnknownGroup(TabId),

    #[error("Tab {tab} is not a member of group {group}")]
    NotAMember { group: TabId, tab: TabId },

    #[error("Platform command failed: {0}")]
    PlatformCommandFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::PlatformCommandFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Contract violations abort before touching state; everything else may be
    /// transient.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateGroup(_) | Self::UnknownGroup(_) | Self::NotAMember { .. }
        )
    }
}
