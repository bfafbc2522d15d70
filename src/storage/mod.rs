mod manager;
mod store;

pub use manager::{Removal, StorageManager, TabRole};
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Store key holding the id -> GroupTab map
pub const GROUP_TABS_KEY: &str = "groupTabs";

/// Store key holding the settings record
pub const SETTINGS_KEY: &str = "settings";
