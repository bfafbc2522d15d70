pub mod background;
pub mod cli;
pub mod config;
pub mod error;
pub mod group;
pub mod menus;
pub mod messaging;
pub mod platform;
pub mod session;
pub mod storage;

pub use background::Background;
pub use error::{Error, Result};

/// Version of group-tabs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
