mod args;
mod commands;
pub mod script;

pub use args::{Args, Command, SettingsAction};
pub use commands::run_cli;
