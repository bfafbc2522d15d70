use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::script::{self, ReplayOutcome};
use crate::cli::{Args, Command, SettingsAction};
use crate::config::ConfigFile;
use crate::storage::{FileStore, KeyValueStore, MemoryStore, StorageManager};

pub async fn run_cli(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Replay {
            script,
            ephemeral,
            json,
        } => handle_replay(args.store, script, ephemeral, json).await,

        Command::Groups { json } => handle_groups(args.store, json).await,

        Command::Settings { action } => handle_settings(args.store, action).await,

        Command::Version => {
            println!("group-tabs v{}", crate::VERSION);
            Ok(())
        }
    }
}

async fn store_path(store: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = store {
        return Ok(path);
    }
    let config = ConfigFile::load()
        .await
        .context("loading config.json")?
        .unwrap_or_default();
    Ok(config.store_path()?)
}

async fn open_store(store: Option<PathBuf>) -> anyhow::Result<Arc<FileStore>> {
    let path = store_path(store).await?;
    let store = FileStore::open(&path)
        .await
        .with_context(|| format!("opening store {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn open_manager(store: Option<PathBuf>) -> anyhow::Result<StorageManager> {
    let manager = StorageManager::new(open_store(store).await?);
    manager.load_storage().await?;
    Ok(manager)
}

async fn handle_replay(
    store: Option<PathBuf>,
    path: PathBuf,
    ephemeral: bool,
    json: bool,
) -> anyhow::Result<()> {
    let script = script::load_script(&path).await?;
    let store: Arc<dyn KeyValueStore> = if ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        open_store(store).await?
    };

    let outcome = script::replay(script, store).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &ReplayOutcome) {
    for window in &outcome.windows {
        println!("Window {}:", window.id);
        for tab in &window.tabs {
            let marker = match (tab.active, tab.hidden) {
                (true, _) => "*",
                (false, true) => "-",
                _ => " ",
            };
            let role = outcome
                .groups
                .iter()
                .find_map(|g| {
                    if g.id == tab.id {
                        Some(format!("[{}]", g.name))
                    } else if g.contains(tab.id) {
                        Some(format!("  in {}", g.name))
                    } else {
                        None
                    }
                })
                .unwrap_or_default();
            println!("  {} {:<6} {}", marker, tab.id, role);
        }
    }
    for (title, message) in &outcome.notifications {
        println!("Notification: {} - {}", title, message);
    }
    println!(
        "\n{} group(s), {} event(s) handled",
        outcome.groups.len(),
        outcome.events
    );
}

async fn handle_groups(store: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let manager = open_manager(store).await?;
    let groups = manager.all_group_tabs();

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    if groups.is_empty() {
        println!("No groups found.");
        return Ok(());
    }

    println!("{:<8} {:<24} {:<7} {}", "ID", "NAME", "OPEN", "TABS");
    println!("{}", "-".repeat(60));
    for group in &groups {
        let tabs: Vec<String> = group.inner_tabs.iter().map(|t| t.to_string()).collect();
        println!(
            "{:<8} {:<24} {:<7} {}",
            group.id,
            truncate(&group.name, 24),
            if group.is_open { "yes" } else { "no" },
            tabs.join(",")
        );
    }
    println!("\nTotal: {} groups", groups.len());
    Ok(())
}

async fn handle_settings(store: Option<PathBuf>, action: SettingsAction) -> anyhow::Result<()> {
    let manager = open_manager(store).await?;
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&manager.settings())?);
        }
        SettingsAction::Set { key, value } => {
            let mut settings = manager.settings();
            settings.set_field(&key, &value)?;
            manager.update_settings(settings).await?;
            println!("✓ {} updated", key);
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
