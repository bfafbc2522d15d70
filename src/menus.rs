//! Tab context menu.
//!
//! One "Move to group" child entry exists per group and follows the group's
//! name. Like session tags, notifier callbacks only queue the change and
//! [`MenuSync::flush`] talks to the browser.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::Result;
use crate::group::{AddEvent, EditEvent, GroupTab, Notifiers, RemoveEvent, TabId};
use crate::platform::{MenuItem, MenuUpdate, Platform};

pub const CREATE_GROUP: &str = "create-group";
pub const REMOVE_FROM_GROUP: &str = "remove-from-group";
pub const MOVE_TO_GROUP: &str = "move-to-group";

/// Command behind a menu item id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    CreateGroup,
    RemoveFromGroup,
    MoveToGroup(TabId),
}

impl MenuAction {
    pub fn parse(menu_item_id: &str) -> Option<Self> {
        match menu_item_id {
            CREATE_GROUP => Some(Self::CreateGroup),
            REMOVE_FROM_GROUP => Some(Self::RemoveFromGroup),
            other => other
                .strip_prefix(MOVE_TO_GROUP)?
                .strip_prefix(':')?
                .parse()
                .ok()
                .map(Self::MoveToGroup),
        }
    }

    pub fn menu_id(&self) -> String {
        match self {
            Self::CreateGroup => CREATE_GROUP.to_string(),
            Self::RemoveFromGroup => REMOVE_FROM_GROUP.to_string(),
            Self::MoveToGroup(group) => format!("{MOVE_TO_GROUP}:{group}"),
        }
    }
}

#[derive(Debug, Clone)]
enum MenuOp {
    Add(GroupTab),
    Rename(GroupTab),
    Remove(TabId),
}

impl MenuOp {
    async fn apply(&self, platform: &dyn Platform) -> Result<()> {
        match self {
            MenuOp::Add(group) => {
                platform
                    .create_menu_item(
                        MenuItem::new(MenuAction::MoveToGroup(group.id).menu_id(), &group.name)
                            .child_of(MOVE_TO_GROUP),
                    )
                    .await
            }
            MenuOp::Rename(group) => {
                platform
                    .update_menu_item(
                        &MenuAction::MoveToGroup(group.id).menu_id(),
                        MenuUpdate {
                            title: Some(group.name.clone()),
                            ..Default::default()
                        },
                    )
                    .await
            }
            MenuOp::Remove(id) => {
                platform
                    .remove_menu_item(&MenuAction::MoveToGroup(*id).menu_id())
                    .await
            }
        }
    }
}

pub struct MenuSync {
    tx: mpsc::UnboundedSender<MenuOp>,
    rx: Mutex<mpsc::UnboundedReceiver<MenuOp>>,
}

impl MenuSync {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn attach(&self, notifiers: &Notifiers) {
        let tx = self.tx.clone();
        notifiers.add.subscribe(Arc::new(move |e: &AddEvent| {
            if let AddEvent::GroupTabAdded { group } = e {
                let _ = tx.send(MenuOp::Add(group.clone()));
            }
        }));
        let tx = self.tx.clone();
        notifiers.remove.subscribe(Arc::new(move |e: &RemoveEvent| {
            if let RemoveEvent::GroupTabRemoved { group } = e {
                let _ = tx.send(MenuOp::Remove(group.id));
            }
        }));
        let tx = self.tx.clone();
        notifiers.edit.subscribe(Arc::new(move |e: &EditEvent| {
            if let EditEvent::GroupTabEdited { group } = e {
                let _ = tx.send(MenuOp::Rename(group.clone()));
            }
        }));
    }

    /// Create the static entries plus one child per existing group
    pub async fn install(&self, platform: &dyn Platform, groups: &[GroupTab]) -> Result<()> {
        platform
            .create_menu_item(MenuItem::new(CREATE_GROUP, "Create group"))
            .await?;
        platform
            .create_menu_item(MenuItem::new(REMOVE_FROM_GROUP, "Remove from group"))
            .await?;
        platform
            .create_menu_item(MenuItem::new(MOVE_TO_GROUP, "Move to group"))
            .await?;
        for group in groups {
            MenuOp::Add(group.clone()).apply(platform).await?;
        }
        Ok(())
    }

    pub async fn flush(&self, platform: &dyn Platform) -> usize {
        let mut rx = self.rx.lock().await;
        let mut applied = 0;
        while let Ok(op) = rx.try_recv() {
            match op.apply(platform).await {
                Ok(()) => applied += 1,
                Err(e) => tracing::debug!("Skipping menu update {:?}: {}", op, e),
            }
        }
        applied
    }

    /// Adjust entries to the tab the menu opened on
    pub async fn shown(
        &self,
        platform: &dyn Platform,
        tab: Option<TabId>,
        groups: &[GroupTab],
    ) -> Result<()> {
        let is_group = tab.map_or(false, |t| groups.iter().any(|g| g.id == t));
        let owner = tab.and_then(|t| groups.iter().find(|g| g.contains(t)).map(|g| g.id));

        platform
            .update_menu_item(CREATE_GROUP, visible_if(tab.is_some() && !is_group))
            .await?;
        platform
            .update_menu_item(REMOVE_FROM_GROUP, visible_if(owner.is_some()))
            .await?;
        platform
            .update_menu_item(
                MOVE_TO_GROUP,
                MenuUpdate {
                    visible: Some(!is_group),
                    enabled: Some(!groups.is_empty()),
                    ..Default::default()
                },
            )
            .await?;
        for group in groups {
            platform
                .update_menu_item(
                    &MenuAction::MoveToGroup(group.id).menu_id(),
                    MenuUpdate {
                        enabled: Some(owner != Some(group.id)),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Back to the neutral state once the menu closes
    pub async fn hidden(&self, platform: &dyn Platform) -> Result<()> {
        for id in [CREATE_GROUP, REMOVE_FROM_GROUP, MOVE_TO_GROUP] {
            platform.update_menu_item(id, visible_if(true)).await?;
        }
        Ok(())
    }
}

impl Default for MenuSync {
    fn default() -> Self {
        Self::new()
    }
}

fn visible_if(visible: bool) -> MenuUpdate {
    MenuUpdate {
        visible: Some(visible),
        enabled: Some(visible),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimBrowser;

    #[test]
    fn test_parse_menu_ids() {
        assert_eq!(MenuAction::parse("create-group"), Some(MenuAction::CreateGroup));
        assert_eq!(
            MenuAction::parse("move-to-group:42"),
            Some(MenuAction::MoveToGroup(42))
        );
        assert_eq!(MenuAction::parse("move-to-group"), None);
        assert_eq!(MenuAction::parse("move-to-group:x"), None);
        assert_eq!(
            MenuAction::parse(&MenuAction::MoveToGroup(7).menu_id()),
            Some(MenuAction::MoveToGroup(7))
        );
    }

    #[tokio::test]
    async fn test_shown_reflects_membership() {
        let browser = SimBrowser::new();
        browser.add_window(1, &[(1, "g"), (2, "a"), (3, "b")]);
        let group = GroupTab::new(1, "Work", vec![2]).unwrap();
        let menus = MenuSync::new();
        menus.install(&browser, &[group.clone()]).await.unwrap();

        menus
            .shown(&browser, Some(2), &[group.clone()])
            .await
            .unwrap();
        assert!(browser.menu(REMOVE_FROM_GROUP).unwrap().visible);
        assert!(!browser.menu("move-to-group:1").unwrap().enabled);

        menus.shown(&browser, Some(3), &[group]).await.unwrap();
        assert!(!browser.menu(REMOVE_FROM_GROUP).unwrap().visible);
        assert!(browser.menu("move-to-group:1").unwrap().enabled);
    }
}
