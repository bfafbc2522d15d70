mod notify;
mod tab;

pub use notify::{AddEvent, EditEvent, Listener, Notifier, Notifiers, RemoveEvent};
pub use tab::GroupTab;

/// Platform tab identifier
pub type TabId = i64;

/// Platform window identifier
pub type WindowId = i64;

/// Scheme of the page rendered inside every group tab
pub const GROUP_PAGE_PREFIX: &str = "group-tabs://group?id=";

/// URL loaded in the container tab of a group.
///
/// The id is embedded so a container tab can still be matched to its group
/// after the browser reassigns tab ids.
pub fn group_page_url(id: TabId) -> String {
    format!("{GROUP_PAGE_PREFIX}{id}")
}

/// Parse the group id back out of a group page URL
pub fn parse_group_page_url(url: &str) -> Option<TabId> {
    url.strip_prefix(GROUP_PAGE_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_page_url() {
        let url = group_page_url(42);
        assert_eq!(parse_group_page_url(&url), Some(42));
        assert_eq!(parse_group_page_url("https://example.com"), None);
        assert_eq!(parse_group_page_url("group-tabs://group?id=abc"), None);
    }
}
