pub const DEFAULT_FEED_BASE: &str = "https://docs.google.com/feeds/default/private/full";
pub const DEFAULT_ROOT_CREATE: &str =
    "https://docs.google.com/feeds/upload/create-session/default/private/full";
pub const ROOT_FOLDER_ID: &str = "folder:root";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUris {
    pub feed_base: String,
    pub root_create: String,
}

impl Default for FeedUris {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_BASE, DEFAULT_ROOT_CREATE)
    }
}

impl FeedUris {
    pub fn new(feed_base: impl Into<String>, root_create: impl Into<String>) -> Self {
        Self {
            feed_base: feed_base.into().trim_end_matches('/').to_string(),
            root_create: root_create.into().trim_end_matches('/').to_string(),
        }
    }

    /// Feed that receives new folders. `parent_id` is `None` for the root
    /// folder and must already be URI-escaped otherwise.
    pub fn folder_feed(&self, parent_id: Option<&str>) -> String {
        match parent_id {
            None => self.feed_base.clone(),
            Some(id) => format!("{}/{id}/contents", self.feed_base),
        }
    }

    /// Session-creation link for a new file under `parent_id`.
    pub fn create_session(&self, parent_id: &str) -> String {
        let nested = if parent_id == ROOT_FOLDER_ID {
            String::new()
        } else {
            format!("/{parent_id}/contents")
        };
        format!("{}{nested}?convert=false", self.root_create)
    }

    /// Session link for replacing the content of an existing resource.
    pub fn edit_session(&self, resource_id: &str, new_revision: bool) -> String {
        let query = if new_revision { "?new-revision=true" } else { "" };
        format!("{}/{resource_id}{query}", self.feed_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uris() -> FeedUris {
        FeedUris::new("https://docs.example/feeds/full/", "https://docs.example/upload/full")
    }

    #[test]
    fn folder_feed_under_root_has_no_parent_segment() {
        assert_eq!(uris().folder_feed(None), "https://docs.example/feeds/full");
    }

    #[test]
    fn folder_feed_nests_contents() {
        assert_eq!(
            uris().folder_feed(Some("folder%3Aabc")),
            "https://docs.example/feeds/full/folder%3Aabc/contents"
        );
    }

    #[test]
    fn create_session_under_root() {
        assert_eq!(
            uris().create_session(ROOT_FOLDER_ID),
            "https://docs.example/upload/full?convert=false"
        );
    }

    #[test]
    fn create_session_under_folder() {
        assert_eq!(
            uris().create_session("folder:abc"),
            "https://docs.example/upload/full/folder:abc/contents?convert=false"
        );
    }

    #[test]
    fn edit_session_with_and_without_new_revision() {
        assert_eq!(
            uris().edit_session("file:1", false),
            "https://docs.example/feeds/full/file:1"
        );
        assert_eq!(
            uris().edit_session("file:1", true),
            "https://docs.example/feeds/full/file:1?new-revision=true"
        );
    }
}
