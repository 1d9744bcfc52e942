use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::comment::Comment;

/// A comment positioned for rendering.
///
/// `true_depth` is the comment's real nesting level (roots are 0);
/// `display_depth` is where the UI should indent it, never above the
/// configured maximum. Tombstoned comments carry `content: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayNode {
    pub id: String,
    pub author_id: String,
    pub parent_comment_id: Option<String>,
    pub content: Option<String>,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub likes_count: i64,
    pub user_has_liked: bool,
    pub display_depth: usize,
    pub true_depth: usize,
    pub collapsed: bool,
    pub hidden_reply_count: usize,
    pub replies: Vec<DisplayNode>,
}

impl DisplayNode {
    pub(crate) fn from_comment(
        comment: &Comment,
        likes_count: i64,
        user_has_liked: bool,
        display_depth: usize,
        true_depth: usize,
    ) -> Self {
        Self {
            id: comment.id.clone(),
            author_id: comment.author_id.clone(),
            parent_comment_id: comment.parent_comment_id.clone(),
            content: (!comment.is_deleted).then(|| comment.content.clone()),
            is_deleted: comment.is_deleted,
            is_edited: comment.is_edited,
            created_at: comment.created_at,
            likes_count,
            user_has_liked,
            display_depth,
            true_depth,
            collapsed: false,
            hidden_reply_count: 0,
            replies: Vec::new(),
        }
    }
}

impl Drop for DisplayNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

/// Which threads the reader has folded away.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseState {
    collapsed: HashSet<String>,
}

impl CollapseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collapsed(&self, comment_id: &str) -> bool {
        self.collapsed.contains(comment_id)
    }

    pub fn collapse(&mut self, comment_id: impl Into<String>) {
        self.collapsed.insert(comment_id.into());
    }

    pub fn expand(&mut self, comment_id: &str) {
        self.collapsed.remove(comment_id);
    }

    /// Returns the new collapsed state of the comment.
    pub fn toggle(&mut self, comment_id: &str) -> bool {
        if self.collapsed.remove(comment_id) {
            false
        } else {
            self.collapsed.insert(comment_id.to_string());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(id: &str) -> Comment {
        let at = Utc.with_ymd_and_hms(2024, 9, 1, 14, 0, 0).unwrap();
        Comment {
            id: id.to_string(),
            post_id: "season-opener".to_string(),
            author_id: "fan".to_string(),
            parent_comment_id: None,
            content: "Here we go".to_string(),
            is_edited: false,
            is_deleted: false,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_tombstone_has_no_content() {
        let mut comment = row("gone");
        comment.is_deleted = true;
        let display = DisplayNode::from_comment(&comment, 3, false, 1, 1);
        assert_eq!(display.content, None);
        assert_eq!(display.likes_count, 3);
    }

    #[test]
    fn test_dropping_deep_nesting() {
        let mut node = DisplayNode::from_comment(&row("leaf"), 0, false, 0, 0);
        for _ in 0..100_000 {
            let mut parent = DisplayNode::from_comment(&row("mid"), 0, false, 0, 0);
            parent.replies.push(node);
            node = parent;
        }
        drop(node);
    }

    #[test]
    fn test_collapse_toggle() {
        let mut state = CollapseState::new();
        assert!(state.toggle("a"));
        assert!(state.is_collapsed("a"));
        assert!(!state.toggle("a"));
        state.collapse("b");
        state.expand("b");
        assert!(!state.is_collapsed("b"));
    }
}
