use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

/// Canonical upper bound on comment length, in characters.
pub const MAX_COMMENT_LENGTH: usize = 1000;

/// Ids handed out to optimistic rows before the backend has assigned one.
pub const PROVISIONAL_ID_PREFIX: &str = "pending-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub parent_comment_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_comment_id.is_none()
    }

    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_ID_PREFIX)
    }

    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub count: i64,
    pub user_has_liked: bool,
}

impl LikeState {
    /// The state a successful toggle by the viewer would produce.
    pub fn toggled(self) -> Self {
        if self.user_has_liked {
            Self {
                count: (self.count - 1).max(0),
                user_has_liked: false,
            }
        } else {
            Self {
                count: self.count + 1,
                user_has_liked: true,
            }
        }
    }
}

/// A comment with its like aggregate and nested replies.
///
/// Reply chains can be arbitrarily deep, so every walk over a tree (clone,
/// drop, counting, the forest passes in `services`) uses an explicit stack.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub likes_count: i64,
    pub user_has_liked: bool,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn new(comment: Comment, likes: LikeState) -> Self {
        Self {
            comment,
            likes_count: likes.count,
            user_has_liked: likes.user_has_liked,
            replies: Vec::new(),
        }
    }

    /// Copy of this node without its replies.
    pub fn detached(&self) -> Self {
        Self {
            comment: self.comment.clone(),
            likes_count: self.likes_count,
            user_has_liked: self.user_has_liked,
            replies: Vec::new(),
        }
    }

    /// Number of descendants, at every depth.
    pub fn reply_count(&self) -> usize {
        let mut stack: Vec<&CommentNode> = self.replies.iter().collect();
        let mut count = 0;
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.replies.iter());
        }
        count
    }

    pub fn find(&self, comment_id: &str) -> Option<&CommentNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.comment.id == comment_id {
                return Some(node);
            }
            stack.extend(node.replies.iter().rev());
        }
        None
    }
}

impl Clone for CommentNode {
    fn clone(&self) -> Self {
        let mut copies = fold_forest(std::slice::from_ref(self), |node, _, replies| {
            let mut copy = node.detached();
            copy.replies = replies;
            copy
        });
        copies.pop().unwrap_or_else(|| self.detached())
    }
}

impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

enum Visit<'a> {
    Enter(&'a CommentNode, usize),
    Exit(&'a CommentNode, usize),
}

/// Folds a forest bottom-up without recursion.
///
/// `fold` sees each node, its depth (roots are 0) and the results already
/// produced for its replies, in reply order. Returns one result per root.
pub(crate) fn fold_forest<T, F>(forest: &[CommentNode], mut fold: F) -> Vec<T>
where
    F: FnMut(&CommentNode, usize, Vec<T>) -> T,
{
    let mut stack: Vec<Visit<'_>> = forest.iter().rev().map(|n| Visit::Enter(n, 0)).collect();
    let mut results: Vec<T> = Vec::with_capacity(forest.len());
    let mut starts: Vec<usize> = Vec::new();

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(node, depth) => {
                starts.push(results.len());
                stack.push(Visit::Exit(node, depth));
                stack.extend(node.replies.iter().rev().map(|r| Visit::Enter(r, depth + 1)));
            }
            Visit::Exit(node, depth) => {
                let start = starts.pop().unwrap_or(results.len());
                let replies = results.split_off(start);
                results.push(fold(node, depth, replies));
            }
        }
    }

    results
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Recent,
    Oldest,
    Popular,
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recent" => Ok(SortMode::Recent),
            "oldest" => Ok(SortMode::Oldest),
            "popular" => Ok(SortMode::Popular),
            other => Err(format!("unknown sort mode: {}", other)),
        }
    }
}

/// Row handed to the store when creating a comment or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1))]
    pub post_id: String,
    #[validate(length(min = 1))]
    pub author_id: String,
    pub parent_comment_id: Option<String>,
    #[validate(length(min = 1, max = 1000, message = "Comment must be between 1 and 1000 characters"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 1000, message = "Comment must be between 1 and 1000 characters"))]
    pub content: String,
}
