use crate::{
    error::Result,
    models::{Comment, LikeState, NewComment, NewReport},
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistence boundary for comment threads.
///
/// Implementations talk to the hosted backend (or keep rows in memory); the
/// thread engine never touches storage any other way.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Every comment row of a post, flat and unsorted, tombstones included.
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>>;

    /// Like totals per comment, plus whether `viewer_id` liked each one.
    async fn fetch_like_state(
        &self,
        comment_ids: &[String],
        viewer_id: Option<String>,
    ) -> Result<HashMap<String, LikeState>>;

    async fn create_comment(&self, comment: NewComment) -> Result<Comment>;

    /// Replaces the content and bumps `updated_at`.
    async fn update_comment(&self, comment_id: &str, content: &str) -> Result<Comment>;

    /// Tombstones the comment; its replies stay attached.
    async fn delete_comment(&self, comment_id: &str) -> Result<()>;

    /// Adds the like if absent, removes it otherwise.
    async fn toggle_like(&self, comment_id: &str, user_id: &str) -> Result<LikeState>;

    /// Files a moderation report. A repeat report by the same user on the
    /// same comment is absorbed without creating a second row.
    async fn create_report(&self, report: NewReport) -> Result<()>;
}
