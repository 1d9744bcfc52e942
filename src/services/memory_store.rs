use crate::{
    error::{AppError, Result},
    models::{Comment, CommentReport, LikeState, NewComment, NewReport},
    services::store::CommentStore,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default)]
struct Inner {
    comments: Vec<Comment>,
    likes: HashSet<(String, String)>,
    reports: Vec<CommentReport>,
}

/// Process-local store with the same rules as the hosted backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommentStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds raw rows as-is, bypassing validation (for imports and fixtures).
    pub fn with_comments(comments: Vec<Comment>) -> Self {
        let store = Self::new();
        store.inner.write().comments = comments;
        store
    }

    pub fn insert_comment(&self, comment: Comment) {
        self.inner.write().comments.push(comment);
    }

    pub fn add_like(&self, comment_id: &str, user_id: &str) {
        self.inner
            .write()
            .likes
            .insert((comment_id.to_string(), user_id.to_string()));
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.inner.read().comments.clone()
    }

    pub fn comment(&self, comment_id: &str) -> Option<Comment> {
        self.inner
            .read()
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .cloned()
    }

    pub fn reports(&self) -> Vec<CommentReport> {
        self.inner.read().reports.clone()
    }

    fn like_state(inner: &Inner, comment_id: &str, viewer_id: Option<&str>) -> LikeState {
        let count = inner
            .likes
            .iter()
            .filter(|(liked, _)| liked == comment_id)
            .count() as i64;
        let user_has_liked = viewer_id
            .map(|viewer| {
                inner
                    .likes
                    .contains(&(comment_id.to_string(), viewer.to_string()))
            })
            .unwrap_or(false);
        LikeState { count, user_has_liked }
    }

    fn live_comment<'a>(inner: &'a mut Inner, comment_id: &str) -> Result<&'a mut Comment> {
        inner
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id && !c.is_deleted)
            .ok_or_else(|| AppError::not_found("Comment"))
    }
}

#[async_trait]
impl CommentStore for InMemoryCommentStore {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let inner = self.inner.read();
        Ok(inner
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn fetch_like_state(
        &self,
        comment_ids: &[String],
        viewer_id: Option<String>,
    ) -> Result<HashMap<String, LikeState>> {
        let inner = self.inner.read();
        Ok(comment_ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    Self::like_state(&inner, id, viewer_id.as_deref()),
                )
            })
            .collect())
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        comment.validate()?;
        let mut inner = self.inner.write();

        if let Some(parent_id) = &comment.parent_comment_id {
            let parent_ok = inner
                .comments
                .iter()
                .any(|c| &c.id == parent_id && c.post_id == comment.post_id && !c.is_deleted);
            if !parent_ok {
                return Err(AppError::NotFound("Parent comment not found".to_string()));
            }
        }

        let now = Utc::now();
        let created = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_comment_id: comment.parent_comment_id,
            content: comment.content,
            is_edited: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        debug!("Stored comment {} on post {}", created.id, created.post_id);
        inner.comments.push(created.clone());
        Ok(created)
    }

    async fn update_comment(&self, comment_id: &str, content: &str) -> Result<Comment> {
        let mut inner = self.inner.write();
        let comment = Self::live_comment(&mut inner, comment_id)?;
        comment.content = content.to_string();
        comment.is_edited = true;
        comment.updated_at = Utc::now();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let comment = Self::live_comment(&mut inner, comment_id)?;
        comment.is_deleted = true;
        comment.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn toggle_like(&self, comment_id: &str, user_id: &str) -> Result<LikeState> {
        let mut inner = self.inner.write();
        Self::live_comment(&mut inner, comment_id)?;

        let key = (comment_id.to_string(), user_id.to_string());
        if !inner.likes.remove(&key) {
            inner.likes.insert(key);
        }
        Ok(Self::like_state(&inner, comment_id, Some(user_id)))
    }

    async fn create_report(&self, report: NewReport) -> Result<()> {
        report.validate()?;
        let mut inner = self.inner.write();
        Self::live_comment(&mut inner, &report.comment_id)?;

        let duplicate = inner
            .reports
            .iter()
            .any(|r| r.comment_id == report.comment_id && r.reporter_id == report.reporter_id);
        if duplicate {
            debug!(
                "Ignoring repeat report on comment {} by {}",
                report.comment_id, report.reporter_id
            );
            return Ok(());
        }

        inner.reports.push(CommentReport {
            id: Uuid::new_v4().to_string(),
            comment_id: report.comment_id,
            reporter_id: report.reporter_id,
            reason: report.reason,
            description: report.description,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportReason;

    fn new_comment(parent: Option<&str>) -> NewComment {
        NewComment {
            post_id: "post-1".to_string(),
            author_id: "user-1".to_string(),
            parent_comment_id: parent.map(str::to_string),
            content: "What a goal".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let store = InMemoryCommentStore::new();
        let root = store.create_comment(new_comment(None)).await.unwrap();
        let reply = store.create_comment(new_comment(Some(&root.id))).await.unwrap();

        let rows = store.fetch_comments("post-1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(reply.parent_comment_id.as_deref(), Some(root.id.as_str()));
        assert!(store.fetch_comments("post-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_missing_parent_is_rejected() {
        let store = InMemoryCommentStore::new();
        let result = store.create_comment(new_comment(Some("missing"))).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_toggle_like_is_unique_per_user() {
        let store = InMemoryCommentStore::new();
        let comment = store.create_comment(new_comment(None)).await.unwrap();
        store.add_like(&comment.id, "someone-else");

        let liked = store.toggle_like(&comment.id, "user-1").await.unwrap();
        assert_eq!(liked, LikeState { count: 2, user_has_liked: true });

        let unliked = store.toggle_like(&comment.id, "user-1").await.unwrap();
        assert_eq!(unliked, LikeState { count: 1, user_has_liked: false });
    }

    #[tokio::test]
    async fn test_delete_tombstones() {
        let store = InMemoryCommentStore::new();
        let comment = store.create_comment(new_comment(None)).await.unwrap();
        store.delete_comment(&comment.id).await.unwrap();

        let stored = store.comment(&comment.id).unwrap();
        assert!(stored.is_deleted);
        assert!(stored.deleted_at.is_some());
        assert!(matches!(
            store.update_comment(&comment.id, "edit").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_repeat_report_is_absorbed() {
        let store = InMemoryCommentStore::new();
        let comment = store.create_comment(new_comment(None)).await.unwrap();
        let report = NewReport {
            comment_id: comment.id.clone(),
            reporter_id: "user-2".to_string(),
            reason: ReportReason::Spam,
            description: None,
        };

        store.create_report(report.clone()).await.unwrap();
        store.create_report(report).await.unwrap();

        assert_eq!(store.reports().len(), 1);
    }
}
