#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use courtside::{
    error::{AppError, Result},
    models::{Comment, LikeState, NewComment, NewReport},
    services::{CommentStore, InMemoryCommentStore},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

pub const POST_ID: &str = "derby-match-report";

pub fn comment(id: &str, author: &str, parent: Option<&str>, minute: i64) -> Comment {
    let at = Utc.with_ymd_and_hms(2024, 4, 21, 15, 0, 0).unwrap() + Duration::minutes(minute);
    Comment {
        id: id.to_string(),
        post_id: POST_ID.to_string(),
        author_id: author.to_string(),
        parent_comment_id: parent.map(str::to_string),
        content: format!("{} says something about the derby", author),
        is_edited: false,
        is_deleted: false,
        created_at: at,
        updated_at: at,
        deleted_at: None,
    }
}

/// A straight reply chain `c0 <- c1 <- ... <- c{len-1}`.
pub fn chain(len: usize) -> Vec<Comment> {
    (0..len)
        .map(|i| {
            let parent = (i > 0).then(|| format!("c{}", i - 1));
            comment(&format!("c{}", i), "ultra", parent.as_deref(), i as i64)
        })
        .collect()
}

/// How [`FaultyStore`] misbehaves on writes. Reads always pass through.
pub enum Fault {
    None,
    Fail,
    Gate(Arc<Notify>),
    Stall,
}

pub struct FaultyStore {
    pub inner: InMemoryCommentStore,
    fault: Fault,
}

impl FaultyStore {
    pub fn new(inner: InMemoryCommentStore, fault: Fault) -> Self {
        Self { inner, fault }
    }

    async fn before_write(&self) -> Result<()> {
        match &self.fault {
            Fault::None => Ok(()),
            Fault::Fail => Err(AppError::backend("injected 503")),
            Fault::Gate(gate) => {
                gate.notified().await;
                Ok(())
            }
            Fault::Stall => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CommentStore for FaultyStore {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.inner.fetch_comments(post_id).await
    }

    async fn fetch_like_state(
        &self,
        comment_ids: &[String],
        viewer_id: Option<String>,
    ) -> Result<HashMap<String, LikeState>> {
        self.inner.fetch_like_state(comment_ids, viewer_id).await
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        self.before_write().await?;
        self.inner.create_comment(comment).await
    }

    async fn update_comment(&self, comment_id: &str, content: &str) -> Result<Comment> {
        self.before_write().await?;
        self.inner.update_comment(comment_id, content).await
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        self.before_write().await?;
        self.inner.delete_comment(comment_id).await
    }

    async fn toggle_like(&self, comment_id: &str, user_id: &str) -> Result<LikeState> {
        self.before_write().await?;
        self.inner.toggle_like(comment_id, user_id).await
    }

    async fn create_report(&self, report: NewReport) -> Result<()> {
        self.before_write().await?;
        self.inner.create_report(report).await
    }
}
