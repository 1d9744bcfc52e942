use crate::{
    config::Config,
    error::{AppError, ErrorKind, Result},
    models::{
        comment::PROVISIONAL_ID_PREFIX, CollapseState, Comment, CommentNode, DisplayNode,
        LikeState, NewComment, NewReport, ReportReason, SortMode, UpdateCommentRequest, Viewer,
    },
    services::{
        render::render_forest,
        sorting::sort_forest,
        store::CommentStore,
        thread_builder::{build_forest, comment_depth},
    },
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Knobs the engine reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSettings {
    /// Deepest nesting level shown before replies are flattened (roots are 0).
    pub max_depth: usize,
    /// Deepest nesting level accepted for new replies. `None` stores any depth.
    pub max_stored_depth: Option<usize>,
    pub request_timeout: Duration,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_stored_depth: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for ThreadSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_depth: config.max_depth,
            max_stored_depth: config.max_stored_depth,
            request_timeout: config.request_timeout(),
        }
    }
}

/// Mutations that lock a comment while their backend call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingOperation {
    Edit,
    Delete,
    ToggleLike,
}

#[derive(Debug, Default)]
struct ThreadState {
    comments: Vec<Comment>,
    likes: HashMap<String, LikeState>,
}

/// Releases the per-comment lock when the operation settles.
struct InFlight<'a> {
    pending: &'a Mutex<HashMap<String, PendingOperation>>,
    comment_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.comment_id);
    }
}

/// One post's comment thread as seen by one viewer.
///
/// Rows are kept flat and the forest is rebuilt on every read. Mutations are
/// applied locally first, then sent to the store in a single call; if that call
/// fails the local change is undone and the error is returned. Edits, deletes and
/// like toggles on a comment that already has one of those in flight are
/// rejected with [`AppError::Busy`].
pub struct ThreadSession {
    store: Arc<dyn CommentStore>,
    post_id: String,
    viewer: Option<Viewer>,
    settings: ThreadSettings,
    state: Mutex<ThreadState>,
    pending: Mutex<HashMap<String, PendingOperation>>,
}

impl ThreadSession {
    pub async fn load(
        store: Arc<dyn CommentStore>,
        post_id: impl Into<String>,
        viewer: Option<Viewer>,
        settings: ThreadSettings,
    ) -> Result<Self> {
        let session = Self {
            store,
            post_id: post_id.into(),
            viewer,
            settings,
            state: Mutex::new(ThreadState::default()),
            pending: Mutex::new(HashMap::new()),
        };
        session.refresh().await?;
        Ok(session)
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    pub fn settings(&self) -> &ThreadSettings {
        &self.settings
    }

    /// Re-fetches every row and like aggregate for the post.
    pub async fn refresh(&self) -> Result<()> {
        debug!("Refreshing thread for post: {}", self.post_id);
        let comments = self.call(self.store.fetch_comments(&self.post_id)).await?;
        let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
        let likes = self
            .call(self.store.fetch_like_state(&ids, self.viewer_id()))
            .await?;

        let mut state = self.state.lock();
        state.comments = comments;
        state.likes = likes;
        Ok(())
    }

    pub fn forest(&self) -> Vec<CommentNode> {
        let state = self.state.lock();
        build_forest(&state.comments, &state.likes)
    }

    pub fn sorted(&self, mode: SortMode) -> Vec<CommentNode> {
        sort_forest(&self.forest(), mode)
    }

    pub fn render(&self, mode: SortMode, collapsed: &CollapseState) -> Vec<DisplayNode> {
        render_forest(&self.sorted(mode), self.settings.max_depth, collapsed)
    }

    /// Comments that are not tombstoned, optimistic ones included.
    pub fn comment_count(&self) -> usize {
        self.state
            .lock()
            .comments
            .iter()
            .filter(|c| c.is_live())
            .count()
    }

    pub fn like_state(&self, comment_id: &str) -> LikeState {
        self.state
            .lock()
            .likes
            .get(comment_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn pending_operation(&self, comment_id: &str) -> Option<PendingOperation> {
        self.pending.lock().get(comment_id).copied()
    }

    pub async fn add_comment(&self, content: &str) -> Result<Comment> {
        let viewer = self.require_viewer()?;
        let new_comment = NewComment {
            post_id: self.post_id.clone(),
            author_id: viewer.user_id.clone(),
            parent_comment_id: None,
            content: content.trim().to_string(),
        };
        new_comment.validate()?;

        self.submit_new(new_comment).await
    }

    pub async fn add_reply(&self, parent_id: &str, content: &str) -> Result<Comment> {
        let viewer = self.require_viewer()?;
        let new_comment = NewComment {
            post_id: self.post_id.clone(),
            author_id: viewer.user_id.clone(),
            parent_comment_id: Some(parent_id.to_string()),
            content: content.trim().to_string(),
        };
        new_comment.validate()?;

        let depth = {
            let state = self.state.lock();
            Self::live_comment(&state.comments, parent_id)?;
            comment_depth(&state.comments, parent_id).unwrap_or(0) + 1
        };
        if let Some(max_depth) = self.settings.max_stored_depth {
            if depth > max_depth {
                return Err(AppError::DepthExceeded { depth, max_depth });
            }
        }

        self.submit_new(new_comment).await
    }

    pub async fn edit_comment(&self, comment_id: &str, new_content: &str) -> Result<Comment> {
        let viewer = self.require_viewer()?;
        let request = UpdateCommentRequest {
            content: new_content.trim().to_string(),
        };
        request.validate()?;

        let previous = {
            let state = self.state.lock();
            Self::live_comment(&state.comments, comment_id)?.clone()
        };
        if previous.author_id != viewer.user_id {
            return Err(AppError::forbidden("You can only edit your own comments"));
        }

        let _in_flight = self.begin(comment_id, PendingOperation::Edit)?;
        self.update_row(comment_id, |row| {
            row.content = request.content.clone();
            row.is_edited = true;
            row.updated_at = Utc::now();
        });

        match self
            .call(self.store.update_comment(comment_id, &request.content))
            .await
        {
            Ok(updated) => {
                self.replace_row(updated.clone());
                info!("Comment {} edited by {}", comment_id, viewer.user_id);
                Ok(updated)
            }
            Err(err) => {
                self.replace_row(previous);
                self.settle_failure(comment_id, &err).await;
                Err(err)
            }
        }
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        let viewer = self.require_viewer()?;

        let previous = {
            let state = self.state.lock();
            Self::live_comment(&state.comments, comment_id)?.clone()
        };
        if previous.author_id != viewer.user_id && !viewer.role.is_moderator() {
            return Err(AppError::forbidden(
                "Only the author or a moderator can delete this comment",
            ));
        }

        let _in_flight = self.begin(comment_id, PendingOperation::Delete)?;
        self.update_row(comment_id, |row| {
            row.is_deleted = true;
            row.deleted_at = Some(Utc::now());
        });

        match self.call(self.store.delete_comment(comment_id)).await {
            Ok(()) => {
                info!(
                    "Comment {} deleted by {} ({:?})",
                    comment_id, viewer.user_id, viewer.role
                );
                Ok(())
            }
            Err(err) => {
                self.replace_row(previous);
                self.settle_failure(comment_id, &err).await;
                Err(err)
            }
        }
    }

    pub async fn toggle_like(&self, comment_id: &str) -> Result<LikeState> {
        let viewer = self.require_viewer()?;

        let previous = {
            let state = self.state.lock();
            Self::live_comment(&state.comments, comment_id)?;
            state.likes.get(comment_id).copied().unwrap_or_default()
        };

        let _in_flight = self.begin(comment_id, PendingOperation::ToggleLike)?;
        self.set_like_state(comment_id, previous.toggled());

        match self
            .call(self.store.toggle_like(comment_id, &viewer.user_id))
            .await
        {
            Ok(confirmed) => {
                self.set_like_state(comment_id, confirmed);
                debug!(
                    "Like on {} by {} is now {}",
                    comment_id, viewer.user_id, confirmed.user_has_liked
                );
                Ok(confirmed)
            }
            Err(err) => {
                self.set_like_state(comment_id, previous);
                self.settle_failure(comment_id, &err).await;
                Err(err)
            }
        }
    }

    pub async fn report_comment(
        &self,
        comment_id: &str,
        reason: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let viewer = self.require_viewer()?;
        let reason: ReportReason = reason.parse().map_err(AppError::Validation)?;
        let report = NewReport {
            comment_id: comment_id.to_string(),
            reporter_id: viewer.user_id.clone(),
            reason,
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        };
        report.validate()?;

        {
            let state = self.state.lock();
            Self::live_comment(&state.comments, comment_id)?;
        }

        match self.call(self.store.create_report(report)).await {
            Ok(()) => {
                info!(
                    "Comment {} reported by {} for {}",
                    comment_id, viewer.user_id, reason
                );
                Ok(())
            }
            Err(err) => {
                self.settle_failure(comment_id, &err).await;
                Err(err)
            }
        }
    }

    async fn submit_new(&self, new_comment: NewComment) -> Result<Comment> {
        let provisional_id = format!("{}{}", PROVISIONAL_ID_PREFIX, Uuid::new_v4());
        {
            let now = Utc::now();
            let mut state = self.state.lock();
            state.comments.push(Comment {
                id: provisional_id.clone(),
                post_id: new_comment.post_id.clone(),
                author_id: new_comment.author_id.clone(),
                parent_comment_id: new_comment.parent_comment_id.clone(),
                content: new_comment.content.clone(),
                is_edited: false,
                is_deleted: false,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            });
        }

        match self.call(self.store.create_comment(new_comment)).await {
            Ok(created) => {
                {
                    let mut state = self.state.lock();
                    match state.comments.iter().position(|c| c.id == provisional_id) {
                        Some(position) => state.comments[position] = created.clone(),
                        None if !state.comments.iter().any(|c| c.id == created.id) => {
                            state.comments.push(created.clone())
                        }
                        None => {}
                    }
                    state.likes.insert(created.id.clone(), LikeState::default());
                }
                info!(
                    "Comment {} created on post {} by {}",
                    created.id, created.post_id, created.author_id
                );
                Ok(created)
            }
            Err(err) => {
                {
                    self.state
                        .lock()
                        .comments
                        .retain(|c| c.id != provisional_id);
                }
                self.settle_failure(&provisional_id, &err).await;
                Err(err)
            }
        }
    }

    async fn call<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Backend call for post {} timed out after {:?}",
                    self.post_id, self.settings.request_timeout
                );
                Err(AppError::Timeout(self.settings.request_timeout))
            }
        }
    }

    /// Logs the rollback and, when the backend no longer knows the comment,
    /// resyncs the whole thread.
    async fn settle_failure(&self, comment_id: &str, err: &AppError) {
        warn!("Rolled back operation on comment {}: {}", comment_id, err);
        if err.kind() == ErrorKind::NotFound {
            if let Err(refresh_err) = self.refresh().await {
                warn!(
                    "Failed to refresh thread for post {} after a missing comment: {}",
                    self.post_id, refresh_err
                );
            }
        }
    }

    fn begin(&self, comment_id: &str, operation: PendingOperation) -> Result<InFlight<'_>> {
        let mut pending = self.pending.lock();
        if let Some(current) = pending.get(comment_id) {
            debug!(
                "Rejecting {:?} on {} while {:?} is in flight",
                operation, comment_id, current
            );
            return Err(AppError::Busy(comment_id.to_string()));
        }
        pending.insert(comment_id.to_string(), operation);
        Ok(InFlight {
            pending: &self.pending,
            comment_id: comment_id.to_string(),
        })
    }

    fn require_viewer(&self) -> Result<&Viewer> {
        self.viewer
            .as_ref()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }

    fn viewer_id(&self) -> Option<String> {
        self.viewer.as_ref().map(|v| v.user_id.clone())
    }

    fn live_comment<'a>(comments: &'a [Comment], comment_id: &str) -> Result<&'a Comment> {
        let comment = comments
            .iter()
            .find(|c| c.id == comment_id && c.is_live())
            .ok_or_else(|| AppError::not_found("Comment"))?;
        if comment.is_provisional() {
            return Err(AppError::Busy(comment_id.to_string()));
        }
        Ok(comment)
    }

    fn update_row<F>(&self, comment_id: &str, change: F)
    where
        F: FnOnce(&mut Comment),
    {
        let mut state = self.state.lock();
        if let Some(row) = state.comments.iter_mut().find(|c| c.id == comment_id) {
            change(row);
        }
    }

    fn replace_row(&self, comment: Comment) {
        let mut state = self.state.lock();
        if let Some(row) = state.comments.iter_mut().find(|c| c.id == comment.id) {
            *row = comment;
        }
    }

    fn set_like_state(&self, comment_id: &str, like_state: LikeState) {
        self.state
            .lock()
            .likes
            .insert(comment_id.to_string(), like_state);
    }
}
