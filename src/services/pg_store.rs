use crate::{
    config::Config,
    error::{AppError, Result},
    models::{Comment, LikeState, NewComment, NewReport},
    services::store::CommentStore,
};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use tracing::{debug, info};
use validator::Validate;

const COMMENT_COLUMNS: &str = "id, post_id, author_id, parent_comment_id, content, \
     is_edited, is_deleted, created_at, updated_at, deleted_at";

/// Comment store talking straight to the backing Postgres database.
/// Table layout lives in `migrations/`.
#[derive(Clone)]
pub struct PgCommentStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct LikeAggregateRow {
    comment_id: String,
    count: i64,
    user_has_liked: bool,
}

impl PgCommentStore {
    pub async fn connect(config: &Config) -> Result<Self> {
        info!("Connecting comment store to Postgres");
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(config.request_timeout())
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled `migrations/` to the connected database.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    async fn ensure_live(&self, comment_id: &str) -> Result<()> {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM comments WHERE id = $1 AND NOT is_deleted")
                .bind(comment_id)
                .fetch_optional(&self.pool)
                .await?;
        exists
            .map(|_| ())
            .ok_or_else(|| AppError::not_found("Comment"))
    }
}

#[async_trait]
impl CommentStore for PgCommentStore {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        debug!("Fetching comments for post: {}", post_id);
        let query = format!(
            "SELECT {} FROM comments WHERE post_id = $1 ORDER BY created_at ASC",
            COMMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, Comment>(&query)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_like_state(
        &self,
        comment_ids: &[String],
        viewer_id: Option<String>,
    ) -> Result<HashMap<String, LikeState>> {
        let mut states: HashMap<String, LikeState> = comment_ids
            .iter()
            .map(|id| (id.clone(), LikeState::default()))
            .collect();
        if comment_ids.is_empty() {
            return Ok(states);
        }

        let rows = sqlx::query_as::<_, LikeAggregateRow>(
            r#"
            SELECT comment_id,
                   COUNT(*) AS count,
                   COALESCE(BOOL_OR(user_id = $2), false) AS user_has_liked
            FROM comment_likes
            WHERE comment_id = ANY($1)
            GROUP BY comment_id
            "#,
        )
        .bind(comment_ids)
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            states.insert(
                row.comment_id,
                LikeState {
                    count: row.count,
                    user_has_liked: row.user_has_liked,
                },
            );
        }
        Ok(states)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        comment.validate()?;

        if let Some(parent_id) = &comment.parent_comment_id {
            let parent: Option<(String,)> = sqlx::query_as(
                "SELECT post_id FROM comments WHERE id = $1 AND NOT is_deleted",
            )
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await?;
            match parent {
                Some((post_id,)) if post_id == comment.post_id => {}
                _ => return Err(AppError::NotFound("Parent comment not found".to_string())),
            }
        }

        let query = format!(
            "INSERT INTO comments (post_id, author_id, parent_comment_id, content) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            COMMENT_COLUMNS
        );
        let created = sqlx::query_as::<_, Comment>(&query)
            .bind(&comment.post_id)
            .bind(&comment.author_id)
            .bind(&comment.parent_comment_id)
            .bind(&comment.content)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update_comment(&self, comment_id: &str, content: &str) -> Result<Comment> {
        let query = format!(
            "UPDATE comments SET content = $2, is_edited = true, updated_at = now() \
             WHERE id = $1 AND NOT is_deleted RETURNING {}",
            COMMENT_COLUMNS
        );
        sqlx::query_as::<_, Comment>(&query)
            .bind(comment_id)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE comments SET is_deleted = true, deleted_at = now() \
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(comment_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Comment"));
        }
        Ok(())
    }

    async fn toggle_like(&self, comment_id: &str, user_id: &str) -> Result<LikeState> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the comment serializes toggles on it.
        let live: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM comments WHERE id = $1 AND NOT is_deleted FOR UPDATE",
        )
        .bind(comment_id)
        .fetch_optional(&mut *tx)
        .await?;
        if live.is_none() {
            return Err(AppError::not_found("Comment"));
        }

        let removed = sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
            .bind(comment_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            sqlx::query("INSERT INTO comment_likes (comment_id, user_id) VALUES ($1, $2)")
                .bind(comment_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let (count, user_has_liked): (i64, bool) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), false) \
             FROM comment_likes WHERE comment_id = $1",
        )
        .bind(comment_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!("Toggled like on {} by {}: {}", comment_id, user_id, user_has_liked);
        Ok(LikeState { count, user_has_liked })
    }

    async fn create_report(&self, report: NewReport) -> Result<()> {
        report.validate()?;
        self.ensure_live(&report.comment_id).await?;

        sqlx::query(
            "INSERT INTO comment_reports (comment_id, reporter_id, reason, description) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (comment_id, reporter_id) DO NOTHING",
        )
        .bind(&report.comment_id)
        .bind(&report.reporter_id)
        .bind(report.reason.as_str())
        .bind(&report.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
