use crate::{
    config::Config,
    error::{AppError, Result},
    models::{Comment, LikeState, NewComment, NewReport},
    services::store::CommentStore,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, error, warn};
use validator::Validate;

const COMMENTS_TABLE: &str = "comments";
const LIKES_TABLE: &str = "comment_likes";
const REPORTS_TABLE: &str = "comment_reports";

/// Comment ids per like query; keeps `in.(..)` filters well under gateway URI limits.
const LIKE_BATCH_SIZE: usize = 100;

/// Comment store backed by the hosted database's REST gateway
/// (PostgREST-style filters: `?column=eq.value`).
#[derive(Clone)]
pub struct RestCommentStore {
    http_client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LikeCountRow {
    comment_id: String,
    count: i64,
}

#[derive(Debug, Deserialize)]
struct LikedRow {
    comment_id: String,
}

impl RestCommentStore {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.backend_rest_url.trim_end_matches('/').to_string(),
            api_key: config.backend_api_key.clone(),
            access_token: None,
        })
    }

    /// Sends requests with the signed-in user's token so row-level policies apply.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(AppError::NotFound(body)),
            StatusCode::UNAUTHORIZED => Err(AppError::Authentication(body)),
            StatusCode::FORBIDDEN => Err(AppError::Authorization(body)),
            StatusCode::CONFLICT => Err(AppError::Conflict(body)),
            _ => {
                error!("Backend returned {}: {}", status, body);
                Err(AppError::Backend(format!("{}: {}", status, body)))
            }
        }
    }

    /// Per-comment like totals, counted by the gateway (`count()` aggregate)
    /// so large totals are not capped by the row limit.
    async fn like_counts(&self, comment_filter: &str) -> Result<Vec<LikeCountRow>> {
        let request = self
            .http_client
            .get(self.url(LIKES_TABLE))
            .query(&[("select", "comment_id,count()"), ("comment_id", comment_filter)]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    /// The subset of the filtered comments that `user_id` has liked.
    async fn liked_by(&self, comment_filter: &str, user_id: &str) -> Result<Vec<LikedRow>> {
        let user_filter = format!("eq.{}", user_id);
        let request = self.http_client.get(self.url(LIKES_TABLE)).query(&[
            ("select", "comment_id"),
            ("comment_id", comment_filter),
            ("user_id", user_filter.as_str()),
        ]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn patch_live_comment(
        &self,
        comment_id: &str,
        changes: serde_json::Value,
    ) -> Result<Comment> {
        let request = self
            .http_client
            .patch(self.url(COMMENTS_TABLE))
            .query(&[
                ("id", format!("eq.{}", comment_id)),
                ("is_deleted", "eq.false".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&changes);
        let response = Self::check(self.authorize(request).send().await?).await?;
        let rows: Vec<Comment> = response.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("Comment"))
    }
}

#[async_trait]
impl CommentStore for RestCommentStore {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        debug!("Fetching comments for post: {}", post_id);
        let request = self
            .http_client
            .get(self.url(COMMENTS_TABLE))
            .query(&[
                ("select", "*".to_string()),
                ("post_id", format!("eq.{}", post_id)),
                ("order", "created_at.asc".to_string()),
            ]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
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

        for batch in comment_ids.chunks(LIKE_BATCH_SIZE) {
            let filter = format!("in.({})", batch.join(","));

            for row in self.like_counts(&filter).await? {
                match states.get_mut(&row.comment_id) {
                    Some(state) => state.count = row.count,
                    None => warn!("Backend returned likes for unrequested comment {}", row.comment_id),
                }
            }

            if let Some(viewer) = viewer_id.as_deref() {
                for row in self.liked_by(&filter, viewer).await? {
                    if let Some(state) = states.get_mut(&row.comment_id) {
                        state.user_has_liked = true;
                    }
                }
            }
        }
        debug!(
            "Loaded like state for {} comments in {} batches",
            comment_ids.len(),
            (comment_ids.len() + LIKE_BATCH_SIZE - 1) / LIKE_BATCH_SIZE
        );
        Ok(states)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        comment.validate()?;
        let request = self
            .http_client
            .post(self.url(COMMENTS_TABLE))
            .header("Prefer", "return=representation")
            .json(&comment);
        let response = Self::check(self.authorize(request).send().await?).await?;
        let rows: Vec<Comment> = response.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::backend("Backend did not return the created comment"))
    }

    async fn update_comment(&self, comment_id: &str, content: &str) -> Result<Comment> {
        self.patch_live_comment(
            comment_id,
            json!({
                "content": content,
                "is_edited": true,
                "updated_at": Utc::now(),
            }),
        )
        .await
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        self.patch_live_comment(
            comment_id,
            json!({
                "is_deleted": true,
                "deleted_at": Utc::now(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn toggle_like(&self, comment_id: &str, user_id: &str) -> Result<LikeState> {
        let comment_filter = format!("eq.{}", comment_id);
        let already_liked = !self.liked_by(&comment_filter, user_id).await?.is_empty();

        let request = if already_liked {
            self.http_client.delete(self.url(LIKES_TABLE)).query(&[
                ("comment_id", comment_filter.clone()),
                ("user_id", format!("eq.{}", user_id)),
            ])
        } else {
            self.http_client
                .post(self.url(LIKES_TABLE))
                .json(&json!({ "comment_id": comment_id, "user_id": user_id }))
        };
        Self::check(self.authorize(request).send().await?).await?;

        let count = self
            .like_counts(&comment_filter)
            .await?
            .iter()
            .map(|row| row.count)
            .sum();
        Ok(LikeState {
            count,
            user_has_liked: !already_liked,
        })
    }

    async fn create_report(&self, report: NewReport) -> Result<()> {
        report.validate()?;
        let request = self
            .http_client
            .post(self.url(REPORTS_TABLE))
            .query(&[("on_conflict", "comment_id,reporter_id")])
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&report);
        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}
