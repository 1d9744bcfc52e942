pub mod memory_store;
pub mod pg_store;
pub mod render;
pub mod rest_store;
pub mod sorting;
pub mod store;
pub mod thread_builder;
pub mod thread_session;

// 重新导出常用类型
pub use memory_store::InMemoryCommentStore;
pub use pg_store::PgCommentStore;
pub use render::{count_rows, render_forest};
pub use rest_store::RestCommentStore;
pub use sorting::{filter_forest, sort_forest};
pub use store::CommentStore;
pub use thread_builder::{build_forest, comment_depth};
pub use thread_session::{PendingOperation, ThreadSession, ThreadSettings};

use crate::{
    config::Config,
    error::{AppError, Result},
};
use std::sync::Arc;
use tracing::info;

/// Builds the store named by `COMMENTS_BACKEND`.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn CommentStore>> {
    let backend = config.comments_backend.trim().to_ascii_lowercase();
    info!("Using comment store backend: {}", backend);

    let store: Arc<dyn CommentStore> = match backend.as_str() {
        "memory" => Arc::new(InMemoryCommentStore::new()),
        "rest" => Arc::new(RestCommentStore::new(config)?),
        "postgres" | "pg" => Arc::new(PgCommentStore::connect(config).await?),
        other => {
            return Err(AppError::Config(format!(
                "Unknown comment store backend: {}",
                other
            )))
        }
    };
    Ok(store)
}
