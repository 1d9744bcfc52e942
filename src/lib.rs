//! Nested comment threads for match reports and news posts.
//!
//! Rows come from a [`CommentStore`], get assembled into a reply forest, sorted,
//! and rendered with a display depth cap. [`ThreadSession`] owns one post's thread
//! for one viewer and applies mutations optimistically.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AppError, ErrorKind, Result};
pub use models::{
    CollapseState, Comment, CommentNode, DisplayNode, LikeState, NewComment, NewReport,
    ReportReason, SortMode, UserRole, Viewer,
};
pub use services::{
    build_forest, connect_store, filter_forest, render_forest, sort_forest, CommentStore,
    InMemoryCommentStore, PgCommentStore, RestCommentStore, ThreadSession, ThreadSettings,
};
