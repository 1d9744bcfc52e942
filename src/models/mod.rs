pub mod comment;
pub mod display;
pub mod report;
pub mod user;

pub use comment::{
    Comment, CommentNode, LikeState, NewComment, SortMode, UpdateCommentRequest,
    MAX_COMMENT_LENGTH,
};
pub use display::{CollapseState, DisplayNode};
pub use report::{CommentReport, NewReport, ReportReason};
pub use user::{UserRole, Viewer};
