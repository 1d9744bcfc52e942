use crate::models::comment::{fold_forest, CommentNode, SortMode};
use std::cmp::Ordering;

/// Returns a copy of `forest` with every sibling list ordered by `mode`.
///
/// `Popular` ranks by like count and falls back to the most recent comment
/// when counts tie. The sort is stable, so sorting an already sorted forest
/// leaves it unchanged.
pub fn sort_forest(forest: &[CommentNode], mode: SortMode) -> Vec<CommentNode> {
    let mut sorted = fold_forest(forest, |node, _, mut replies: Vec<CommentNode>| {
        replies.sort_by(|a, b| compare(a, b, mode));
        let mut copy = node.detached();
        copy.replies = replies;
        copy
    });
    sorted.sort_by(|a, b| compare(a, b, mode));
    sorted
}

fn compare(a: &CommentNode, b: &CommentNode, mode: SortMode) -> Ordering {
    match mode {
        SortMode::Recent => b.comment.created_at.cmp(&a.comment.created_at),
        SortMode::Oldest => a.comment.created_at.cmp(&b.comment.created_at),
        SortMode::Popular => b
            .likes_count
            .cmp(&a.likes_count)
            .then_with(|| b.comment.created_at.cmp(&a.comment.created_at)),
    }
}

/// Keeps the nodes for which `keep` holds, plus any node that still has a
/// kept descendant (so the path to it survives).
pub fn filter_forest<F>(forest: &[CommentNode], keep: &F) -> Vec<CommentNode>
where
    F: Fn(&CommentNode) -> bool,
{
    fold_forest(forest, |node, _, replies: Vec<Option<CommentNode>>| {
        let replies: Vec<CommentNode> = replies.into_iter().flatten().collect();
        if keep(node) || !replies.is_empty() {
            let mut copy = node.detached();
            copy.replies = replies;
            Some(copy)
        } else {
            None
        }
    })
    .into_iter()
    .flatten()
    .collect()
}
