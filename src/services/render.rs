use crate::models::comment::{fold_forest, CommentNode};
use crate::models::display::{CollapseState, DisplayNode};
use crate::services::sorting::filter_forest;

/// Lays a (sorted) forest out for display.
///
/// Nesting is capped at `max_depth` (roots are depth 0). The node sitting at
/// `max_depth` lists its whole subtree, pre-order, as flat replies at that same
/// depth, each keeping its `true_depth`. Deleted leaves with no surviving replies
/// are dropped; deleted comments that still have replies stay as placeholders.
pub fn render_forest(
    forest: &[CommentNode],
    max_depth: usize,
    collapsed: &CollapseState,
) -> Vec<DisplayNode> {
    let visible = filter_forest(forest, &|node: &CommentNode| node.comment.is_live());

    // Nodes down to `max_depth` yield themselves. Deeper nodes yield their
    // flattened run in reverse pre-order, so a parent only has to push itself.
    fold_forest(&visible, |node, depth, replies: Vec<Vec<DisplayNode>>| {
        let mut display = to_display(node, depth.min(max_depth), depth);

        if collapsed.is_collapsed(&node.comment.id) {
            display.collapsed = true;
            display.hidden_reply_count = node.reply_count();
            return vec![display];
        }

        if depth < max_depth {
            display.replies = replies.into_iter().flatten().collect();
            return vec![display];
        }

        let mut run: Vec<DisplayNode> = Vec::new();
        for reply_run in replies.into_iter().rev() {
            if run.is_empty() {
                run = reply_run;
            } else {
                run.extend(reply_run);
            }
        }

        if depth == max_depth {
            run.reverse();
            display.replies = run;
            vec![display]
        } else {
            run.push(display);
            run
        }
    })
    .into_iter()
    .flatten()
    .collect()
}

fn to_display(node: &CommentNode, display_depth: usize, true_depth: usize) -> DisplayNode {
    DisplayNode::from_comment(
        &node.comment,
        node.likes_count,
        node.user_has_liked,
        display_depth,
        true_depth,
    )
}

/// Total number of display rows, flattened replies included.
pub fn count_rows(nodes: &[DisplayNode]) -> usize {
    let mut stack: Vec<&DisplayNode> = nodes.iter().collect();
    let mut rows = 0;
    while let Some(node) = stack.pop() {
        rows += 1;
        stack.extend(node.replies.iter());
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment::{Comment, LikeState};
    use chrono::{Duration, TimeZone, Utc};

    fn node(id: &str, offset: i64) -> CommentNode {
        let at = Utc.with_ymd_and_hms(2024, 3, 3, 20, 0, 0).unwrap() + Duration::minutes(offset);
        CommentNode::new(
            Comment {
                id: id.to_string(),
                post_id: "final".to_string(),
                author_id: "fan".to_string(),
                parent_comment_id: None,
                content: format!("body {}", id),
                is_edited: false,
                is_deleted: false,
                created_at: at,
                updated_at: at,
                deleted_at: None,
            },
            LikeState::default(),
        )
    }

    /// root -> c1 -> c2 -> ... -> c{len}
    fn chain(len: usize) -> CommentNode {
        let mut tail: Option<CommentNode> = None;
        for level in (1..=len).rev() {
            let mut current = node(&format!("c{}", level), level as i64);
            current.comment.parent_comment_id = Some(if level == 1 {
                "root".to_string()
            } else {
                format!("c{}", level - 1)
            });
            if let Some(child) = tail.take() {
                current.replies.push(child);
            }
            tail = Some(current);
        }
        let mut root = node("root", 0);
        root.replies.extend(tail);
        root
    }

    #[test]
    fn test_shallow_threads_nest_normally() {
        let rendered = render_forest(&[chain(2)], 3, &CollapseState::new());
        let c1 = &rendered[0].replies[0];
        assert_eq!((c1.display_depth, c1.true_depth), (1, 1));
        let c2 = &c1.replies[0];
        assert_eq!((c2.display_depth, c2.true_depth), (2, 2));
        assert!(c2.replies.is_empty());
    }

    #[test]
    fn test_deep_replies_flatten_at_max_depth() {
        let max_depth = 3;
        let rendered = render_forest(&[chain(max_depth + 5)], max_depth, &CollapseState::new());

        let anchor = &rendered[0].replies[0].replies[0].replies[0];
        assert_eq!(anchor.id, "c3");
        assert_eq!(anchor.display_depth, max_depth);
        assert_eq!(anchor.replies.len(), 5);
        for (offset, reply) in anchor.replies.iter().enumerate() {
            assert_eq!(reply.display_depth, max_depth);
            assert_eq!(reply.true_depth, max_depth + 1 + offset);
            assert!(reply.replies.is_empty());
        }
        assert_eq!(count_rows(&rendered), max_depth + 6);
    }

    #[test]
    fn test_collapsed_node_hides_replies() {
        let mut state = CollapseState::new();
        state.collapse("c1");
        let rendered = render_forest(&[chain(4)], 3, &state);

        let c1 = &rendered[0].replies[0];
        assert!(c1.collapsed);
        assert!(c1.replies.is_empty());
        assert_eq!(c1.hidden_reply_count, 3);
    }

    #[test]
    fn test_collapse_inside_flattened_run() {
        let mut state = CollapseState::new();
        state.collapse("c5");
        let rendered = render_forest(&[chain(8)], 3, &state);

        let anchor = &rendered[0].replies[0].replies[0].replies[0];
        let ids: Vec<&str> = anchor.replies.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c4", "c5"]);
        assert_eq!(anchor.replies[1].hidden_reply_count, 3);
    }

    #[test]
    fn test_deleted_comments() {
        let mut with_reply = node("gone", 0);
        with_reply.comment.is_deleted = true;
        with_reply.replies.push(node("kept", 1));
        let mut dead_leaf = node("dead", 2);
        dead_leaf.comment.is_deleted = true;

        let rendered = render_forest(&[with_reply, dead_leaf], 3, &CollapseState::new());

        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].is_deleted);
        assert_eq!(rendered[0].content, None);
        assert_eq!(rendered[0].replies[0].content.as_deref(), Some("body kept"));
    }

    #[test]
    fn test_very_deep_chain_renders_flat() {
        let rendered = render_forest(&[chain(100_000)], 3, &CollapseState::new());

        assert_eq!(count_rows(&rendered), 100_001);
        let anchor = &rendered[0].replies[0].replies[0].replies[0];
        assert_eq!(anchor.replies.len(), 100_000 - 3);
        assert_eq!(anchor.replies[0].id, "c4");
        let last = anchor.replies.last().unwrap();
        assert_eq!((last.display_depth, last.true_depth), (3, 100_000));
    }
}
