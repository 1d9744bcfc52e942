use crate::models::comment::{Comment, CommentNode, LikeState};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Builds the reply forest for one post out of flat comment rows.
///
/// Siblings keep their input order. A comment becomes a root when it has no
/// parent, when its parent is not among `comments`, or when its parent belongs
/// to another post. Rows with a duplicate id are skipped (the first one wins),
/// and reference cycles are broken by re-rooting the cycle member that appears
/// first in the input, so every distinct comment lands in the forest exactly once.
pub fn build_forest(
    comments: &[Comment],
    likes: &HashMap<String, LikeState>,
) -> Vec<CommentNode> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(comments.len());
    let mut kept: Vec<usize> = Vec::with_capacity(comments.len());
    for (position, comment) in comments.iter().enumerate() {
        if index.contains_key(comment.id.as_str()) {
            warn!("Skipping duplicate comment row {}", comment.id);
            continue;
        }
        index.insert(comment.id.as_str(), position);
        kept.push(position);
    }

    let mut parents: Vec<Option<usize>> = vec![None; comments.len()];
    for &position in &kept {
        let comment = &comments[position];
        parents[position] = comment
            .parent_comment_id
            .as_deref()
            .and_then(|parent_id| index.get(parent_id).copied())
            .filter(|&parent| parent != position && comments[parent].post_id == comment.post_id);
    }

    break_cycles(&kept, &mut parents);

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for &position in &kept {
        match parents[position] {
            Some(parent) => children.entry(parent).or_default().push(position),
            None => roots.push(position),
        }
    }

    // Breadth-first from the roots puts every parent before its replies, so
    // walking it backwards finishes each reply before its parent needs it.
    let mut order = roots.clone();
    let mut next = 0;
    while next < order.len() {
        if let Some(child_positions) = children.get(&order[next]) {
            order.extend(child_positions.iter().copied());
        }
        next += 1;
    }

    let mut built: Vec<Option<CommentNode>> = Vec::with_capacity(comments.len());
    built.resize_with(comments.len(), || None);
    for &position in order.iter().rev() {
        let comment = &comments[position];
        let like_state = likes.get(&comment.id).copied().unwrap_or_default();
        let mut node = CommentNode::new(comment.clone(), like_state);
        if let Some(child_positions) = children.get(&position) {
            node.replies = child_positions
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
        }
        built[position] = Some(node);
    }

    roots
        .into_iter()
        .filter_map(|root| built[root].take())
        .collect()
}

fn break_cycles(kept: &[usize], parents: &mut [Option<usize>]) {
    // Positions whose ancestor chain is known to end at a root.
    let mut grounded: HashSet<usize> = HashSet::with_capacity(kept.len());

    for &start in kept {
        let mut path: Vec<usize> = Vec::new();
        let mut on_path: HashSet<usize> = HashSet::new();
        let mut current = start;

        loop {
            if grounded.contains(&current) {
                break;
            }
            if !on_path.insert(current) {
                let cycle_start = path
                    .iter()
                    .position(|&p| p == current)
                    .unwrap_or(0);
                let first_in_input = path[cycle_start..]
                    .iter()
                    .copied()
                    .min()
                    .unwrap_or(current);
                warn!("Breaking reply cycle at comment position {}", first_in_input);
                parents[first_in_input] = None;
                break;
            }
            path.push(current);
            match parents[current] {
                Some(parent) => current = parent,
                None => break,
            }
        }

        grounded.extend(path);
    }
}

/// Nesting level of a comment within `comments` (roots are 0). Missing and
/// foreign-post parents end the walk as in [`build_forest`]; so does a cycle.
pub fn comment_depth(comments: &[Comment], comment_id: &str) -> Option<usize> {
    let by_id: HashMap<&str, &Comment> = comments
        .iter()
        .rev()
        .map(|comment| (comment.id.as_str(), comment))
        .collect();

    let mut current = *by_id.get(comment_id)?;
    let mut seen: HashSet<&str> = HashSet::new();
    let mut depth = 0;

    while let Some(parent_id) = current.parent_comment_id.as_deref() {
        if !seen.insert(current.id.as_str()) {
            break;
        }
        match by_id.get(parent_id) {
            Some(parent) if parent.post_id == current.post_id && !seen.contains(parent.id.as_str()) => {
                depth += 1;
                current = parent;
            }
            _ => break,
        }
    }

    Some(depth)
}
