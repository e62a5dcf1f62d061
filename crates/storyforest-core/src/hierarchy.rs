//! Pure structural checks over a [`Forest`] snapshot.
//!
//! Nothing here mutates; the store asks these functions before it commits a
//! create or a move, and audits whole snapshots on load.

use crate::error::HierarchyError;
use crate::forest::Forest;
use std::collections::{HashSet, VecDeque};

// ---------------------------------------------------------------------------
// Validation entry points
// ---------------------------------------------------------------------------

/// Depth a new story would get under `parent_id`.
pub fn validate_create(
    forest: &Forest,
    parent_id: Option<&str>,
    depth_limit: u32,
) -> Result<u32, HierarchyError> {
    let Some(parent_id) = parent_id else {
        return Ok(0);
    };
    let parent = forest
        .stories
        .get(parent_id)
        .ok_or_else(|| HierarchyError::ParentNotFound(parent_id.to_string()))?;
    let depth = parent.depth + 1;
    if depth > depth_limit {
        return Err(HierarchyError::DepthLimitExceeded {
            depth,
            limit: depth_limit,
        });
    }
    Ok(depth)
}

/// Depth `node_id` would get under `new_parent_id`.
///
/// The whole subtree is checked: a move is rejected when its deepest
/// descendant would land below `depth_limit`, not just the node itself.
pub fn validate_move(
    forest: &Forest,
    node_id: &str,
    new_parent_id: Option<&str>,
    depth_limit: u32,
) -> Result<u32, HierarchyError> {
    if !forest.stories.contains_key(node_id) {
        return Err(HierarchyError::NodeNotFound(node_id.to_string()));
    }

    let new_depth = match new_parent_id {
        None => 0,
        Some(parent_id) => {
            if parent_id == node_id {
                return Err(cycle(node_id, parent_id));
            }
            let parent = forest
                .stories
                .get(parent_id)
                .ok_or_else(|| HierarchyError::ParentNotFound(parent_id.to_string()))?;

            // Walk up from the proposed parent. Meeting the moved node means
            // the parent is one of its descendants.
            let bound = forest.stories.len();
            let mut cursor = parent.parent_id.as_deref();
            let mut steps = 0;
            while let Some(ancestor) = cursor {
                if ancestor == node_id || steps > bound {
                    return Err(cycle(node_id, parent_id));
                }
                steps += 1;
                cursor = forest
                    .stories
                    .get(ancestor)
                    .and_then(|s| s.parent_id.as_deref());
            }
            parent.depth + 1
        }
    };

    let deepest = new_depth + subtree_height(forest, node_id);
    if deepest > depth_limit {
        return Err(HierarchyError::DepthLimitExceeded {
            depth: deepest,
            limit: depth_limit,
        });
    }
    Ok(new_depth)
}

fn cycle(node: &str, parent: &str) -> HierarchyError {
    HierarchyError::CycleDetected {
        node: node.to_string(),
        parent: parent.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Traversal helpers
// ---------------------------------------------------------------------------

/// Ancestor ids from the direct parent up to the root-level story.
pub fn ancestors(forest: &Forest, id: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = forest.stories.get(id).and_then(|s| s.parent_id.clone());
    while let Some(parent) = cursor {
        if out.contains(&parent) || parent == id {
            break;
        }
        cursor = forest.stories.get(&parent).and_then(|s| s.parent_id.clone());
        out.push(parent);
    }
    out
}

/// The story and all of its descendants, breadth-first.
pub fn collect_subtree(forest: &Forest, id: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([id.to_string()]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(story) = forest.stories.get(&current) {
            queue.extend(story.child_ids.iter().cloned());
            out.push(current);
        }
    }
    out
}

/// Longest downward path below `id`, in edges. A leaf has height 0.
pub fn subtree_height(forest: &Forest, id: &str) -> u32 {
    let mut height = 0;
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([(id.to_string(), 0u32)]);
    while let Some((current, level)) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        height = height.max(level);
        if let Some(story) = forest.stories.get(&current) {
            for child in &story.child_ids {
                queue.push_back((child.clone(), level + 1));
            }
        }
    }
    height
}

// ---------------------------------------------------------------------------
// Whole-forest audit
// ---------------------------------------------------------------------------

/// Every invariant violation in the snapshot, as human-readable lines.
/// An empty result means the forest is sound.
pub fn check_invariants(forest: &Forest, depth_limit: u32) -> Vec<String> {
    let mut violations = Vec::new();
    let mut placed: HashSet<&str> = HashSet::new();

    for mr in &forest.merge_requests {
        let mut seen = HashSet::new();
        for id in &mr.story_ids {
            if !seen.insert(id.as_str()) {
                violations.push(format!("merge request {} lists story {id} twice", mr.id));
            }
            if !placed.insert(id.as_str()) {
                violations.push(format!("story {id} is placed under more than one parent"));
            }
            match forest.stories.get(id) {
                None => violations.push(format!(
                    "merge request {} lists missing story {id}",
                    mr.id
                )),
                Some(s) if s.parent_id.is_some() => violations.push(format!(
                    "story {id} is listed at root level of {} but has a parent",
                    mr.id
                )),
                Some(s) if s.merge_request_id != mr.id => violations.push(format!(
                    "story {id} is listed under {} but belongs to {}",
                    mr.id, s.merge_request_id
                )),
                Some(_) => {}
            }
        }
    }

    for story in forest.stories.values() {
        let id = story.id.as_str();
        if story.depth > depth_limit {
            violations.push(format!(
                "story {id} has depth {} beyond the limit of {depth_limit}",
                story.depth
            ));
        }
        if forest.merge_request(&story.merge_request_id).is_err() {
            violations.push(format!(
                "story {id} belongs to missing merge request {}",
                story.merge_request_id
            ));
        }

        match story.parent_id.as_deref() {
            None => {
                if story.depth != 0 {
                    violations.push(format!(
                        "root-level story {id} has depth {} instead of 0",
                        story.depth
                    ));
                }
            }
            Some(parent_id) => match forest.stories.get(parent_id) {
                None => violations.push(format!("story {id} has missing parent {parent_id}")),
                Some(parent) => {
                    if story.depth != parent.depth + 1 {
                        violations.push(format!(
                            "story {id} has depth {} but its parent has depth {}",
                            story.depth, parent.depth
                        ));
                    }
                    if parent.merge_request_id != story.merge_request_id {
                        violations.push(format!(
                            "story {id} and its parent {parent_id} belong to different merge requests"
                        ));
                    }
                    if !parent.child_ids.iter().any(|c| c == id) {
                        violations.push(format!(
                            "story {id} is missing from the child order of {parent_id}"
                        ));
                    }
                }
            },
        }

        if story.parent_id.is_none()
            && !forest
                .merge_requests
                .iter()
                .any(|m| m.story_ids.iter().any(|s| s == id))
        {
            violations.push(format!(
                "root-level story {id} is missing from its merge request order"
            ));
        }

        let mut seen = HashSet::new();
        for child in &story.child_ids {
            if !seen.insert(child.as_str()) {
                violations.push(format!("story {id} lists child {child} twice"));
            }
            if !placed.insert(child.as_str()) {
                violations.push(format!("story {child} is placed under more than one parent"));
            }
            match forest.stories.get(child) {
                None => violations.push(format!("story {id} lists missing child {child}")),
                Some(c) if c.parent_id.as_deref() != Some(id) => violations.push(format!(
                    "story {id} lists child {child} whose parent is elsewhere"
                )),
                Some(_) => {}
            }
        }

        if has_cycle(forest, id) {
            violations.push(format!("story {id} is its own ancestor"));
        }

        for test_id in &story.acceptance_test_ids {
            match forest.tests.get(test_id) {
                None => violations.push(format!("story {id} references missing test {test_id}")),
                Some(t) if t.story_id != id => violations.push(format!(
                    "story {id} references test {test_id} owned by {}",
                    t.story_id
                )),
                Some(_) => {}
            }
        }
    }

    for test in forest.tests.values() {
        match forest.stories.get(&test.story_id) {
            None => violations.push(format!(
                "test {} belongs to missing story {}",
                test.id, test.story_id
            )),
            Some(s) if !s.acceptance_test_ids.contains(&test.id) => violations.push(format!(
                "test {} is not listed on story {}",
                test.id, test.story_id
            )),
            Some(_) => {}
        }
    }

    violations
}

fn has_cycle(forest: &Forest, id: &str) -> bool {
    let bound = forest.stories.len();
    let mut cursor = forest.stories.get(id).and_then(|s| s.parent_id.as_deref());
    let mut steps = 0;
    while let Some(parent) = cursor {
        if parent == id || steps > bound {
            return true;
        }
        steps += 1;
        cursor = forest.stories.get(parent).and_then(|s| s.parent_id.as_deref());
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge_request::{MergeRequestRoot, NewMergeRequest};
    use crate::story::{NewStory, StoryNode};

    /// Build a forest from (id, parent) pairs, placed in the given order.
    fn forest_of(pairs: &[(&str, Option<&str>)]) -> Forest {
        let mut forest = Forest::new();
        forest
            .merge_requests
            .push(MergeRequestRoot::new("mr", NewMergeRequest::new("Root", "main")));
        for (id, parent) in pairs {
            let depth = match parent {
                Some(p) => forest.stories[*p].depth + 1,
                None => 0,
            };
            let mut input = NewStory::new("mr", *id);
            input.parent_id = parent.map(str::to_string);
            forest
                .stories
                .insert(id.to_string(), StoryNode::new(*id, depth, input));
            forest
                .siblings_mut("mr", *parent)
                .unwrap()
                .push(id.to_string());
        }
        forest
    }

    fn chain(len: usize) -> Forest {
        let ids: Vec<String> = (0..len).map(|i| format!("s{i}")).collect();
        let pairs: Vec<(&str, Option<&str>)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), if i == 0 { None } else { Some(ids[i - 1].as_str()) }))
            .collect();
        forest_of(&pairs)
    }

    #[test]
    fn create_at_root_is_depth_zero() {
        let forest = Forest::new();
        assert_eq!(validate_create(&forest, None, 5).unwrap(), 0);
    }

    #[test]
    fn create_under_parent_is_parent_depth_plus_one() {
        let forest = chain(3);
        assert_eq!(validate_create(&forest, Some("s2"), 5).unwrap(), 3);
    }

    #[test]
    fn create_under_missing_parent() {
        let forest = chain(1);
        assert_eq!(
            validate_create(&forest, Some("ghost"), 5),
            Err(HierarchyError::ParentNotFound("ghost".into()))
        );
    }

    #[test]
    fn create_past_limit_is_rejected() {
        // s0..s5 occupy depths 0..=5.
        let forest = chain(6);
        assert!(check_invariants(&forest, 5).is_empty());
        assert_eq!(
            validate_create(&forest, Some("s5"), 5),
            Err(HierarchyError::DepthLimitExceeded { depth: 6, limit: 5 })
        );
    }

    #[test]
    fn move_under_self_is_cycle() {
        let forest = chain(2);
        let err = validate_move(&forest, "s0", Some("s0"), 5).unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }

    #[test]
    fn move_under_child_is_cycle() {
        let forest = chain(2);
        let err = validate_move(&forest, "s0", Some("s1"), 5).unwrap_err();
        assert!(matches!(err, HierarchyError::CycleDetected { .. }));
    }

    #[test]
    fn move_under_indirect_descendant_is_cycle() {
        let forest = chain(4);
        let err = validate_move(&forest, "s1", Some("s3"), 5).unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }

    #[test]
    fn move_to_root_level_is_depth_zero() {
        let forest = chain(3);
        assert_eq!(validate_move(&forest, "s2", None, 5).unwrap(), 0);
    }

    #[test]
    fn move_under_sibling_is_fine() {
        let forest = forest_of(&[("a", None), ("b", Some("a")), ("c", Some("a"))]);
        assert_eq!(validate_move(&forest, "c", Some("b"), 5).unwrap(), 2);
    }

    #[test]
    fn move_checks_deepest_descendant() {
        // deep chain d0..d4 (depths 0..4), plus x -> y -> z (height 2).
        let forest = forest_of(&[
            ("d0", None),
            ("d1", Some("d0")),
            ("d2", Some("d1")),
            ("d3", Some("d2")),
            ("x", None),
            ("y", Some("x")),
            ("z", Some("y")),
        ]);
        // x would land at depth 4, its grandchild at 6.
        assert_eq!(
            validate_move(&forest, "x", Some("d3"), 5),
            Err(HierarchyError::DepthLimitExceeded { depth: 6, limit: 5 })
        );
        // Under d2 the grandchild lands exactly on the limit.
        assert_eq!(validate_move(&forest, "x", Some("d2"), 5).unwrap(), 3);
    }

    #[test]
    fn move_of_unknown_node() {
        let forest = chain(1);
        assert_eq!(
            validate_move(&forest, "nope", None, 5),
            Err(HierarchyError::NodeNotFound("nope".into()))
        );
    }

    #[test]
    fn traversal_helpers() {
        let forest = forest_of(&[("a", None), ("b", Some("a")), ("c", Some("b")), ("d", Some("a"))]);
        assert_eq!(ancestors(&forest, "c"), vec!["b", "a"]);
        assert!(ancestors(&forest, "a").is_empty());
        assert_eq!(collect_subtree(&forest, "a"), vec!["a", "b", "d", "c"]);
        assert_eq!(subtree_height(&forest, "a"), 2);
        assert_eq!(subtree_height(&forest, "d"), 0);
    }

    #[test]
    fn audit_catches_bad_depth_and_dangling_parent() {
        let mut forest = forest_of(&[("a", None), ("b", Some("a"))]);
        forest.stories.get_mut("b").unwrap().depth = 4;
        let violations = check_invariants(&forest, 5);
        assert!(violations.iter().any(|v| v.contains("depth 4")));

        forest.stories.get_mut("b").unwrap().parent_id = Some("ghost".into());
        let violations = check_invariants(&forest, 5);
        assert!(violations.iter().any(|v| v.contains("missing parent ghost")));
    }

    #[test]
    fn audit_catches_cycles_without_looping() {
        let mut forest = forest_of(&[("a", None), ("b", Some("a"))]);
        let a = forest.stories.get_mut("a").unwrap();
        a.parent_id = Some("b".into());
        a.depth = 2;
        forest.stories.get_mut("b").unwrap().child_ids.push("a".into());
        let violations = check_invariants(&forest, 5);
        assert!(violations.iter().any(|v| v.contains("its own ancestor")));
        assert_eq!(ancestors(&forest, "a"), vec!["b"]);
    }
}
