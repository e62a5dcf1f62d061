use crate::acceptance::AcceptanceTest;
use crate::error::Result;
use crate::forest::Forest;
use crate::merge_request::MergeRequestRoot;
use crate::story::StoryNode;
use serde::Serialize;
use std::collections::HashSet;

/// Nested read model of one merge request.
#[derive(Debug, Clone, Serialize)]
pub struct MergeRequestTree {
    pub merge_request: MergeRequestRoot,
    pub stories: Vec<StoryTreeNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryTreeNode {
    #[serde(flatten)]
    pub story: StoryNode,
    pub tests: Vec<AcceptanceTest>,
    pub children: Vec<StoryTreeNode>,
}

impl MergeRequestTree {
    pub fn build(forest: &Forest, merge_request_id: &str) -> Result<Self> {
        let merge_request = forest.merge_request(merge_request_id)?.clone();
        let mut seen = HashSet::new();
        let stories = forest
            .root_stories(merge_request_id)
            .into_iter()
            .filter_map(|story| build_node(forest, &story.id, &mut seen))
            .collect();
        Ok(Self {
            merge_request,
            stories,
        })
    }

    /// Stories in display order: each story before its children.
    pub fn flatten(&self) -> Vec<&StoryTreeNode> {
        fn walk<'a>(nodes: &'a [StoryTreeNode], out: &mut Vec<&'a StoryTreeNode>) {
            for node in nodes {
                out.push(node);
                walk(&node.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.stories, &mut out);
        out
    }
}

fn build_node(forest: &Forest, id: &str, seen: &mut HashSet<String>) -> Option<StoryTreeNode> {
    if !seen.insert(id.to_string()) {
        return None;
    }
    let story = forest.stories.get(id)?;
    let children = story
        .child_ids
        .iter()
        .filter_map(|child| build_node(forest, child, seen))
        .collect();
    Some(StoryTreeNode {
        story: story.clone(),
        tests: forest.tests_for(id).into_iter().cloned().collect(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge_request::NewMergeRequest;
    use crate::story::NewStory;

    #[test]
    fn builds_nested_view_in_sibling_order() {
        let mut forest = Forest::new();
        let mut mr = MergeRequestRoot::new("mr", NewMergeRequest::new("Root", "main"));
        mr.story_ids = vec!["b".into(), "a".into()];
        forest.merge_requests.push(mr);
        let mut a = StoryNode::new("a", 0, NewStory::new("mr", "A"));
        a.child_ids = vec!["a1".into()];
        forest.stories.insert("a".into(), a);
        forest
            .stories
            .insert("a1".into(), StoryNode::new("a1", 1, NewStory::new("mr", "A1").under("a")));
        forest
            .stories
            .insert("b".into(), StoryNode::new("b", 0, NewStory::new("mr", "B")));

        let tree = MergeRequestTree::build(&forest, "mr").unwrap();
        let order: Vec<&str> = tree.flatten().iter().map(|n| n.story.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "a1"]);
        assert_eq!(tree.stories[1].children.len(), 1);

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["stories"][1]["children"][0]["title"], "A1");
    }

    #[test]
    fn unknown_merge_request_is_not_found() {
        assert!(MergeRequestTree::build(&Forest::new(), "nope").is_err());
    }
}
