use crate::acceptance::AcceptanceTest;
use crate::error::{Result, StoryError};
use crate::merge_request::MergeRequestRoot;
use crate::story::StoryNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete, versioned snapshot of every root, story and acceptance test.
///
/// `version` increases by one with every committed mutation and is the key
/// for compare-and-swap commits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub merge_requests: Vec<MergeRequestRoot>,
    #[serde(default)]
    pub stories: BTreeMap<String, StoryNode>,
    #[serde(default)]
    pub tests: BTreeMap<String, AcceptanceTest>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn merge_request(&self, id: &str) -> Result<&MergeRequestRoot> {
        self.merge_requests
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| StoryError::MergeRequestNotFound(id.to_string()))
    }

    pub fn merge_request_mut(&mut self, id: &str) -> Result<&mut MergeRequestRoot> {
        self.merge_requests
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoryError::MergeRequestNotFound(id.to_string()))
    }

    pub fn story(&self, id: &str) -> Result<&StoryNode> {
        self.stories
            .get(id)
            .ok_or_else(|| StoryError::StoryNotFound(id.to_string()))
    }

    pub fn story_mut(&mut self, id: &str) -> Result<&mut StoryNode> {
        self.stories
            .get_mut(id)
            .ok_or_else(|| StoryError::StoryNotFound(id.to_string()))
    }

    pub fn test(&self, id: &str) -> Result<&AcceptanceTest> {
        self.tests
            .get(id)
            .ok_or_else(|| StoryError::TestNotFound(id.to_string()))
    }

    pub fn test_mut(&mut self, id: &str) -> Result<&mut AcceptanceTest> {
        self.tests
            .get_mut(id)
            .ok_or_else(|| StoryError::TestNotFound(id.to_string()))
    }

    /// Children of a story in sibling order.
    pub fn children(&self, id: &str) -> Vec<&StoryNode> {
        self.stories
            .get(id)
            .map(|s| s.child_ids.iter().filter_map(|c| self.stories.get(c)).collect())
            .unwrap_or_default()
    }

    /// Root-level stories of a merge request in sibling order.
    pub fn root_stories(&self, merge_request_id: &str) -> Vec<&StoryNode> {
        self.merge_requests
            .iter()
            .find(|m| m.id == merge_request_id)
            .map(|m| m.story_ids.iter().filter_map(|c| self.stories.get(c)).collect())
            .unwrap_or_default()
    }

    /// Tests attached to a story in insertion order.
    pub fn tests_for(&self, story_id: &str) -> Vec<&AcceptanceTest> {
        self.stories
            .get(story_id)
            .map(|s| {
                s.acceptance_test_ids
                    .iter()
                    .filter_map(|t| self.tests.get(t))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The ordered sibling list a story with this placement lives in: the
    /// parent's `child_ids`, or the merge request's `story_ids` at root level.
    pub fn siblings_mut(
        &mut self,
        merge_request_id: &str,
        parent_id: Option<&str>,
    ) -> Result<&mut Vec<String>> {
        match parent_id {
            Some(parent) => Ok(&mut self.story_mut(parent)?.child_ids),
            None => Ok(&mut self.merge_request_mut(merge_request_id)?.story_ids),
        }
    }

    /// Every id present in the snapshot, for seeding the allocator.
    pub fn all_ids(&self) -> impl Iterator<Item = &str> {
        self.merge_requests
            .iter()
            .map(|m| m.id.as_str())
            .chain(self.stories.keys().map(String::as_str))
            .chain(self.tests.keys().map(String::as_str))
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove the given stories and every test attached to them. Returns the
    /// removed test ids. Sibling lists outside the removed set are untouched.
    pub(crate) fn remove_stories(&mut self, ids: &[String]) -> Vec<String> {
        let mut removed_tests = Vec::new();
        for id in ids {
            if let Some(story) = self.stories.remove(id) {
                for test_id in story.acceptance_test_ids {
                    if self.tests.remove(&test_id).is_some() {
                        removed_tests.push(test_id);
                    }
                }
            }
        }
        // Catch tests whose story dropped the back-reference.
        let orphaned: Vec<String> = self
            .tests
            .values()
            .filter(|t| !self.stories.contains_key(&t.story_id))
            .map(|t| t.id.clone())
            .collect();
        for test_id in orphaned {
            self.tests.remove(&test_id);
            removed_tests.push(test_id);
        }
        removed_tests
    }
}
