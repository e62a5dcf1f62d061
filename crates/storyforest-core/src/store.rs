//! The story tree store: owns the forest and is the only way to change it.
//!
//! Every mutation runs against a private copy of the current snapshot. The
//! copy is validated and edited, then offered to the [`ForestPort`] with the
//! version it was built from. Only an accepted commit replaces the shared
//! snapshot, so a rejected change leaves no trace. When the port reports that
//! another writer committed first, the store reloads and replays the
//! change against the fresh snapshot, re-running every check.

use crate::acceptance::{AcceptanceTest, AcceptanceTestPatch, NewAcceptanceTest};
use crate::config::{Config, GateConfig};
use crate::error::{HierarchyError, Result, StoryError};
use crate::forest::Forest;
use crate::gate::{self, GateContext, GateDecision, StatusChangeOptions};
use crate::hierarchy;
use crate::id::IdAllocator;
use crate::merge_request::{MergeRequestPatch, MergeRequestRoot, NewMergeRequest};
use crate::port::{CommitOutcome, ForestPort, Mutation};
use crate::quality::{QualityAnalyzer, QualityAugmenter, QualityFinding, QualityIssue};
use crate::story::{NewStory, StatusChange, StoryNode, StoryPatch, WarningsAccepted};
use crate::tree::MergeRequestTree;
use crate::types::{Criterion, IdKind, MergeRequestStatus, StoryStatus, TestStatus};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// Attempts per mutation before a persistent conflict is reported.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// What a cascading delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub stories: Vec<String>,
    pub tests: Vec<String>,
}

pub struct StoryStore {
    forest: RwLock<Forest>,
    port: Box<dyn ForestPort>,
    analyzer: QualityAnalyzer,
    ids: IdAllocator,
    depth_limit: u32,
    gate_policy: GateConfig,
}

impl StoryStore {
    /// Load the forest through `port`, refusing snapshots that break the
    /// structural invariants.
    pub fn open(port: Box<dyn ForestPort>, config: &Config) -> Result<Self> {
        let forest = port.load()?;
        let depth_limit = config.hierarchy.depth_limit;
        audit(&forest, depth_limit)?;

        let ids = IdAllocator::new();
        ids.reserve(forest.all_ids());
        tracing::debug!(
            version = forest.version,
            stories = forest.stories.len(),
            "opened story forest"
        );

        Ok(Self {
            forest: RwLock::new(forest),
            port,
            analyzer: QualityAnalyzer::new(config.quality.clone()),
            ids,
            depth_limit,
            gate_policy: config.gate.clone(),
        })
    }

    pub fn with_augmenter(mut self, augmenter: Box<dyn QualityAugmenter>) -> Self {
        self.analyzer.set_augmenter(augmenter);
        self
    }

    pub fn depth_limit(&self) -> u32 {
        self.depth_limit
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> Forest {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Forest> {
        self.forest.read().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Commit loop
    // -----------------------------------------------------------------------

    fn mutate<T>(&self, mut apply: impl FnMut(&mut Forest) -> Result<(Mutation, T)>) -> Result<T> {
        let mut current = self.forest.write().unwrap_or_else(PoisonError::into_inner);

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let expected = current.version;
            let mut next = current.clone();
            let (mutation, out) = apply(&mut next)?;
            next.version = expected + 1;

            match self.port.commit(&mutation, &next, expected)? {
                CommitOutcome::Committed => {
                    tracing::debug!(version = next.version, %mutation, "committed");
                    *current = next;
                    return Ok(out);
                }
                CommitOutcome::Conflict { current_version } => {
                    tracing::warn!(
                        attempt,
                        expected,
                        current_version,
                        %mutation,
                        "forest changed underneath; reloading"
                    );
                    let reloaded = self.port.load()?;
                    audit(&reloaded, self.depth_limit)?;
                    self.ids.reserve(reloaded.all_ids());
                    *current = reloaded;
                }
            }
        }

        Err(StoryError::CommitConflict {
            attempts: MAX_COMMIT_ATTEMPTS,
        })
    }

    /// Refresh the cached heuristic finding of each listed story that exists.
    fn refresh_quality(&self, forest: &mut Forest, ids: &[Option<&str>]) {
        for id in ids.iter().flatten() {
            let Some(story) = forest.stories.get(*id) else {
                continue;
            };
            let finding = self.analyzer.heuristic(story, &forest.tests_for(id));
            if let Some(story) = forest.stories.get_mut(*id) {
                story.quality = Some(finding);
            }
        }
    }

    /// With `quality.enforce_on_write`, a story whose cached finding fails
    /// anything but Testable is refused unless the caller accepts warnings.
    /// Testable is left to the status gate: tests are attached after the
    /// story exists.
    fn enforce_story_quality(&self, story: &StoryNode, accept_warnings: bool) -> Result<()> {
        if !self.analyzer.config().enforce_on_write {
            return Ok(());
        }
        let issues: Vec<QualityIssue> = story
            .quality
            .iter()
            .flat_map(|finding| finding.issues.iter())
            .filter(|issue| issue.criterion != Criterion::Testable)
            .cloned()
            .collect();
        if issues.is_empty() {
            return Ok(());
        }
        if accept_warnings {
            tracing::warn!(story = %story.id, issues = issues.len(), "saved with quality warnings accepted");
            return Ok(());
        }
        Err(StoryError::QualityWarnings {
            story: story.id.clone(),
            issues,
        })
    }

    fn enforce_measurable(&self, test: &AcceptanceTest, accept_warnings: bool) -> Result<()> {
        if !self.analyzer.config().enforce_on_write || test.measurability_warnings.is_empty() {
            return Ok(());
        }
        if accept_warnings {
            tracing::warn!(test = %test.id, "saved with measurability warnings accepted");
            return Ok(());
        }
        Err(StoryError::UnmeasurableTest {
            warnings: test.measurability_warnings.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Merge requests
    // -----------------------------------------------------------------------

    pub fn create_merge_request(&self, input: NewMergeRequest) -> Result<MergeRequestRoot> {
        input.validate()?;
        self.mutate(|forest| {
            let mr = MergeRequestRoot::new(self.ids.allocate(IdKind::MergeRequest), input.clone());
            forest.merge_requests.push(mr.clone());
            Ok((Mutation::CreateMergeRequest { id: mr.id.clone() }, mr))
        })
    }

    pub fn update_merge_request(
        &self,
        id: &str,
        patch: MergeRequestPatch,
    ) -> Result<MergeRequestRoot> {
        self.mutate(|forest| {
            let mr = forest.merge_request_mut(id)?;
            mr.apply(patch.clone())?;
            Ok((Mutation::UpdateMergeRequest { id: id.to_string() }, mr.clone()))
        })
    }

    /// Any status may follow any other.
    pub fn set_merge_request_status(
        &self,
        id: &str,
        status: MergeRequestStatus,
    ) -> Result<MergeRequestRoot> {
        self.mutate(|forest| {
            let mr = forest.merge_request_mut(id)?;
            mr.status = status;
            mr.updated_at = Utc::now();
            Ok((Mutation::UpdateMergeRequest { id: id.to_string() }, mr.clone()))
        })
    }

    /// Remove a merge request with all of its stories and their tests.
    pub fn delete_merge_request(&self, id: &str) -> Result<DeletionSummary> {
        self.mutate(|forest| {
            forest.merge_request(id)?;
            let stories: Vec<String> = forest
                .stories
                .values()
                .filter(|s| s.merge_request_id == id)
                .map(|s| s.id.clone())
                .collect();
            let tests = forest.remove_stories(&stories);
            forest.merge_requests.retain(|m| m.id != id);
            let mutation = Mutation::DeleteMergeRequest {
                id: id.to_string(),
                stories: stories.len(),
                tests: tests.len(),
            };
            Ok((mutation, DeletionSummary { stories, tests }))
        })
    }

    pub fn get_merge_request(&self, id: &str) -> Result<MergeRequestRoot> {
        self.read().merge_request(id).cloned()
    }

    /// Merge requests in creation order.
    pub fn list_merge_requests(&self) -> Vec<MergeRequestRoot> {
        self.read().merge_requests.clone()
    }

    // -----------------------------------------------------------------------
    // Stories: structure
    // -----------------------------------------------------------------------

    pub fn create_story(&self, input: NewStory) -> Result<StoryNode> {
        input.validate()?;
        self.mutate(|forest| {
            forest.merge_request(&input.merge_request_id)?;
            let parent_id = input.parent_id.as_deref();
            let depth = hierarchy::validate_create(forest, parent_id, self.depth_limit)?;
            if let Some(parent_id) = parent_id {
                let parent = forest.story(parent_id)?;
                if parent.merge_request_id != input.merge_request_id {
                    return Err(StoryError::invalid_input(
                        "parent_id",
                        format!(
                            "parent {parent_id} belongs to merge request {}, not {}",
                            parent.merge_request_id, input.merge_request_id
                        ),
                    ));
                }
            }

            let story = StoryNode::new(self.ids.allocate(IdKind::Story), depth, input.clone());
            let id = story.id.clone();
            forest
                .siblings_mut(&story.merge_request_id, parent_id)?
                .push(id.clone());
            forest.stories.insert(id.clone(), story);
            self.refresh_quality(forest, &[Some(id.as_str()), parent_id]);

            let created = forest.story(&id)?.clone();
            self.enforce_story_quality(&created, input.accept_warnings)?;
            let mutation = Mutation::CreateStory {
                id,
                parent_id: parent_id.map(str::to_string),
            };
            Ok((mutation, created))
        })
    }

    /// Reparent `id` under `new_parent_id` (root level of the story's current
    /// merge request when `None`) at `index`, clamped to the sibling count.
    /// Depth is recomputed for the whole subtree; moving under a story of
    /// another merge request carries the subtree across.
    pub fn move_story(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        index: usize,
    ) -> Result<StoryNode> {
        self.mutate(|forest| {
            let story = forest.story(id)?;
            let old_parent = story.parent_id.clone();
            let old_mr = story.merge_request_id.clone();

            let new_depth = hierarchy::validate_move(forest, id, new_parent_id, self.depth_limit)
                .map_err(|e| match e {
                    HierarchyError::NodeNotFound(id) => StoryError::StoryNotFound(id),
                    other => StoryError::Hierarchy(other),
                })?;
            let target_mr = match new_parent_id {
                Some(parent) => forest.story(parent)?.merge_request_id.clone(),
                None => old_mr.clone(),
            };

            forest
                .siblings_mut(&old_mr, old_parent.as_deref())?
                .retain(|s| s != id);
            let siblings = forest.siblings_mut(&target_mr, new_parent_id)?;
            let at = index.min(siblings.len());
            siblings.insert(at, id.to_string());

            let moved = forest.story_mut(id)?;
            moved.parent_id = new_parent_id.map(str::to_string);
            moved.updated_at = Utc::now();
            recompute_subtree(forest, id, new_depth, &target_mr);

            self.refresh_quality(forest, &[Some(id), old_parent.as_deref(), new_parent_id]);
            let updated = forest.story(id)?.clone();
            let mutation = Mutation::MoveStory {
                id: id.to_string(),
                parent_id: new_parent_id.map(str::to_string),
                index: at,
            };
            Ok((mutation, updated))
        })
    }

    /// Replace the child order of a story. `order` must be a permutation of
    /// the current children.
    pub fn reorder_children(&self, parent_id: &str, order: &[String]) -> Result<StoryNode> {
        self.mutate(|forest| {
            let parent = forest.story_mut(parent_id)?;
            check_permutation(&parent.child_ids, order)?;
            parent.child_ids = order.to_vec();
            parent.updated_at = Utc::now();
            let updated = parent.clone();
            let mutation = Mutation::ReorderChildren {
                parent: parent_id.to_string(),
            };
            Ok((mutation, updated))
        })
    }

    /// Replace the order of a merge request's root-level stories.
    pub fn reorder_root_stories(
        &self,
        merge_request_id: &str,
        order: &[String],
    ) -> Result<MergeRequestRoot> {
        self.mutate(|forest| {
            let mr = forest.merge_request_mut(merge_request_id)?;
            check_permutation(&mr.story_ids, order)?;
            mr.story_ids = order.to_vec();
            mr.updated_at = Utc::now();
            let updated = mr.clone();
            let mutation = Mutation::ReorderChildren {
                parent: merge_request_id.to_string(),
            };
            Ok((mutation, updated))
        })
    }

    /// Remove a story, its whole subtree, and every attached test.
    pub fn delete_story(&self, id: &str) -> Result<DeletionSummary> {
        self.mutate(|forest| {
            let story = forest.story(id)?;
            let parent_id = story.parent_id.clone();
            let mr_id = story.merge_request_id.clone();

            let stories = hierarchy::collect_subtree(forest, id);
            forest
                .siblings_mut(&mr_id, parent_id.as_deref())?
                .retain(|s| s != id);
            let tests = forest.remove_stories(&stories);
            self.refresh_quality(forest, &[parent_id.as_deref()]);

            let mutation = Mutation::DeleteStory {
                id: id.to_string(),
                stories: stories.len(),
                tests: tests.len(),
            };
            Ok((mutation, DeletionSummary { stories, tests }))
        })
    }

    // -----------------------------------------------------------------------
    // Stories: content and queries
    // -----------------------------------------------------------------------

    pub fn get_story(&self, id: &str) -> Result<StoryNode> {
        self.read().story(id).cloned()
    }

    /// Edit narrative fields, estimate, assignee or components.
    pub fn update_story(&self, id: &str, patch: StoryPatch) -> Result<StoryNode> {
        self.mutate(|forest| {
            forest.story_mut(id)?.apply(patch.clone())?;
            self.refresh_quality(forest, &[Some(id)]);
            let updated = forest.story(id)?.clone();
            self.enforce_story_quality(&updated, patch.accept_warnings)?;
            Ok((Mutation::UpdateStory { id: id.to_string() }, updated))
        })
    }

    /// Stories of a merge request, each before its children.
    pub fn list_stories(&self, merge_request_id: &str) -> Result<Vec<StoryNode>> {
        let forest = self.read();
        let tree = MergeRequestTree::build(&forest, merge_request_id)?;
        Ok(tree.flatten().into_iter().map(|n| n.story.clone()).collect())
    }

    /// Root-level ancestor first, `id` last.
    pub fn story_path(&self, id: &str) -> Result<Vec<StoryNode>> {
        let forest = self.read();
        let story = forest.story(id)?;
        let mut path: Vec<StoryNode> = hierarchy::ancestors(&forest, id)
            .iter()
            .rev()
            .filter_map(|a| forest.stories.get(a).cloned())
            .collect();
        path.push(story.clone());
        Ok(path)
    }

    pub fn tree(&self, merge_request_id: &str) -> Result<MergeRequestTree> {
        MergeRequestTree::build(&self.read(), merge_request_id)
    }

    // -----------------------------------------------------------------------
    // Acceptance tests
    // -----------------------------------------------------------------------

    pub fn add_test(&self, story_id: &str, input: NewAcceptanceTest) -> Result<AcceptanceTest> {
        input.validate()?;
        self.mutate(|forest| {
            forest.story(story_id)?;
            let test = AcceptanceTest::new(
                self.ids.allocate(IdKind::AcceptanceTest),
                story_id,
                input.clone(),
            );
            self.enforce_measurable(&test, input.accept_warnings)?;
            let story = forest.story_mut(story_id)?;
            story.acceptance_test_ids.push(test.id.clone());
            story.updated_at = Utc::now();
            forest.tests.insert(test.id.clone(), test.clone());
            self.refresh_quality(forest, &[Some(story_id)]);

            let mutation = Mutation::AddTest {
                id: test.id.clone(),
                story_id: story_id.to_string(),
            };
            Ok((mutation, test))
        })
    }

    pub fn update_test(&self, test_id: &str, patch: AcceptanceTestPatch) -> Result<AcceptanceTest> {
        self.mutate(|forest| {
            let test = forest.test_mut(test_id)?;
            test.apply(patch.clone())?;
            let updated = test.clone();
            self.enforce_measurable(&updated, patch.accept_warnings)?;
            self.refresh_quality(forest, &[Some(updated.story_id.as_str())]);
            Ok((Mutation::UpdateTest { id: test_id.to_string() }, updated))
        })
    }

    pub fn update_test_status(&self, test_id: &str, status: TestStatus) -> Result<AcceptanceTest> {
        self.mutate(|forest| {
            let test = forest.test_mut(test_id)?;
            test.status = status;
            test.updated_at = Utc::now();
            Ok((Mutation::UpdateTest { id: test_id.to_string() }, test.clone()))
        })
    }

    /// Record the outcome of running a test. A pass marks it `passed`; a
    /// failure drops a previously passed test back to `ready`.
    pub fn record_test_run(
        &self,
        test_id: &str,
        passed: bool,
        notes: Option<String>,
    ) -> Result<AcceptanceTest> {
        self.mutate(|forest| {
            let test = forest.test_mut(test_id)?;
            test.record_run(passed, notes.clone());
            Ok((Mutation::UpdateTest { id: test_id.to_string() }, test.clone()))
        })
    }

    /// Remove one test; the owning story stays.
    pub fn delete_test(&self, test_id: &str) -> Result<AcceptanceTest> {
        self.mutate(|forest| {
            let removed = forest
                .tests
                .remove(test_id)
                .ok_or_else(|| StoryError::TestNotFound(test_id.to_string()))?;
            if let Some(story) = forest.stories.get_mut(&removed.story_id) {
                story.acceptance_test_ids.retain(|t| t != test_id);
                story.updated_at = Utc::now();
            }
            self.refresh_quality(forest, &[Some(removed.story_id.as_str())]);
            let mutation = Mutation::DeleteTest {
                id: test_id.to_string(),
                story_id: removed.story_id.clone(),
            };
            Ok((mutation, removed))
        })
    }

    pub fn get_test(&self, test_id: &str) -> Result<AcceptanceTest> {
        self.read().test(test_id).cloned()
    }

    /// Tests of a story in insertion order.
    pub fn list_tests(&self, story_id: &str) -> Result<Vec<AcceptanceTest>> {
        let forest = self.read();
        forest.story(story_id)?;
        Ok(forest.tests_for(story_id).into_iter().cloned().collect())
    }

    // -----------------------------------------------------------------------
    // Quality and status
    // -----------------------------------------------------------------------

    /// Full analysis including augmentation. Only a missing story is an error.
    pub fn analyze_story(&self, id: &str) -> Result<QualityFinding> {
        let (_, story, tests) = self.story_with_tests(id)?;
        Ok(self.analyzer.analyze(&story, &tests.iter().collect::<Vec<_>>()))
    }

    /// Owned copies of a story and its tests plus the version they were read
    /// at, so augmentation can run without holding the forest lock.
    fn story_with_tests(&self, id: &str) -> Result<(u64, StoryNode, Vec<AcceptanceTest>)> {
        let forest = self.read();
        let story = forest.story(id)?.clone();
        let tests = forest.tests_for(id).into_iter().cloned().collect();
        Ok((forest.version, story, tests))
    }

    /// Change a story's status through the quality gate. An override is
    /// stamped on the story and kept in its status history.
    ///
    /// The augmented finding is computed before the write lock is taken. If
    /// the forest moved on in the meantime the gate falls back to the
    /// heuristic finding of the fresh snapshot.
    pub fn request_status_change(
        &self,
        id: &str,
        status: StoryStatus,
        options: StatusChangeOptions,
    ) -> Result<StoryNode> {
        let (read_at, story, tests) = self.story_with_tests(id)?;
        let augmented = self
            .analyzer
            .analyze(&story, &tests.iter().collect::<Vec<_>>());

        self.mutate(|forest| {
            let story = forest.story(id)?;
            let from = story.status;
            let tests = forest.tests_for(id);
            let children = forest.children(id);
            let finding = if forest.version == read_at {
                augmented.clone()
            } else {
                self.analyzer.heuristic(story, &tests)
            };
            let decision = gate::evaluate(
                &GateContext {
                    story,
                    finding: &finding,
                    children: &children,
                    tests: &tests,
                    policy: &self.gate_policy,
                },
                status,
                options,
            )?;

            let now = Utc::now();
            let accepted = match decision {
                GateDecision::Allowed => Vec::new(),
                GateDecision::Overridden(issues) => {
                    tracing::warn!(
                        story = %id,
                        issues = issues.len(),
                        "marked done with quality warnings accepted"
                    );
                    issues
                }
            };
            let warnings_accepted = !accepted.is_empty();

            let story = forest.story_mut(id)?;
            story.status = status;
            story.quality = Some(finding.clone());
            // A clean pass or leaving `done` clears an earlier override.
            story.warnings_accepted = warnings_accepted.then(|| WarningsAccepted {
                at: now,
                issues: accepted.clone(),
            });
            story.status_history.push(StatusChange {
                from,
                to: status,
                at: now,
                warnings_accepted,
                accepted_issues: accepted,
            });
            story.updated_at = now;

            let mutation = Mutation::ChangeStatus {
                id: id.to_string(),
                from,
                to: status,
                warnings_accepted,
            };
            Ok((mutation, story.clone()))
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn audit(forest: &Forest, depth_limit: u32) -> Result<()> {
    // Stories built under a raised limit are sound; only the caller's limit is off.
    let deepest = forest.stories.values().map(|s| s.depth).max().unwrap_or(0);
    if deepest > depth_limit {
        return Err(StoryError::DepthLimitBelowForest {
            limit: depth_limit,
            deepest,
        });
    }
    let violations = hierarchy::check_invariants(forest, depth_limit);
    if violations.is_empty() {
        return Ok(());
    }
    Err(StoryError::CorruptForest(violations.join("; ")))
}

/// Breadth-first depth and ownership rewrite below a moved story.
fn recompute_subtree(forest: &mut Forest, id: &str, depth: u32, merge_request_id: &str) {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([(id.to_string(), depth)]);
    while let Some((current, depth)) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        let Some(story) = forest.stories.get_mut(&current) else {
            continue;
        };
        story.depth = depth;
        story.merge_request_id = merge_request_id.to_string();
        for child in &story.child_ids {
            queue.push_back((child.clone(), depth + 1));
        }
    }
}

fn check_permutation(current: &[String], order: &[String]) -> Result<()> {
    let current_set: HashSet<&String> = current.iter().collect();
    let order_set: HashSet<&String> = order.iter().collect();
    if order.len() != current.len() || order_set.len() != order.len() || order_set != current_set {
        return Err(StoryError::invalid_input(
            "order",
            "must list every current child exactly once",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
