use crate::error::StoryError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// StoryStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryStatus {
    Backlog,
    Draft,
    InProgress,
    ReadyForTest,
    Done,
}

impl StoryStatus {
    pub fn all() -> &'static [StoryStatus] {
        &[
            StoryStatus::Backlog,
            StoryStatus::Draft,
            StoryStatus::InProgress,
            StoryStatus::ReadyForTest,
            StoryStatus::Done,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Backlog => "backlog",
            StoryStatus::Draft => "draft",
            StoryStatus::InProgress => "in-progress",
            StoryStatus::ReadyForTest => "ready-for-test",
            StoryStatus::Done => "done",
        }
    }

    /// The status the quality gate guards.
    pub fn is_terminal(self) -> bool {
        matches!(self, StoryStatus::Done)
    }
}

impl Default for StoryStatus {
    fn default() -> Self {
        StoryStatus::Backlog
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoryStatus {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backlog" => Ok(StoryStatus::Backlog),
            "draft" => Ok(StoryStatus::Draft),
            "in-progress" | "in_progress" => Ok(StoryStatus::InProgress),
            "ready-for-test" | "ready_for_test" => Ok(StoryStatus::ReadyForTest),
            "done" => Ok(StoryStatus::Done),
            _ => Err(StoryError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MergeRequestStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeRequestStatus {
    Draft,
    InProgress,
    ReadyForReview,
    Passed,
}

impl MergeRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeRequestStatus::Draft => "draft",
            MergeRequestStatus::InProgress => "in-progress",
            MergeRequestStatus::ReadyForReview => "ready-for-review",
            MergeRequestStatus::Passed => "passed",
        }
    }
}

impl Default for MergeRequestStatus {
    fn default() -> Self {
        MergeRequestStatus::Draft
    }
}

impl fmt::Display for MergeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MergeRequestStatus {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(MergeRequestStatus::Draft),
            "in-progress" | "in_progress" => Ok(MergeRequestStatus::InProgress),
            "ready-for-review" | "ready_for_review" => Ok(MergeRequestStatus::ReadyForReview),
            "passed" => Ok(MergeRequestStatus::Passed),
            _ => Err(StoryError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TestStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Draft,
    Ready,
    Blocked,
    InReview,
    Passed,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Draft => "draft",
            TestStatus::Ready => "ready",
            TestStatus::Blocked => "blocked",
            TestStatus::InReview => "in-review",
            TestStatus::Passed => "passed",
        }
    }
}

impl Default for TestStatus {
    fn default() -> Self {
        TestStatus::Draft
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestStatus {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(TestStatus::Draft),
            "ready" => Ok(TestStatus::Ready),
            "blocked" => Ok(TestStatus::Blocked),
            "in-review" | "in_review" => Ok(TestStatus::InReview),
            "passed" => Ok(TestStatus::Passed),
            _ => Err(StoryError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Criterion (INVEST)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Independent,
    Negotiable,
    Valuable,
    Estimable,
    Small,
    Testable,
}

impl Criterion {
    pub fn all() -> &'static [Criterion] {
        &[
            Criterion::Independent,
            Criterion::Negotiable,
            Criterion::Valuable,
            Criterion::Estimable,
            Criterion::Small,
            Criterion::Testable,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::Independent => "independent",
            Criterion::Negotiable => "negotiable",
            Criterion::Valuable => "valuable",
            Criterion::Estimable => "estimable",
            Criterion::Small => "small",
            Criterion::Testable => "testable",
        }
    }

    /// Capitalised name used as the prefix of issue messages.
    pub fn label(self) -> &'static str {
        match self {
            Criterion::Independent => "Independent",
            Criterion::Negotiable => "Negotiable",
            Criterion::Valuable => "Valuable",
            Criterion::Estimable => "Estimable",
            Criterion::Small => "Small",
            Criterion::Testable => "Testable",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Criterion {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Criterion::all()
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StoryError::InvalidCriterion(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// FindingSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSource {
    Heuristic,
    Augmented,
}

impl FindingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingSource::Heuristic => "heuristic",
            FindingSource::Augmented => "augmented",
        }
    }
}

impl fmt::Display for FindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// IdKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    MergeRequest,
    Story,
    AcceptanceTest,
}

impl IdKind {
    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::MergeRequest => "mr",
            IdKind::Story => "story",
            IdKind::AcceptanceTest => "test",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
