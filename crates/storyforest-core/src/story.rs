use crate::error::{Result, StoryError};
use crate::merge_request::{non_blank, require_text};
use crate::quality::{QualityFinding, QualityIssue};
use crate::types::StoryStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// StoryNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: String,
    pub merge_request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub depth: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub as_a: String,
    #[serde(default)]
    pub i_want: String,
    #[serde(default)]
    pub so_that: String,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub components: BTreeSet<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default)]
    pub acceptance_test_ids: Vec<String>,
    /// Last heuristic finding, refreshed on every mutation touching the story.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityFinding>,
    /// Set while the story sits in `done` through an override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings_accepted: Option<WarningsAccepted>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningsAccepted {
    pub at: DateTime<Utc>,
    pub issues: Vec<QualityIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: StoryStatus,
    pub to: StoryStatus,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub warnings_accepted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted_issues: Vec<QualityIssue>,
}

impl StoryNode {
    pub fn new(id: impl Into<String>, depth: u32, input: NewStory) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            merge_request_id: input.merge_request_id,
            parent_id: input.parent_id,
            depth,
            title: input.title.trim().to_string(),
            description: non_blank(input.description),
            as_a: input.as_a.trim().to_string(),
            i_want: input.i_want.trim().to_string(),
            so_that: input.so_that.trim().to_string(),
            status: input.status,
            estimate: input.estimate,
            assignee: non_blank(input.assignee),
            components: clean_components(input.components),
            child_ids: Vec::new(),
            acceptance_test_ids: Vec::new(),
            quality: None,
            warnings_accepted: None,
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The narrative in its conventional "As a … I want … so that …" form.
    pub fn narrative(&self) -> String {
        format!(
            "As a {}, I want {} so that {}",
            self.as_a, self.i_want, self.so_that
        )
    }

    /// Every free-text field, for keyword heuristics.
    pub fn text_fields(&self) -> [&str; 5] {
        [
            self.title.as_str(),
            self.description.as_deref().unwrap_or(""),
            self.as_a.as_str(),
            self.i_want.as_str(),
            self.so_that.as_str(),
        ]
    }

    pub fn apply(&mut self, patch: StoryPatch) -> Result<()> {
        if let Some(title) = patch.title {
            require_text("title", &title)?;
            self.title = title.trim().to_string();
        }
        if let Some(v) = patch.description {
            self.description = non_blank(Some(v));
        }
        if let Some(v) = patch.as_a {
            self.as_a = v.trim().to_string();
        }
        if let Some(v) = patch.i_want {
            self.i_want = v.trim().to_string();
        }
        if let Some(v) = patch.so_that {
            self.so_that = v.trim().to_string();
        }
        if let Some(estimate) = patch.estimate {
            validate_estimate(estimate)?;
            self.estimate = estimate;
        }
        if let Some(v) = patch.assignee {
            self.assignee = non_blank(v);
        }
        if let Some(v) = patch.components {
            self.components = clean_components(v);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStory {
    pub merge_request_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub as_a: String,
    #[serde(default)]
    pub i_want: String,
    #[serde(default)]
    pub so_that: String,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default)]
    pub estimate: Option<f64>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub components: BTreeSet<String>,
    /// Save despite quality warnings when writes are enforced.
    #[serde(default)]
    pub accept_warnings: bool,
}

impl NewStory {
    pub fn new(merge_request_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            merge_request_id: merge_request_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// A new story may start anywhere short of `done`; reaching `done`
    /// goes through the quality gate.
    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        if self.status.is_terminal() {
            return Err(StoryError::invalid_input(
                "status",
                format!(
                    "a story cannot be created as {}; create it earlier in the workflow and request the status change",
                    self.status
                ),
            ));
        }
        validate_estimate(self.estimate)
    }
}

/// Content-only edit. Structure and status have dedicated operations.
/// `estimate` and `assignee` use a nested option so they can be cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub as_a: Option<String>,
    pub i_want: Option<String>,
    pub so_that: Option<String>,
    pub estimate: Option<Option<f64>>,
    pub assignee: Option<Option<String>>,
    pub components: Option<BTreeSet<String>>,
    #[serde(default)]
    pub accept_warnings: bool,
}

fn validate_estimate(estimate: Option<f64>) -> Result<()> {
    match estimate {
        Some(v) if !v.is_finite() => Err(StoryError::invalid_input(
            "estimate",
            "must be a finite number",
        )),
        Some(v) if v < 0.0 => Err(StoryError::invalid_input(
            "estimate",
            format!("must not be negative, got {v}"),
        )),
        _ => Ok(()),
    }
}

fn clean_components(components: BTreeSet<String>) -> BTreeSet<String> {
    components
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}
