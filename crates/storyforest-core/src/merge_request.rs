use crate::error::{Result, StoryError};
use crate::types::MergeRequestStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level container for a forest of stories. `story_ids` is the ordered
/// list of its root-level stories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequestRoot {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    #[serde(default)]
    pub status: MergeRequestStatus,
    #[serde(default)]
    pub story_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMergeRequest {
    pub title: String,
    pub branch: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub pull_request_url: Option<String>,
}

impl NewMergeRequest {
    pub fn new(title: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            branch: branch.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("branch", &self.branch)
    }
}

/// Partial edit; `None` leaves a field untouched, an empty string clears an
/// optional one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeRequestPatch {
    pub title: Option<String>,
    pub branch: Option<String>,
    pub description: Option<String>,
    pub repository: Option<String>,
    pub base_branch: Option<String>,
    pub pull_request_url: Option<String>,
}

impl MergeRequestRoot {
    pub fn new(id: impl Into<String>, input: NewMergeRequest) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: input.title.trim().to_string(),
            description: non_blank(input.description),
            repository: non_blank(input.repository),
            branch: input.branch.trim().to_string(),
            base_branch: non_blank(input.base_branch),
            pull_request_url: non_blank(input.pull_request_url),
            status: MergeRequestStatus::Draft,
            story_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: MergeRequestPatch) -> Result<()> {
        if let Some(title) = patch.title {
            require_text("title", &title)?;
            self.title = title.trim().to_string();
        }
        if let Some(branch) = patch.branch {
            require_text("branch", &branch)?;
            self.branch = branch.trim().to_string();
        }
        if let Some(v) = patch.description {
            self.description = non_blank(Some(v));
        }
        if let Some(v) = patch.repository {
            self.repository = non_blank(Some(v));
        }
        if let Some(v) = patch.base_branch {
            self.base_branch = non_blank(Some(v));
        }
        if let Some(v) = patch.pull_request_url {
            self.pull_request_url = non_blank(Some(v));
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoryError::invalid_input(field, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
