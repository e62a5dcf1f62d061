use crate::quality::QualityIssue;
use thiserror::Error;

/// Structural failures raised by the hierarchy enforcer. Message text for
/// `CycleDetected` and `DepthLimitExceeded` is matched by callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("parent story not found: {0}")]
    ParentNotFound(String),

    #[error("story not found: {0}")]
    NodeNotFound(String),

    #[error("Cycle detected: story '{node}' cannot be placed under '{parent}'")]
    CycleDetected { node: String, parent: String },

    #[error("Depth limit exceeded: depth {depth} is deeper than the limit of {limit}")]
    DepthLimitExceeded { depth: u32, limit: u32 },
}

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("not initialized: run 'storyforest init'")]
    NotInitialized,

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error("merge request not found: {0}")]
    MergeRequestNotFound(String),

    #[error("story not found: {0}")]
    StoryNotFound(String),

    #[error("acceptance test not found: {0}")]
    TestNotFound(String),

    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("invalid acceptance test {field}: {message}")]
    InvalidAcceptanceTest { field: String, message: String },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),

    #[error(
        "quality gate blocked for story '{story}': {} unresolved issue(s); pass accept_warnings to override",
        .issues.len()
    )]
    QualityGateBlocked {
        story: String,
        issues: Vec<QualityIssue>,
    },

    #[error(
        "story '{story}' has {} quality warning(s); pass accept_warnings to save anyway",
        .issues.len()
    )]
    QualityWarnings {
        story: String,
        issues: Vec<QualityIssue>,
    },

    #[error(
        "acceptance test outcome is not measurable: {}; pass accept_warnings to save anyway",
        .warnings.join("; ")
    )]
    UnmeasurableTest { warnings: Vec<String> },

    #[error("status change blocked for story '{story}': {reason}")]
    StatusBlocked { story: String, reason: String },

    #[error("commit conflict: forest kept changing underneath after {attempts} attempts")]
    CommitConflict { attempts: u32 },

    #[error(
        "depth limit {limit} is below the deepest stored story (depth {deepest}); \
         raise hierarchy.depth_limit or pass --depth-limit {deepest} (STORY_DEPTH_LIMIT)"
    )]
    DepthLimitBelowForest { limit: u32, deepest: u32 },

    #[error("forest violates invariants: {0}")]
    CorruptForest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoryError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        StoryError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_test(field: impl Into<String>, message: impl Into<String>) -> Self {
        StoryError::InvalidAcceptanceTest {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status a transport wrapper should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            StoryError::Hierarchy(HierarchyError::ParentNotFound(_)) => 400,
            StoryError::Hierarchy(HierarchyError::NodeNotFound(_)) => 404,
            StoryError::Hierarchy(_) => 409,
            StoryError::MergeRequestNotFound(_)
            | StoryError::StoryNotFound(_)
            | StoryError::TestNotFound(_) => 404,
            StoryError::InvalidInput { .. }
            | StoryError::InvalidAcceptanceTest { .. }
            | StoryError::InvalidStatus(_)
            | StoryError::InvalidCriterion(_)
            | StoryError::QualityWarnings { .. }
            | StoryError::UnmeasurableTest { .. }
            | StoryError::DepthLimitBelowForest { .. } => 400,
            StoryError::QualityGateBlocked { .. }
            | StoryError::StatusBlocked { .. }
            | StoryError::CommitConflict { .. } => 409,
            StoryError::NotInitialized
            | StoryError::CorruptForest(_)
            | StoryError::Io(_)
            | StoryError::Yaml(_)
            | StoryError::Json(_) => 500,
        }
    }

    /// Issues carried by a blocked gate or write, empty for every other error.
    pub fn issues(&self) -> &[QualityIssue] {
        match self {
            StoryError::QualityGateBlocked { issues, .. }
            | StoryError::QualityWarnings { issues, .. } => issues,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, StoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_messages_name_the_failure() {
        let cycle = StoryError::from(HierarchyError::CycleDetected {
            node: "a".into(),
            parent: "b".into(),
        });
        assert!(cycle.to_string().contains("Cycle"));

        let depth = StoryError::from(HierarchyError::DepthLimitExceeded { depth: 6, limit: 5 });
        assert!(depth.to_string().contains("Depth limit"));
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(StoryError::invalid_input("title", "empty").status_code(), 400);
        assert_eq!(StoryError::invalid_test("then", "empty").status_code(), 400);
        assert_eq!(StoryError::StoryNotFound("x".into()).status_code(), 404);
        assert_eq!(
            StoryError::from(HierarchyError::DepthLimitExceeded { depth: 6, limit: 5 })
                .status_code(),
            409
        );
        assert_eq!(
            StoryError::QualityGateBlocked {
                story: "x".into(),
                issues: Vec::new()
            }
            .status_code(),
            409
        );
        assert_eq!(
            StoryError::UnmeasurableTest { warnings: Vec::new() }.status_code(),
            400
        );
    }

    #[test]
    fn lowered_depth_limit_names_the_override() {
        let err = StoryError::DepthLimitBelowForest { limit: 5, deepest: 7 };
        assert_eq!(err.status_code(), 400);
        let message = err.to_string();
        assert!(message.contains("--depth-limit 7"));
        assert!(message.contains("STORY_DEPTH_LIMIT"));
    }
}
