//! INVEST quality heuristics for a single story.
//!
//! The battery is a fixed table of checks, each yielding at most one issue.
//! An optional [`QualityAugmenter`] can replace or extend the heuristic
//! issues; when it fails the heuristic finding is returned unchanged.

use crate::acceptance::AcceptanceTest;
use crate::config::QualityConfig;
use crate::story::StoryNode;
use crate::types::{Criterion, FindingSource};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Finding types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub criterion: Criterion,
    pub message: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFinding {
    pub satisfied: bool,
    pub issues: Vec<QualityIssue>,
    pub source: FindingSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl QualityFinding {
    fn from_issues(issues: Vec<QualityIssue>, source: FindingSource) -> Self {
        Self {
            satisfied: issues.is_empty(),
            issues,
            source,
            summary: None,
        }
    }

    pub fn has(&self, criterion: Criterion) -> bool {
        self.issues.iter().any(|i| i.criterion == criterion)
    }

    pub fn criteria(&self) -> Vec<Criterion> {
        self.issues.iter().map(|i| i.criterion).collect()
    }
}

// ---------------------------------------------------------------------------
// Augmentation port
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AugmentMode {
    /// Use only the external issues.
    Replace,
    /// Append external issues to the heuristic ones, skipping duplicates.
    Supplement,
}

#[derive(Debug, Clone)]
pub struct Augmentation {
    pub mode: AugmentMode,
    pub issues: Vec<QualityIssue>,
    pub summary: Option<String>,
}

#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("quality augmentation unavailable: {0}")]
    Unavailable(String),

    #[error("quality augmentation failed: {0}")]
    Failed(String),
}

/// External analysis source. Best effort: any error degrades to the
/// heuristic finding.
pub trait QualityAugmenter: Send + Sync {
    fn augment(
        &self,
        story: &StoryNode,
        tests: &[&AcceptanceTest],
        heuristic: &QualityFinding,
    ) -> Result<Augmentation, AugmentError>;
}

// ---------------------------------------------------------------------------
// Heuristic checks
// ---------------------------------------------------------------------------

struct CheckContext<'a> {
    story: &'a StoryNode,
    tests: &'a [&'a AcceptanceTest],
    config: &'a QualityConfig,
}

/// A fn-pointer check: `None` when the criterion holds.
struct Check {
    criterion: Criterion,
    evaluate: fn(&CheckContext) -> Option<(String, String)>,
}

static CHECKS: &[Check] = &[
    Check {
        criterion: Criterion::Independent,
        evaluate: check_independent,
    },
    Check {
        criterion: Criterion::Negotiable,
        evaluate: check_negotiable,
    },
    Check {
        criterion: Criterion::Valuable,
        evaluate: check_valuable,
    },
    Check {
        criterion: Criterion::Estimable,
        evaluate: check_estimable,
    },
    Check {
        criterion: Criterion::Small,
        evaluate: check_small,
    },
    Check {
        criterion: Criterion::Testable,
        evaluate: check_testable,
    },
];

fn dependency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(depends on|dependent on|blocked by|requires (story|feature|ticket)|after (story|feature)|waiting (on|for)|once (story|feature)|prerequisite)\b",
        )
        .expect("static regex")
    })
}

fn prescriptive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(must use|must be (built|implemented|written)|pixel[- ]perfect|exact(ly)?|hard[- ]?coded?|\d+\s*px|using (library|framework)|only use)\b",
        )
        .expect("static regex")
    })
}

fn check_independent(ctx: &CheckContext) -> Option<(String, String)> {
    let hit = ctx
        .story
        .text_fields()
        .into_iter()
        .find_map(|text| dependency_re().find(text))?;
    Some((
        format!(
            "references other work (\"{}\"), so it cannot be delivered on its own",
            hit.as_str()
        ),
        "Remove the dependency or reorder the work so this story stands alone.".to_string(),
    ))
}

fn check_negotiable(ctx: &CheckContext) -> Option<(String, String)> {
    let hit = prescriptive_re().find(&ctx.story.i_want)?;
    Some((
        format!(
            "\"I want\" prescribes the implementation (\"{}\")",
            hit.as_str()
        ),
        "Describe the need and leave the solution open for discussion.".to_string(),
    ))
}

fn check_valuable(ctx: &CheckContext) -> Option<(String, String)> {
    if !ctx.story.so_that.trim().is_empty() {
        return None;
    }
    Some((
        "\"so that\" is empty, so the benefit is not stated".to_string(),
        "Add the outcome the user gains with \"so that ...\".".to_string(),
    ))
}

fn check_estimable(ctx: &CheckContext) -> Option<(String, String)> {
    let max = ctx.config.max_estimate;
    match ctx.story.estimate {
        None => Some((
            "no estimate has been given".to_string(),
            "Size the story with the team.".to_string(),
        )),
        Some(e) if e <= 0.0 => Some((
            "estimate is 0, which suggests the work is not understood yet".to_string(),
            "Clarify scope and re-estimate.".to_string(),
        )),
        Some(e) if e > max => Some((
            format!("estimate {e} is above {max}, too large to estimate with confidence"),
            "Break the work down until each piece can be sized.".to_string(),
        )),
        Some(_) => None,
    }
}

fn check_small(ctx: &CheckContext) -> Option<(String, String)> {
    let threshold = ctx.config.split_threshold;
    let estimate = ctx.story.estimate?;
    if estimate <= threshold || !ctx.story.child_ids.is_empty() {
        return None;
    }
    Some((
        format!("estimate {estimate} is above {threshold} and the story has no child stories"),
        "Split it into child stories that each fit within an iteration.".to_string(),
    ))
}

fn check_testable(ctx: &CheckContext) -> Option<(String, String)> {
    if ctx.tests.is_empty() {
        return Some((
            "no acceptance tests are attached".to_string(),
            "Add at least one Given/When/Then acceptance test.".to_string(),
        ));
    }
    let incomplete = ctx.tests.iter().find(|t| t.has_empty_section())?;
    Some((
        format!(
            "acceptance test \"{}\" is missing Given, When or Then steps",
            incomplete.title
        ),
        "Complete every section of the acceptance test.".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// QualityAnalyzer
// ---------------------------------------------------------------------------

pub struct QualityAnalyzer {
    config: QualityConfig,
    augmenter: Option<Box<dyn QualityAugmenter>>,
}

impl QualityAnalyzer {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            augmenter: None,
        }
    }

    pub fn with_augmenter(mut self, augmenter: Box<dyn QualityAugmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn set_augmenter(&mut self, augmenter: Box<dyn QualityAugmenter>) {
        self.augmenter = Some(augmenter);
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Local battery only; deterministic and free of I/O.
    pub fn heuristic(&self, story: &StoryNode, tests: &[&AcceptanceTest]) -> QualityFinding {
        let ctx = CheckContext {
            story,
            tests,
            config: &self.config,
        };
        let issues = CHECKS
            .iter()
            .filter_map(|check| {
                (check.evaluate)(&ctx).map(|(detail, suggestion)| QualityIssue {
                    criterion: check.criterion,
                    message: format!("{}: {detail}", check.criterion.label()),
                    suggestion,
                })
            })
            .collect();
        QualityFinding::from_issues(issues, FindingSource::Heuristic)
    }

    /// Heuristic battery plus augmentation when configured. Never fails.
    pub fn analyze(&self, story: &StoryNode, tests: &[&AcceptanceTest]) -> QualityFinding {
        let heuristic = self.heuristic(story, tests);
        let Some(augmenter) = &self.augmenter else {
            return heuristic;
        };

        match augmenter.augment(story, tests, &heuristic) {
            Ok(augmentation) => merge(heuristic, augmentation),
            Err(e) => {
                tracing::warn!(story = %story.id, error = %e, "falling back to heuristic quality findings");
                heuristic
            }
        }
    }
}

fn merge(heuristic: QualityFinding, augmentation: Augmentation) -> QualityFinding {
    let issues = match augmentation.mode {
        AugmentMode::Replace => augmentation.issues,
        AugmentMode::Supplement => {
            let mut issues = heuristic.issues;
            for extra in augmentation.issues {
                let duplicate = issues
                    .iter()
                    .any(|i| i.criterion == extra.criterion && i.message == extra.message);
                if !duplicate {
                    issues.push(extra);
                }
            }
            issues
        }
    };
    let mut finding = QualityFinding::from_issues(issues, FindingSource::Augmented);
    finding.summary = augmentation.summary;
    finding
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
