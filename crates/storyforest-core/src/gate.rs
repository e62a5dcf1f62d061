use crate::acceptance::AcceptanceTest;
use crate::config::GateConfig;
use crate::error::{Result, StoryError};
use crate::quality::{QualityFinding, QualityIssue};
use crate::story::StoryNode;
use crate::types::{StoryStatus, TestStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeOptions {
    /// Reach `done` despite unresolved quality issues. Recorded on the story.
    #[serde(default)]
    pub accept_warnings: bool,
}

impl StatusChangeOptions {
    pub fn accepting_warnings() -> Self {
        Self {
            accept_warnings: true,
        }
    }
}

/// Everything the gate needs to judge one story.
pub struct GateContext<'a> {
    pub story: &'a StoryNode,
    pub finding: &'a QualityFinding,
    pub children: &'a [&'a StoryNode],
    pub tests: &'a [&'a AcceptanceTest],
    pub policy: &'a GateConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allowed,
    /// Allowed only because the caller accepted these issues.
    Overridden(Vec<QualityIssue>),
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Decide whether the story may move to `target`.
///
/// Non-terminal targets always pass. `done` needs a satisfied finding or an
/// explicit override; configured policies apply on top and cannot be
/// overridden.
pub fn evaluate(
    ctx: &GateContext,
    target: StoryStatus,
    options: StatusChangeOptions,
) -> Result<GateDecision> {
    if !target.is_terminal() {
        return Ok(GateDecision::Allowed);
    }

    if let Some(reason) = policy_violation(ctx) {
        return Err(StoryError::StatusBlocked {
            story: ctx.story.id.clone(),
            reason,
        });
    }

    if ctx.finding.satisfied {
        return Ok(GateDecision::Allowed);
    }
    if options.accept_warnings {
        return Ok(GateDecision::Overridden(ctx.finding.issues.clone()));
    }
    Err(StoryError::QualityGateBlocked {
        story: ctx.story.id.clone(),
        issues: ctx.finding.issues.clone(),
    })
}

fn policy_violation(ctx: &GateContext) -> Option<String> {
    if ctx.policy.require_children_done {
        let open: Vec<&str> = ctx
            .children
            .iter()
            .filter(|c| c.status != StoryStatus::Done)
            .map(|c| c.id.as_str())
            .collect();
        if !open.is_empty() {
            return Some(format!("child stories not done: {}", open.join(", ")));
        }
    }
    if ctx.policy.require_passing_tests {
        if ctx.tests.is_empty() {
            return Some("no acceptance tests to pass".to_string());
        }
        let failing: Vec<&str> = ctx
            .tests
            .iter()
            .filter(|t| t.status != TestStatus::Passed)
            .map(|t| t.id.as_str())
            .collect();
        if !failing.is_empty() {
            return Some(format!("acceptance tests not passed: {}", failing.join(", ")));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceptance::NewAcceptanceTest;
    use crate::story::NewStory;
    use crate::types::{Criterion, FindingSource};

    fn story(id: &str, status: StoryStatus) -> StoryNode {
        let mut input = NewStory::new("mr-1", id);
        input.status = status;
        StoryNode::new(id, 0, input)
    }

    fn finding(issues: Vec<QualityIssue>) -> QualityFinding {
        QualityFinding {
            satisfied: issues.is_empty(),
            issues,
            source: FindingSource::Heuristic,
            summary: None,
        }
    }

    fn testable_issue() -> QualityIssue {
        QualityIssue {
            criterion: Criterion::Testable,
            message: "Testable: no acceptance tests are attached".into(),
            suggestion: "Add one.".into(),
        }
    }

    fn passed_test() -> AcceptanceTest {
        let mut t = AcceptanceTest::new(
            "test-1",
            "s",
            NewAcceptanceTest::new(vec!["g".into()], vec!["w".into()], vec!["t".into()]),
        );
        t.status = TestStatus::Passed;
        t
    }

    fn ctx<'a>(
        s: &'a StoryNode,
        f: &'a QualityFinding,
        children: &'a [&'a StoryNode],
        tests: &'a [&'a AcceptanceTest],
        policy: &'a GateConfig,
    ) -> GateContext<'a> {
        GateContext {
            story: s,
            finding: f,
            children,
            tests,
            policy,
        }
    }

    #[test]
    fn non_terminal_targets_always_pass() {
        let s = story("s", StoryStatus::Done);
        let f = finding(vec![testable_issue()]);
        let policy = GateConfig::default();
        for target in [StoryStatus::Backlog, StoryStatus::InProgress, StoryStatus::ReadyForTest] {
            let decision = evaluate(
                &ctx(&s, &f, &[], &[], &policy),
                target,
                StatusChangeOptions::default(),
            )
            .unwrap();
            assert_eq!(decision, GateDecision::Allowed);
        }
    }

    #[test]
    fn done_with_issues_is_blocked_and_carries_them() {
        let s = story("s", StoryStatus::ReadyForTest);
        let f = finding(vec![testable_issue()]);
        let policy = GateConfig::default();
        let err = evaluate(
            &ctx(&s, &f, &[], &[], &policy),
            StoryStatus::Done,
            StatusChangeOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn done_with_override_lists_accepted_issues() {
        let s = story("s", StoryStatus::ReadyForTest);
        let f = finding(vec![testable_issue()]);
        let policy = GateConfig::default();
        let decision = evaluate(
            &ctx(&s, &f, &[], &[], &policy),
            StoryStatus::Done,
            StatusChangeOptions::accepting_warnings(),
        )
        .unwrap();
        assert_eq!(decision, GateDecision::Overridden(vec![testable_issue()]));
    }

    #[test]
    fn clean_finding_passes_without_override() {
        let s = story("s", StoryStatus::ReadyForTest);
        let f = finding(Vec::new());
        let policy = GateConfig::default();
        let decision = evaluate(
            &ctx(&s, &f, &[], &[], &policy),
            StoryStatus::Done,
            StatusChangeOptions::default(),
        )
        .unwrap();
        assert_eq!(decision, GateDecision::Allowed);
    }

    #[test]
    fn children_policy_cannot_be_overridden() {
        let s = story("s", StoryStatus::ReadyForTest);
        let child = story("c", StoryStatus::InProgress);
        let f = finding(Vec::new());
        let policy = GateConfig {
            require_children_done: true,
            require_passing_tests: false,
        };
        let err = evaluate(
            &ctx(&s, &f, &[&child], &[], &policy),
            StoryStatus::Done,
            StatusChangeOptions::accepting_warnings(),
        )
        .unwrap_err();
        assert!(matches!(err, StoryError::StatusBlocked { ref reason, .. } if reason.contains("c")));
    }

    #[test]
    fn passing_tests_policy() {
        let s = story("s", StoryStatus::ReadyForTest);
        let f = finding(Vec::new());
        let policy = GateConfig {
            require_children_done: false,
            require_passing_tests: true,
        };
        assert!(evaluate(
            &ctx(&s, &f, &[], &[], &policy),
            StoryStatus::Done,
            StatusChangeOptions::default()
        )
        .is_err());

        let passed = passed_test();
        assert!(evaluate(
            &ctx(&s, &f, &[], &[&passed], &policy),
            StoryStatus::Done,
            StatusChangeOptions::default()
        )
        .is_ok());
    }
}
