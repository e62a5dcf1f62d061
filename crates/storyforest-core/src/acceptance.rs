//! Given/When/Then acceptance tests attached to a story.
//!
//! Step structure is enforced on every write. Wording quality (ambiguous
//! terms, unmeasurable outcomes) is reported as advisory warnings only.

use crate::error::{Result, StoryError};
use crate::merge_request::non_blank;
use crate::types::TestStatus;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// AcceptanceTest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceTest {
    pub id: String,
    pub story_id: String,
    pub title: String,
    pub given: Vec<String>,
    pub when: Vec<String>,
    pub then: Vec<String>,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<TestRun>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub measurability_warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub at: DateTime<Utc>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAcceptanceTest {
    #[serde(default)]
    pub title: Option<String>,
    pub given: Vec<String>,
    pub when: Vec<String>,
    pub then: Vec<String>,
    #[serde(default)]
    pub status: TestStatus,
    /// Save despite measurability warnings when writes are enforced.
    #[serde(default)]
    pub accept_warnings: bool,
}

impl NewAcceptanceTest {
    pub fn new(given: Vec<String>, when: Vec<String>, then: Vec<String>) -> Self {
        Self {
            given,
            when,
            then,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_steps(&self.given, &self.when, &self.then)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcceptanceTestPatch {
    pub title: Option<String>,
    pub given: Option<Vec<String>>,
    pub when: Option<Vec<String>>,
    pub then: Option<Vec<String>>,
    #[serde(default)]
    pub accept_warnings: bool,
}

impl AcceptanceTest {
    pub fn new(id: impl Into<String>, story_id: impl Into<String>, input: NewAcceptanceTest) -> Self {
        let now = Utc::now();
        let given = trim_steps(input.given);
        let when = trim_steps(input.when);
        let then = trim_steps(input.then);
        let title = non_blank(input.title).unwrap_or_else(|| default_title(&then));
        let measurability_warnings = advisories(&given, &when, &then);
        Self {
            id: id.into(),
            story_id: story_id.into(),
            title,
            given,
            when,
            then,
            status: input.status,
            last_run: None,
            measurability_warnings,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: AcceptanceTestPatch) -> Result<()> {
        let given = patch.given.map(trim_steps).unwrap_or_else(|| self.given.clone());
        let when = patch.when.map(trim_steps).unwrap_or_else(|| self.when.clone());
        let then = patch.then.map(trim_steps).unwrap_or_else(|| self.then.clone());
        validate_steps(&given, &when, &then)?;

        if let Some(title) = non_blank(patch.title) {
            self.title = title;
        }
        self.measurability_warnings = advisories(&given, &when, &then);
        self.given = given;
        self.when = when;
        self.then = then;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True when any of the three step sequences is empty. Stored tests are
    /// validated on write, but hand-edited forests can still carry these.
    pub fn has_empty_section(&self) -> bool {
        self.given.is_empty() || self.when.is_empty() || self.then.is_empty()
    }

    pub fn record_run(&mut self, passed: bool, notes: Option<String>) {
        let now = Utc::now();
        self.last_run = Some(TestRun {
            at: now,
            passed,
            notes: non_blank(notes),
        });
        if passed {
            self.status = TestStatus::Passed;
        } else if self.status == TestStatus::Passed {
            self.status = TestStatus::Ready;
        }
        self.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Step validation
// ---------------------------------------------------------------------------

/// Each of given/when/then must hold at least one step and no step may be blank.
pub fn validate_steps(given: &[String], when: &[String], then: &[String]) -> Result<()> {
    validate_sequence("given", given)?;
    validate_sequence("when", when)?;
    validate_sequence("then", then)
}

fn validate_sequence(field: &str, steps: &[String]) -> Result<()> {
    if steps.is_empty() {
        return Err(StoryError::invalid_test(
            field,
            "must contain at least one step",
        ));
    }
    if let Some(index) = steps.iter().position(|s| s.trim().is_empty()) {
        return Err(StoryError::invalid_test(
            format!("{field}[{index}]"),
            "step must not be blank",
        ));
    }
    Ok(())
}

fn trim_steps(steps: Vec<String>) -> Vec<String> {
    steps.into_iter().map(|s| s.trim().to_string()).collect()
}

fn default_title(then: &[String]) -> String {
    let first = then.first().map(String::as_str).unwrap_or("Acceptance test");
    let stripped = first
        .strip_prefix("Then ")
        .or_else(|| first.strip_prefix("then "))
        .unwrap_or(first);
    let mut chars = stripped.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => "Acceptance test".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Advisory wording checks
// ---------------------------------------------------------------------------

const AMBIGUOUS_TERMS: &[&str] = &[
    "optimize",
    "quickly",
    "soon",
    "some",
    "about",
    "approximately",
    "should",
    "maybe",
    "asap",
    "etc",
];

fn ambiguous_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = AMBIGUOUS_TERMS.join("|");
        Regex::new(&format!(r"(?i)\b({alternation})\b")).expect("static regex")
    })
}

fn quantified_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\d+(?:\.\d+)?\s*%|\b\d+(?:\.\d+)?\s*(ms|milliseconds?|s|sec|seconds?|m|min|minutes?|h|hr|hours?|days?|percent|kb|kilobytes?|mb|megabytes?|gb|gigabytes?|px|users?|transactions?|requests?|items?|times?)\b",
        )
        .expect("static regex")
    })
}

fn observable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(display(s|ed)?|show(s|n)?|visible|see[s]?|return(s|ed)?|receive[sd]?|redirect(s|ed)?|sav(e|es|ed)|creat(e|es|ed)|sen[dt]s?|appear(s)?|contain(s)?|equal(s)?|remain(s)?|meet(s)?|reject(s|ed)?|error message|status)\b",
        )
        .expect("static regex")
    })
}

/// Wording warnings for a test's steps. They block a write only when
/// `quality.enforce_on_write` is set and the caller does not accept them.
pub fn advisories(given: &[String], when: &[String], then: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();
    for (field, steps) in [("given", given), ("when", when), ("then", then)] {
        for (index, step) in steps.iter().enumerate() {
            for m in ambiguous_re().find_iter(step) {
                warnings.push(format!(
                    "{field}[{index}]: ambiguous term \"{}\"",
                    m.as_str().to_lowercase()
                ));
            }
        }
    }
    for (index, step) in then.iter().enumerate() {
        if !is_measurable(step) {
            warnings.push(format!(
                "then[{index}]: outcome is not measurable; state a number with a unit or an observable result"
            ));
        }
    }
    warnings
}

/// A `then` step is measurable when it quantifies the outcome or names an
/// observable effect.
pub fn is_measurable(step: &str) -> bool {
    quantified_re().is_match(step) || observable_re().is_match(step)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn login_test() -> NewAcceptanceTest {
        NewAcceptanceTest::new(
            steps(&["Given a registered user"]),
            steps(&["When they submit valid credentials"]),
            steps(&["Then the dashboard is displayed within 2 seconds"]),
        )
    }

    #[test]
    fn empty_sequence_is_rejected_with_field() {
        let mut input = login_test();
        input.when.clear();
        let err = input.validate().unwrap_err();
        assert!(matches!(
            err,
            StoryError::InvalidAcceptanceTest { ref field, .. } if field == "when"
        ));
    }

    #[test]
    fn blank_step_is_rejected_with_index() {
        let mut input = login_test();
        input.then.push("   ".into());
        let err = input.validate().unwrap_err();
        assert!(matches!(
            err,
            StoryError::InvalidAcceptanceTest { ref field, .. } if field == "then[1]"
        ));
    }

    #[test]
    fn title_defaults_from_first_outcome() {
        let t = AcceptanceTest::new("test-1", "story-1", login_test());
        assert_eq!(t.title, "The dashboard is displayed within 2 seconds");
        assert_eq!(t.status, TestStatus::Draft);
        assert!(t.measurability_warnings.is_empty());
    }

    #[test]
    fn vague_outcome_gets_advisories() {
        let input = NewAcceptanceTest::new(
            steps(&["Given some data"]),
            steps(&["When the page loads"]),
            steps(&["Then it is fast enough"]),
        );
        let t = AcceptanceTest::new("test-1", "story-1", input);
        assert!(t
            .measurability_warnings
            .iter()
            .any(|w| w.contains("ambiguous term \"some\"")));
        assert!(t
            .measurability_warnings
            .iter()
            .any(|w| w.starts_with("then[0]: outcome is not measurable")));
    }

    #[test]
    fn ambiguity_matches_whole_words_only() {
        let warnings = advisories(
            &steps(&["Given something awesome"]),
            &steps(&["When it runs"]),
            &steps(&["Then 3 items are shown"]),
        );
        assert!(warnings.is_empty(), "unexpected: {warnings:?}");
    }

    #[test]
    fn measurability_accepts_units_and_observable_outcomes() {
        assert!(is_measurable("Then the response arrives in 200ms"));
        assert!(is_measurable("Then 95% of uploads succeed"));
        assert!(is_measurable("Then a confirmation banner is displayed"));
        assert!(!is_measurable("Then everything is nice"));
    }

    #[test]
    fn patch_revalidates_and_refreshes_warnings() {
        let mut t = AcceptanceTest::new("test-1", "story-1", login_test());
        let err = t
            .apply(AcceptanceTestPatch {
                given: Some(Vec::new()),
                ..AcceptanceTestPatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoryError::InvalidAcceptanceTest { .. }));
        assert_eq!(t.given, steps(&["Given a registered user"]));

        t.apply(AcceptanceTestPatch {
            then: Some(steps(&["Then it works"])),
            ..AcceptanceTestPatch::default()
        })
        .unwrap();
        assert_eq!(t.measurability_warnings.len(), 1);
    }

    #[test]
    fn record_run_moves_status() {
        let mut t = AcceptanceTest::new("test-1", "story-1", login_test());
        t.record_run(true, Some("ci #12".into()));
        assert_eq!(t.status, TestStatus::Passed);
        t.record_run(false, None);
        assert_eq!(t.status, TestStatus::Ready);
        let run = t.last_run.as_ref().unwrap();
        assert!(!run.passed);
        assert!(run.notes.is_none());
    }
}
