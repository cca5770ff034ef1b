// diag.rs — Validation issue model
//
// Provides the issue types every constraint reports into. Constraints never
// fail on bad graph data; they build a `ValidationIssue` and hand it to the
// shared `ValidationIssueCollector`. `LoomValidationError` wraps the final
// issue list when validation is asked to fail.
//
// Preconditions: none (types only).
// Postconditions: collectors keep issues in insertion order.
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ── Issue type ───────────────────────────────────────────────────────────

/// Stable issue category. The serialized names are part of the report
/// format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    NodeValidationError,
    NodeReferenceError,
    ReferenceCycleError,
    NodeSchemaError,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::NodeValidationError => "NodeValidationError",
            IssueType::NodeReferenceError => "NodeReferenceError",
            IssueType::ReferenceCycleError => "ReferenceCycleError",
            IssueType::NodeSchemaError => "NodeSchemaError",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Context ──────────────────────────────────────────────────────────────

/// A named piece of supporting evidence attached to an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Context {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jsonpath: None,
            data: None,
            message: None,
        }
    }

    pub fn with_jsonpath(mut self, jsonpath: impl Into<String>) -> Self {
        self.jsonpath = Some(jsonpath.into());
        self
    }

    /// Attach serialized data. Values that fail to serialize are dropped.
    pub fn with_data<T: Serialize + ?Sized>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ── Validation issue ─────────────────────────────────────────────────────

/// One problem found in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub contexts: Vec<Context>,
}

impl ValidationIssue {
    /// Create an issue with no params, message, or contexts.
    pub fn new(issue_type: IssueType, summary: impl Into<String>) -> Self {
        Self {
            issue_type,
            params: BTreeMap::new(),
            summary: summary.into(),
            message: None,
            contexts: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.contexts.push(context);
        self
    }

    pub fn with_contexts(mut self, contexts: impl IntoIterator<Item = Context>) -> Self {
        self.contexts.extend(contexts);
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.issue_type, self.summary)?;
        for (k, v) in &self.params {
            write!(f, "\n  {k}: {v}")?;
        }
        if let Some(message) = &self.message {
            write!(f, "\n  {message}")?;
        }
        Ok(())
    }
}

// ── Collector ────────────────────────────────────────────────────────────

/// Insertion-ordered issue sink shared by every constraint in a pass.
///
/// A collector built with `without_contexts` drops contexts and never runs
/// the context closures handed to `add_issue_with`.
#[derive(Debug, Clone)]
pub struct ValidationIssueCollector {
    issues: Vec<ValidationIssue>,
    keep_contexts: bool,
}

impl Default for ValidationIssueCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationIssueCollector {
    pub fn new() -> Self {
        Self {
            issues: Vec::new(),
            keep_contexts: true,
        }
    }

    pub fn without_contexts() -> Self {
        Self {
            issues: Vec::new(),
            keep_contexts: false,
        }
    }

    pub fn add_issue(&mut self, mut issue: ValidationIssue) {
        if !self.keep_contexts {
            issue.contexts.clear();
        }
        self.issues.push(issue);
    }

    /// Add `issue`, appending the contexts produced by `contexts` if this
    /// collector keeps contexts.
    pub fn add_issue_with<F>(&mut self, issue: ValidationIssue, contexts: F)
    where
        F: FnOnce() -> Vec<Context>,
    {
        if self.keep_contexts {
            self.add_issue(issue.with_contexts(contexts()));
        } else {
            self.add_issue(issue);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    /// Fail with every collected issue, if any.
    pub fn check(self) -> Result<(), LoomValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(LoomValidationError {
                issues: self.issues,
            })
        }
    }
}

// ── Aggregated error ─────────────────────────────────────────────────────

/// Raised by `LoomGraph::validate` when any constraint reported an issue.
#[derive(Debug, Clone, Error)]
#[error("graph validation failed with {} issue(s)", .issues.len())]
pub struct LoomValidationError {
    pub issues: Vec<ValidationIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_issue() {
        let issue = ValidationIssue::new(IssueType::NodeValidationError, "bad dtype")
            .with_param("dtype", "int7")
            .with_message("expected int32");
        assert_eq!(
            issue.to_string(),
            "error[NodeValidationError]: bad dtype\n  dtype: int7\n  expected int32"
        );
    }

    #[test]
    fn builder_chain() {
        let issue = ValidationIssue::new(IssueType::NodeReferenceError, "missing")
            .with_param("nodeId", 7)
            .with_context(Context::new("Reference").with_jsonpath("$.x").with_data(&[1, 2]))
            .with_contexts(vec![Context::new("Other").with_message("note")]);
        assert_eq!(issue.param("nodeId"), Some("7"));
        assert_eq!(issue.contexts.len(), 2);
        assert_eq!(issue.contexts[0].data, Some(serde_json::json!([1, 2])));
    }

    #[test]
    fn collector_keeps_insertion_order() {
        let mut c = ValidationIssueCollector::new();
        c.add_issue(ValidationIssue::new(IssueType::NodeSchemaError, "a"));
        c.add_issue_with(ValidationIssue::new(IssueType::NodeSchemaError, "b"), || {
            vec![Context::new("ctx")]
        });
        let summaries: Vec<&str> = c.issues().iter().map(|i| i.summary.as_str()).collect();
        assert_eq!(summaries, ["a", "b"]);
        assert_eq!(c.issues()[1].contexts.len(), 1);
    }

    #[test]
    fn collector_without_contexts_skips_closures() {
        let mut c = ValidationIssueCollector::without_contexts();
        c.add_issue_with(ValidationIssue::new(IssueType::NodeSchemaError, "a"), || {
            panic!("context closure must not run")
        });
        assert_eq!(c.len(), 1);
        assert!(c.issues()[0].contexts.is_empty());
    }

    #[test]
    fn check_aggregates() {
        assert!(ValidationIssueCollector::new().check().is_ok());
        let mut c = ValidationIssueCollector::new();
        c.add_issue(ValidationIssue::new(IssueType::ReferenceCycleError, "cycle"));
        let err = c.check().unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.to_string(), "graph validation failed with 1 issue(s)");
    }

    #[test]
    fn json_form() {
        let issue = ValidationIssue::new(IssueType::NodeValidationError, "s")
            .with_context(Context::new("c"));
        let v = serde_json::to_value(&issue).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "type": "NodeValidationError",
                "params": {},
                "summary": "s",
                "contexts": [{"name": "c"}]
            })
        );
    }
}
