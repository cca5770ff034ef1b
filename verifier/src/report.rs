// report.rs — Validation report rendering
//
// A `Report` is the outcome of one validation run: the issue list plus the
// optional fingerprint and coloring requested by the caller. It serializes
// as JSON directly and renders as text through `TextReport`, which shortens
// type URIs with the environment's URL aliases.
//
// Preconditions: none.
// Postconditions: text output lists issues in collector order.
// Failure modes: none (pure formatting).
// Side effects: none.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::diag::ValidationIssue;
use crate::env::Environment;
use crate::traversal::Coloring;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub graph_id: Uuid,
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coloring: Option<Coloring>,
}

impl Report {
    pub fn new(graph_id: Uuid, issues: Vec<ValidationIssue>) -> Self {
        Self {
            graph_id,
            valid: issues.is_empty(),
            issues,
            fingerprint: None,
            coloring: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: String) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_coloring(mut self, coloring: Coloring) -> Self {
        self.coloring = Some(coloring);
        self
    }

    /// Text rendering, aliasing type URIs through `env` when given.
    pub fn text<'a>(&'a self, env: Option<&'a Environment>) -> TextReport<'a> {
        TextReport { report: self, env }
    }
}

pub struct TextReport<'a> {
    report: &'a Report,
    env: Option<&'a Environment>,
}

impl TextReport<'_> {
    fn alias(&self, value: &str) -> String {
        match self.env {
            Some(env) => env.url_alias(value),
            None => value.to_string(),
        }
    }

    fn write_issue(&self, f: &mut fmt::Formatter<'_>, issue: &ValidationIssue) -> fmt::Result {
        write!(f, "error[{}]: {}", issue.issue_type, issue.summary)?;
        for (k, v) in &issue.params {
            write!(f, "\n  {k}: {}", self.alias(v))?;
        }
        if let Some(message) = &issue.message {
            write!(f, "\n  note: {message}")?;
        }
        for context in &issue.contexts {
            write!(f, "\n  --> {}", context.name)?;
            if let Some(path) = &context.jsonpath {
                write!(f, ": {path}")?;
            }
            if let Some(message) = &context.message {
                write!(f, "\n      {message}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        if report.valid {
            writeln!(f, "graph {}: ok", report.graph_id)?;
        } else {
            writeln!(
                f,
                "graph {}: {} issue(s)",
                report.graph_id,
                report.issues.len()
            )?;
            for issue in &report.issues {
                self.write_issue(f, issue)?;
                writeln!(f)?;
            }
        }
        if let Some(fingerprint) = &report.fingerprint {
            writeln!(f, "fingerprint: {fingerprint}")?;
        }
        if let Some(coloring) = &report.coloring {
            writeln!(f, "coloring: {} color(s)", coloring.number_of_colors)?;
            for (color, ids) in coloring.color_classes().iter().enumerate() {
                let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
                writeln!(f, "  {color}: {}", ids.join(", "))?;
            }
        }
        Ok(())
    }
}
