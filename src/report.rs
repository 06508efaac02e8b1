//! Loading exported issue-search pages from the analysis server.
//!
//! Each page is the JSON body of an issue search response. Only the fields
//! needed to build directives are read; everything else is ignored.

use crate::directive::{DirectiveError, DirectiveSet, OffsetConvention, ReportedIssue, SideMarkers};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse report {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse report: {0}")]
    InvalidJson(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct IssuePage {
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssue {
    component: String,
    #[serde(default)]
    rule: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    text_range: Option<TextRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextRange {
    start_line: usize,
    end_line: usize,
    start_offset: usize,
    end_offset: usize,
}

/// Rule key suffix of the analyzer's missing-space rule.
pub const DEFAULT_RULE: &str = ":MissingSpace";

/// Only issues in this status are still waiting for a fix.
const OPEN_STATUS: &str = "OPEN";

/// Filters applied while loading pages.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    /// Strip `<project_key>:` from component keys. Without it, everything up
    /// to the first `:` is stripped.
    pub project_key: Option<String>,
    /// Keep only issues whose rule key ends with this suffix. `None` keeps
    /// every rule.
    pub rule: Option<String>,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            project_key: None,
            rule: Some(DEFAULT_RULE.to_string()),
        }
    }
}

/// Strip the project key from a component key, leaving the file path.
pub fn component_path<'a>(component: &'a str, project_key: Option<&str>) -> &'a str {
    if let Some(rest) = project_key.and_then(|key| {
        component
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix(':'))
    }) {
        return rest;
    }
    match component.split_once(':') {
        Some((_, path)) => path,
        None => component,
    }
}

/// Issues grouped by component path.
#[derive(Debug, Clone, Default)]
pub struct Report {
    filter: ReportFilter,
    components: BTreeMap<String, Vec<ReportedIssue>>,
    skipped: usize,
}

impl Report {
    pub fn new(filter: ReportFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Merge one page of issues.
    pub fn add_page_str(&mut self, json: &str) -> Result<usize, ReportError> {
        let page: IssuePage =
            serde_json::from_str(json).map_err(ReportError::InvalidJson)?;
        Ok(self.add_page(page))
    }

    pub fn add_page_path(&mut self, path: impl AsRef<Path>) -> Result<usize, ReportError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let page: IssuePage = serde_json::from_str(&json).map_err(|source| ReportError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.add_page(page))
    }

    fn add_page(&mut self, page: IssuePage) -> usize {
        let mut added = 0;
        for raw in page.issues {
            let rule_matches = match (&self.filter.rule, &raw.rule) {
                (Some(wanted), Some(rule)) => rule.ends_with(wanted.as_str()),
                _ => true,
            };
            let open = raw.resolution.is_none()
                && raw.status.as_deref().map_or(true, |status| status == OPEN_STATUS);
            let Some(range) = raw.text_range.filter(|_| rule_matches && open) else {
                self.skipped += 1;
                continue;
            };

            let path = component_path(&raw.component, self.filter.project_key.as_deref());
            self.components
                .entry(path.to_string())
                .or_default()
                .push(ReportedIssue {
                    start_line: range.start_line,
                    end_line: range.end_line,
                    start_offset: range.start_offset,
                    end_offset: range.end_offset,
                    message: raw.message,
                });
            added += 1;
        }
        added
    }

    /// Component paths with their issues, sorted by path.
    pub fn components(&self) -> impl Iterator<Item = (&str, &[ReportedIssue])> {
        self.components
            .iter()
            .map(|(path, issues)| (path.as_str(), issues.as_slice()))
    }

    pub fn issues(&self, component: &str) -> &[ReportedIssue] {
        self.components
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Issues dropped by the filter, already closed, or lacking a text range.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Build the directive set for one component.
    pub fn directives(
        &self,
        component: &str,
        markers: &SideMarkers,
        convention: OffsetConvention,
    ) -> Result<DirectiveSet, DirectiveError> {
        DirectiveSet::from_issues(self.issues(component), markers, convention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Side;

    const PAGE: &str = r#"{
        "total": 4,
        "p": 1,
        "ps": 500,
        "issues": [
            {
                "key": "AX1",
                "rule": "xml:MissingSpace",
                "component": "proj:db/forms/main.xml",
                "message": "Добавьте пробел справа",
                "textRange": {"startLine": 3, "endLine": 3, "startOffset": 7, "endOffset": 8}
            },
            {
                "key": "AX2",
                "rule": "xml:MissingSpace",
                "component": "proj:db/forms/main.xml",
                "message": "Добавьте пробел слева",
                "textRange": {"startLine": 1, "endLine": 1, "startOffset": 0, "endOffset": 1}
            },
            {
                "key": "AX3",
                "rule": "xml:LineTooLong",
                "component": "proj:db/other.xml",
                "message": "Line too long",
                "textRange": {"startLine": 1, "endLine": 1, "startOffset": 0, "endOffset": 200}
            },
            {
                "key": "AX4",
                "rule": "xml:MissingSpace",
                "component": "proj:db/other.xml",
                "message": "File-level issue"
            }
        ]
    }"#;

    #[test]
    fn test_component_path() {
        assert_eq!(component_path("proj:a/b.xml", Some("proj")), "a/b.xml");
        assert_eq!(component_path("my:proj:a.xml", Some("my:proj")), "a.xml");
        assert_eq!(component_path("proj:a/b.xml", None), "a/b.xml");
        assert_eq!(component_path("a/b.xml", None), "a/b.xml");
    }

    fn keep_all_rules() -> ReportFilter {
        ReportFilter {
            project_key: None,
            rule: None,
        }
    }

    #[test]
    fn test_add_page_groups_by_component() {
        let mut report = Report::new(keep_all_rules());
        let added = report.add_page_str(PAGE).unwrap();

        assert_eq!(added, 3);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.len(), 2);
        assert_eq!(report.issues("db/forms/main.xml").len(), 2);
        assert!(report.issues("missing.xml").is_empty());
    }

    #[test]
    fn test_default_filter_keeps_only_missing_space() {
        let mut report = Report::new(ReportFilter::default());
        report
            .add_page_str(
                r#"{"issues": [
                    {"rule": "bsl:MissingSpace", "component": "p:Module.bsl",
                     "message": "Добавьте пробел справа",
                     "textRange": {"startLine": 1, "endLine": 1, "startOffset": 1, "endOffset": 1}},
                    {"rule": "bsl:LineLength", "component": "p:Module.bsl",
                     "message": "Line too long",
                     "textRange": {"startLine": 2, "endLine": 2, "startOffset": 0, "endOffset": 120}}
                ]}"#,
            )
            .unwrap();

        assert_eq!(report.skipped(), 1);
        let set = report
            .directives("Module.bsl", &SideMarkers::default(), OffsetConvention::default())
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().line, 1);
    }

    #[test]
    fn test_only_open_issues_are_kept() {
        let mut report = Report::new(ReportFilter::default());
        report
            .add_page_str(
                r#"{"issues": [
                    {"component": "p:a.xml", "message": "слева", "status": "OPEN",
                     "textRange": {"startLine": 1, "endLine": 1, "startOffset": 0, "endOffset": 0}},
                    {"component": "p:a.xml", "message": "слева", "status": "CLOSED",
                     "textRange": {"startLine": 2, "endLine": 2, "startOffset": 0, "endOffset": 0}},
                    {"component": "p:a.xml", "message": "справа",
                     "textRange": {"startLine": 3, "endLine": 3, "startOffset": 0, "endOffset": 0}}
                ]}"#,
            )
            .unwrap();

        let lines: Vec<usize> = report.issues("a.xml").iter().map(|i| i.start_line).collect();
        assert_eq!(lines, vec![1, 3]);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn test_default_convention_uses_reported_ends_as_given() {
        let mut report = Report::new(ReportFilter::default());
        report
            .add_page_str(
                r#"{"issues": [
                    {"rule": "bsl:MissingSpace", "component": "p:Module.bsl",
                     "message": "Добавьте пробел слева и справа",
                     "textRange": {"startLine": 1, "endLine": 1, "startOffset": 3, "endOffset": 3}},
                    {"rule": "bsl:MissingSpace", "component": "p:Module.bsl",
                     "message": "Добавьте пробел справа",
                     "textRange": {"startLine": 2, "endLine": 2, "startOffset": 1, "endOffset": 1}}
                ]}"#,
            )
            .unwrap();

        let set = report
            .directives("Module.bsl", &SideMarkers::default(), OffsetConvention::default())
            .unwrap();
        let mut out = Vec::new();
        crate::rewrite::rewrite(&b"foo(bar)
a,b
"[..], &mut out, Vec::new(), &set).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "foo ( bar)
a, b
");
    }

    #[test]
    fn test_rule_filter() {
        let mut report = Report::new(ReportFilter {
            project_key: Some("proj".to_string()),
            rule: Some(":MissingSpace".to_string()),
        });
        report.add_page_str(PAGE).unwrap();

        let paths: Vec<_> = report.components().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["db/forms/main.xml"]);
        assert_eq!(report.skipped(), 2);
    }

    #[test]
    fn test_resolved_issues_are_skipped() {
        let mut report = Report::new(ReportFilter::default());
        report
            .add_page_str(
                r#"{"issues": [{"component": "p:a.xml", "message": "слева", "resolution": "FIXED",
                    "textRange": {"startLine": 1, "endLine": 1, "startOffset": 0, "endOffset": 1}}]}"#,
            )
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn test_directives_for_component() {
        let mut report = Report::new(keep_all_rules());
        report.add_page_str(PAGE).unwrap();

        let set = report
            .directives(
                "db/forms/main.xml",
                &SideMarkers::default(),
                OffsetConvention::Exclusive,
            )
            .unwrap();
        let directives: Vec<_> = set.iter().copied().collect();
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].line, 1);
        assert_eq!(directives[0].side, Side::Before);
        assert_eq!(directives[1].line, 3);
        assert_eq!(directives[1].side, Side::After);
        assert_eq!(directives[1].end_offset, 7);
    }

    #[test]
    fn test_invalid_json() {
        let mut report = Report::new(keep_all_rules());
        let err = report.add_page_str("{not json").unwrap_err();
        assert!(matches!(err, ReportError::InvalidJson(_)));
    }
}
