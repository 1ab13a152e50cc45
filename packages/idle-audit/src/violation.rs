//! Audit result model
//!
//! Shapes follow the JSON emitted by axe-core's v2 reporter, so engines that
//! shell out to a JavaScript runtime can hand back the raw result string.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Severity of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Minor => "minor",
            Impact::Moderate => "moderate",
            Impact::Serious => "serious",
            Impact::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine output for one audited subtree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// One failing rule and the elements it failed on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(rename = "id")]
    pub rule_id: String,
    #[serde(default)]
    pub impact: Option<Impact>,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub help_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<AffectedNode>,
}

impl Violation {
    pub fn new(rule_id: impl Into<String>, impact: Option<Impact>) -> Self {
        Self {
            rule_id: rule_id.into(),
            impact,
            help: String::new(),
            help_url: String::new(),
            description: String::new(),
            tags: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn with_help(mut self, help: impl Into<String>, help_url: impl Into<String>) -> Self {
        self.help = help.into();
        self.help_url = help_url.into();
        self
    }

    pub fn with_node(mut self, node: AffectedNode) -> Self {
        self.nodes.push(node);
        self
    }
}

/// Which check list of an affected node a message comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// At least one of these checks had to pass
    Any,
    /// Every one of these checks had to pass
    All,
    /// None of these checks may pass
    None,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Any => "any",
            CheckKind::All => "all",
            CheckKind::None => "none",
        }
    }
}

/// An element a violation applies to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedNode {
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub impact: Option<Impact>,
    #[serde(default)]
    pub any: Vec<CheckResult>,
    #[serde(default)]
    pub all: Vec<CheckResult>,
    #[serde(default)]
    pub none: Vec<CheckResult>,
    #[serde(default)]
    pub failure_summary: Option<String>,
}

impl AffectedNode {
    pub fn new(target: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            target: vec![target.into()],
            html: html.into(),
            ..Default::default()
        }
    }

    /// Selector path joined the way incident keys expect it
    pub fn locator(&self) -> String {
        self.target.join(",")
    }

    pub fn checks(&self, kind: CheckKind) -> &[CheckResult] {
        match kind {
            CheckKind::Any => &self.any,
            CheckKind::All => &self.all,
            CheckKind::None => &self.none,
        }
    }

    /// Failure text for one check list, empty when the list has no failures
    pub fn failure_message(&self, kind: CheckKind) -> String {
        let messages: Vec<&str> = self
            .checks(kind)
            .iter()
            .map(|check| check.message.as_str())
            .filter(|message| !message.is_empty())
            .collect();

        if messages.is_empty() {
            return String::new();
        }

        let heading = match kind {
            CheckKind::Any => "Fix any of the following:",
            CheckKind::All => "Fix all of the following:",
            CheckKind::None => "Fix all of the following:",
        };

        let mut out = String::from(heading);
        for message in messages {
            out.push_str("\n  ");
            out.push_str(message);
        }
        out
    }

    /// Related nodes across every check list of `kind`
    pub fn related_nodes(&self, kind: CheckKind) -> Vec<&RelatedNode> {
        self.checks(kind)
            .iter()
            .flat_map(|check| check.related_nodes.iter())
            .collect()
    }
}

/// Outcome of a single rule check on a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub id: String,
    #[serde(default)]
    pub impact: Option<Impact>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub related_nodes: Vec<RelatedNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedNode {
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub html: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const AXE_JSON: &str = r##"{
        "violations": [{
            "id": "image-alt",
            "impact": "critical",
            "help": "Images must have alternate text",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.8/image-alt",
            "tags": ["wcag2a"],
            "nodes": [{
                "target": ["#hero", "img"],
                "html": "<img src=\"a.png\">",
                "impact": "critical",
                "any": [{"id": "has-alt", "message": "Element does not have an alt attribute"}],
                "all": [],
                "none": [{
                    "id": "presentational",
                    "message": "Element's default semantics were not overridden",
                    "relatedNodes": [{"target": ["#hero"], "html": "<div id=\"hero\">"}]
                }],
                "failureSummary": "Fix any of the following"
            }]
        }],
        "passes": []
    }"##;

    #[test]
    fn test_parse_axe_report() {
        let report = AuditReport::from_json(AXE_JSON).unwrap();

        assert_eq!(report.violations.len(), 1);
        let violation = &report.violations[0];
        assert_eq!(violation.rule_id, "image-alt");
        assert_eq!(violation.impact, Some(Impact::Critical));
        assert!(violation.help_url.ends_with("image-alt"));
        assert_eq!(violation.nodes[0].locator(), "#hero,img");
        assert_eq!(violation.nodes[0].none[0].related_nodes.len(), 1);
    }

    #[test]
    fn test_empty_report_is_clean() {
        let report = AuditReport::from_json("{}").unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_impact_ordering() {
        assert!(Impact::Critical > Impact::Serious);
        assert!(Impact::Serious > Impact::Moderate);
        assert!(Impact::Moderate > Impact::Minor);
    }

    #[test]
    fn test_failure_message() {
        let report = AuditReport::from_json(AXE_JSON).unwrap();
        let node = &report.violations[0].nodes[0];

        let any = node.failure_message(CheckKind::Any);
        assert!(any.starts_with("Fix any of the following:"));
        assert!(any.contains("alt attribute"));

        assert_eq!(node.failure_message(CheckKind::All), "");
        assert_eq!(node.related_nodes(CheckKind::None).len(), 1);
    }
}
