//! Violation logging
//!
//! Ready-made consumer for `ChangeAuditor`: renders each new violation as
//! structured `tracing` events, with the level picked from its impact.

use crate::observer::ViolationsCallback;
use crate::violation::{AffectedNode, CheckKind, Impact, Violation};
use std::sync::Arc;
use tracing::{error, info, warn, Level};

/// Log every violation, grouped per rule
pub fn log_violations(violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }

    warn!(count = violations.len(), "New accessibility issues");

    for violation in violations {
        log_violation(violation);
        for node in &violation.nodes {
            log_failure_summary(violation, node, CheckKind::Any);
            log_failure_summary(violation, node, CheckKind::None);
        }
    }
}

/// Callback that forwards new violations to [`log_violations`]
pub fn logging_callback() -> ViolationsCallback {
    Arc::new(|violations| log_violations(&violations))
}

/// Level a violation is logged at
pub fn impact_level(impact: Option<Impact>) -> Level {
    match impact {
        Some(Impact::Critical) => Level::ERROR,
        Some(Impact::Serious) => Level::WARN,
        Some(Impact::Moderate) | Some(Impact::Minor) | None => Level::INFO,
    }
}

fn log_violation(violation: &Violation) {
    let impact = violation.impact.map(|i| i.as_str()).unwrap_or("minor");
    let level = impact_level(violation.impact);
    // Event levels are static per callsite
    if level == Level::ERROR {
        error!(
            rule = %violation.rule_id,
            impact,
            help_url = %violation.help_url,
            "{}",
            violation.help
        );
    } else if level == Level::WARN {
        warn!(
            rule = %violation.rule_id,
            impact,
            help_url = %violation.help_url,
            "{}",
            violation.help
        );
    } else {
        info!(
            rule = %violation.rule_id,
            impact,
            help_url = %violation.help_url,
            "{}",
            violation.help
        );
    }
}

fn log_failure_summary(violation: &Violation, node: &AffectedNode, kind: CheckKind) {
    if node.checks(kind).is_empty() {
        return;
    }

    info!(
        rule = %violation.rule_id,
        selector = %node.locator(),
        html = %node.html,
        checks = kind.as_str(),
        "{}",
        node.failure_message(kind)
    );

    for related in node.related_nodes(kind) {
        info!(
            rule = %violation.rule_id,
            selector = %related.target.join(","),
            html = %related.html,
            "Related node"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{CheckResult, RelatedNode};
    use parking_lot::Mutex;

    fn sample() -> Violation {
        let mut node = AffectedNode::new("#name", "<input id=\"name\">");
        node.any.push(CheckResult {
            id: "explicit-label".to_string(),
            impact: Some(Impact::Critical),
            message: "Form element does not have an explicit <label>".to_string(),
            related_nodes: vec![RelatedNode {
                target: vec!["form".to_string()],
                html: "<form>".to_string(),
            }],
        });

        Violation::new("label", Some(Impact::Critical))
            .with_help(
                "Form elements must have labels",
                "https://dequeuniversity.com/rules/axe/4.8/label",
            )
            .with_node(node)
    }

    /// Collects formatted log output in memory
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a capturing subscriber; one string per event
    fn capture(f: impl FnOnce()) -> Vec<String> {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(Level::TRACE)
            .finish();

        tracing::subscriber::with_default(subscriber, f);

        // Multi-line messages continue on lines that don't start with a level
        let output = String::from_utf8_lossy(&captured.0.lock()).into_owned();
        let mut events: Vec<String> = Vec::new();
        for line in output.lines() {
            let starts_event = ["TRACE ", "DEBUG ", "INFO ", "WARN ", "ERROR "]
                .iter()
                .any(|level| line.trim_start().starts_with(level));
            match events.last_mut() {
                Some(event) if !starts_event => {
                    event.push('\n');
                    event.push_str(line);
                }
                _ => events.push(line.to_string()),
            }
        }
        events
    }

    fn event_with<'a>(events: &'a [String], text: &str) -> &'a str {
        events
            .iter()
            .find(|event| event.contains(text))
            .unwrap_or_else(|| panic!("no event contains {:?} in {:#?}", text, events))
    }

    #[test]
    fn test_impact_level() {
        assert_eq!(impact_level(Some(Impact::Critical)), Level::ERROR);
        assert_eq!(impact_level(Some(Impact::Serious)), Level::WARN);
        assert_eq!(impact_level(Some(Impact::Moderate)), Level::INFO);
        assert_eq!(impact_level(Some(Impact::Minor)), Level::INFO);
        assert_eq!(impact_level(None), Level::INFO);
    }

    #[test]
    fn test_violation_logged_at_impact_level() {
        let mut violations = Vec::new();
        for (impact, help) in [
            (Some(Impact::Critical), "critical help"),
            (Some(Impact::Serious), "serious help"),
            (Some(Impact::Moderate), "moderate help"),
            (None, "unrated help"),
        ] {
            let mut violation = sample();
            violation.impact = impact;
            violation.help = help.to_string();
            violations.push(violation);
        }

        let events = capture(|| log_violations(&violations));

        let header = event_with(&events, "New accessibility issues");
        assert!(header.contains("WARN"));
        assert!(header.contains("count=4"));

        let critical = event_with(&events, "critical help");
        assert!(critical.contains("ERROR"));
        assert!(critical.contains("rule=label"));
        assert!(critical.contains("critical"));
        assert!(critical.contains("help_url=https://dequeuniversity.com/rules/axe/4.8/label"));

        assert!(event_with(&events, "serious help").contains("WARN"));
        assert!(event_with(&events, "moderate help").contains("INFO"));
        let unrated = event_with(&events, "unrated help");
        assert!(unrated.contains("INFO"));
        assert!(unrated.contains("minor"));
    }

    #[test]
    fn test_failure_summary_lists_checks_and_related_nodes() {
        let events = capture(|| log_violations(&[sample()]));

        let summary = event_with(&events, "Form element does not have an explicit <label>");
        assert!(summary.contains("INFO"));
        assert!(summary.contains("selector=#name"));
        assert!(summary.contains("checks"));
        assert!(summary.contains("any"));

        let related = event_with(&events, "Related node");
        assert!(related.contains("INFO"));
        assert!(related.contains("selector=form"));
        assert!(related.contains("html=<form>"));

        // No `none` checks on the node, so no second summary
        let summaries = events
            .iter()
            .filter(|event| event.contains("explicit <label>"))
            .count();
        assert_eq!(summaries, 1);
    }

    #[test]
    fn test_none_check_summary_is_logged() {
        let mut node = AffectedNode::new("#logo", "<img id=\"logo\">");
        node.none.push(CheckResult {
            id: "alt-space-value".to_string(),
            impact: Some(Impact::Serious),
            message: "Element has an alt attribute made of whitespace".to_string(),
            related_nodes: Vec::new(),
        });
        let violation = Violation::new("image-alt", Some(Impact::Serious)).with_node(node);

        let events = capture(|| log_violations(&[violation]));

        let summary = event_with(&events, "made of whitespace");
        assert!(summary.contains("selector=#logo"));
        assert!(summary.contains("none"));
        assert!(!events.iter().any(|event| event.contains("Related node")));
    }

    #[test]
    fn test_empty_batch_logs_nothing() {
        let events = capture(|| log_violations(&[]));
        assert!(events.is_empty());
    }

    #[test]
    fn test_logging_callback_forwards_to_log() {
        let callback = logging_callback();
        let events = capture(|| callback(vec![sample()]));

        assert!(event_with(&events, "Form elements must have labels").contains("ERROR"));
        assert!(event_with(&events, "New accessibility issues").contains("count=1"));
    }
}
