//! Subject and report fixtures

use idle_audit::{
    AffectedNode, AuditReport, Impact, MemoryTree, Subject, SubjectId, SubjectRef, TreeNode,
    Violation,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Free-standing subject with a fixed locator
#[derive(Debug)]
pub struct StaticSubject {
    id: SubjectId,
    locator: String,
    connected: AtomicBool,
}

impl StaticSubject {
    pub fn new(locator: &str) -> Arc<Self> {
        Arc::new(Self {
            id: SubjectId::next(),
            locator: locator.to_string(),
            connected: AtomicBool::new(true),
        })
    }

    pub fn detach(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Subject for StaticSubject {
    fn id(&self) -> SubjectId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn locator(&self) -> String {
        self.locator.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn subject(locator: &str) -> SubjectRef {
    StaticSubject::new(locator)
}

/// One violation of `rule` on every target
pub fn report(rule: &str, targets: &[&str]) -> AuditReport {
    let violation = targets.iter().fold(
        Violation::new(rule, Some(Impact::Serious)).with_help(
            format!("{} must pass", rule),
            format!("https://dequeuniversity.com/rules/axe/4.8/{}", rule),
        ),
        |violation, target| {
            violation.with_node(AffectedNode::new(*target, format!("<div id=\"{}\">", target)))
        },
    );
    AuditReport::new(vec![violation])
}

/// `document > body#page > main#content`
pub fn page() -> (Arc<MemoryTree>, TreeNode, TreeNode) {
    let tree = Arc::new(MemoryTree::new());
    let body = tree.create_element("body");
    let main = tree.create_element("main");
    tree.set_attribute(&body, "id", "page").unwrap();
    tree.set_attribute(&main, "id", "content").unwrap();
    tree.append_child(&tree.document(), &body).unwrap();
    tree.append_child(&body, &main).unwrap();
    (tree, body, main)
}
