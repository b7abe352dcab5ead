use artmark_logging::artmark_debug;
use ego_tree::NodeId;
use serde::Deserialize;

use crate::dom::Document;
use crate::identity::IdentityPattern;
use crate::selectors::Query;
use crate::services::Renderer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkScope {
    #[default]
    Document,
    /// The detail container when present, the whole document otherwise.
    Detail,
}

/// Where thumbnail anchors live and how far up the marked box sits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkingRule {
    pub query: Query,
    #[serde(default, alias = "depth")]
    pub ancestor_depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MarkingRules {
    #[serde(default)]
    pub scope: MarkScope,
    #[serde(default)]
    pub targets: Vec<MarkingRule>,
    /// Opaque to the engine; handed to the renderer as-is.
    #[serde(default)]
    pub method: Option<String>,
}

/// One box to decorate: `node` is the ancestor of the matched `anchor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkTarget {
    pub node: NodeId,
    pub anchor: NodeId,
    pub item_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkReport {
    pub examined: usize,
    pub marked: usize,
}

/// Every anchor under `scope` matched by a rule, paired with the identifier of
/// its link and the box to mark. Anchors without an identifier or without
/// enough ancestors are left out.
pub fn collect_targets(
    doc: &Document,
    scope: Option<NodeId>,
    rules: &MarkingRules,
    identity: &IdentityPattern,
) -> (usize, Vec<MarkTarget>) {
    let mut examined = 0;
    let mut targets = Vec::new();

    for rule in &rules.targets {
        let anchors = doc.query_all(scope, rule.query.selector());
        if anchors.is_empty() {
            artmark_debug!("marking rule `{}` matched nothing", rule.query.as_str());
            continue;
        }
        for anchor in anchors {
            examined += 1;
            let Some(item_id) = anchor
                .value()
                .attr("href")
                .and_then(|href| doc.absolute_url(href))
                .and_then(|href| identity.identify(&href))
            else {
                continue;
            };
            let Some(node) = doc.ancestor(anchor.id(), rule.ancestor_depth) else {
                continue;
            };
            targets.push(MarkTarget {
                node: node.id(),
                anchor: anchor.id(),
                item_id,
            });
        }
    }

    (examined, targets)
}

/// Apply the configured mark to every target whose item is already processed.
///
/// Calling this again with the same document and processed set hands the renderer
/// the same targets; the renderer recognises what it already marked.
pub fn mark(
    doc: &Document,
    scope: Option<NodeId>,
    rules: &MarkingRules,
    identity: &IdentityPattern,
    mut is_processed: impl FnMut(&str) -> bool,
    renderer: &dyn Renderer,
) -> MarkReport {
    let (examined, targets) = collect_targets(doc, scope, rules, identity);
    let mut marked = 0;
    for target in targets {
        if is_processed(&target.item_id) {
            renderer.apply_mark(&target, rules.method.as_deref());
            marked += 1;
        }
    }
    MarkReport { examined, marked }
}
