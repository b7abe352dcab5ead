//! Reacts to in-place rewrites of the page.
//!
//! Two markers matter. A *detail container* appearing means a new item was
//! swapped in; an *overlay* appearing means a panel now hosts every later swap.
//! Once the overlay is seen the watcher narrows its observation to it, so
//! unrelated churn elsewhere in the page is ignored from then on.

use artmark_logging::artmark_debug;
use ego_tree::NodeId;
use serde::Deserialize;

use crate::dom::{Document, MutationRecord};
use crate::selectors::Query;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRules {
    /// Selector-table name of the stable ancestor observed first.
    pub content: String,
    pub detail_marker: Query,
    #[serde(default)]
    pub overlay_marker: Option<Query>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Unarmed,
    Page { root: NodeId },
    Overlay { root: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSignal {
    DetailReplaced,
    OverlayOpened { overlay: NodeId },
}

#[derive(Debug, Clone)]
pub struct MutationWatcher {
    rules: WatchRules,
    phase: WatchPhase,
}

impl MutationWatcher {
    pub fn new(rules: WatchRules) -> Self {
        Self {
            rules,
            phase: WatchPhase::Unarmed,
        }
    }

    pub fn rules(&self) -> &WatchRules {
        &self.rules
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn observed_root(&self) -> Option<NodeId> {
        match self.phase {
            WatchPhase::Unarmed => None,
            WatchPhase::Page { root } | WatchPhase::Overlay { root } => Some(root),
        }
    }

    /// Start observing `root`. An overlay already under it is adopted directly.
    pub fn arm(&mut self, doc: &Document, root: NodeId) {
        let existing = self
            .rules
            .overlay_marker
            .as_ref()
            .and_then(|marker| marked_within(doc, root, marker));
        self.phase = match existing {
            Some(overlay) => WatchPhase::Overlay { root: overlay },
            None => WatchPhase::Page { root },
        };
        artmark_debug!("mutation watcher armed: {:?}", self.phase);
    }

    /// Fold one batch into at most one signal, rewiring when an overlay opens.
    ///
    /// An overlay and a detail container arriving in the same batch yield a
    /// single `OverlayOpened`: the reset it triggers covers the new detail too.
    pub fn process(&mut self, doc: &Document, batch: &[MutationRecord]) -> Option<WatchSignal> {
        let root = self.observed_root()?;
        let added: Vec<NodeId> = batch
            .iter()
            .filter(|record| doc.contains(root, record.target))
            .flat_map(|record| record.added.iter().copied())
            .collect();
        if added.is_empty() {
            return None;
        }

        let detail_appeared = || {
            added
                .iter()
                .any(|&node| marked_within(doc, node, &self.rules.detail_marker).is_some())
        };

        match (self.phase, &self.rules.overlay_marker) {
            (WatchPhase::Page { .. }, Some(marker)) => {
                let overlay = added
                    .iter()
                    .find_map(|&node| marked_within(doc, node, marker))?;
                self.phase = WatchPhase::Overlay { root: overlay };
                artmark_debug!("overlay {overlay:?} opened; observation narrowed");
                Some(WatchSignal::OverlayOpened { overlay })
            }
            (WatchPhase::Page { .. }, None) | (WatchPhase::Overlay { .. }, _) => {
                detail_appeared().then_some(WatchSignal::DetailReplaced)
            }
            (WatchPhase::Unarmed, _) => None,
        }
    }
}

/// `node` itself or its first descendant matching `marker`.
fn marked_within(doc: &Document, node: NodeId, marker: &Query) -> Option<NodeId> {
    let element = doc.element(node)?;
    if marker.matches(&element) {
        return Some(node);
    }
    element.select(marker.selector()).next().map(|el| el.id())
}
