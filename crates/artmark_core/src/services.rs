//! Collaborators the engine calls but does not implement: the processed-item
//! store and the renderer that owns every visual side effect.

use std::collections::HashSet;
use std::sync::RwLock;

use ego_tree::NodeId;
use serde::Deserialize;

use crate::context::ExtractionContext;
use crate::marking::MarkTarget;

pub trait ProcessedStore: Send + Sync {
    fn is_processed(&self, id: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionKind {
    /// Clicking the image opens the viewer or starts a download.
    ViewerTrigger,
    /// Expand a collapsed caption after a delay.
    OpenCaption,
}

pub trait Renderer: Send + Sync {
    fn apply_mark(&self, target: &MarkTarget, method: Option<&str>);
    fn show_downloaded_indicator(&self, context: &ExtractionContext);
    fn wire_interaction(&self, node: NodeId, kind: InteractionKind);
}

/// In-memory store, enough for probes and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ids: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: impl Into<String>) {
        if let Ok(mut ids) = self.ids.write() {
            ids.insert(id.into());
        }
    }
}

impl<S: Into<String>> FromIterator<S> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: RwLock::new(iter.into_iter().map(Into::into).collect()),
        }
    }
}

impl ProcessedStore for MemoryStore {
    fn is_processed(&self, id: &str) -> bool {
        self.ids.read().map(|ids| ids.contains(id)).unwrap_or(false)
    }
}
