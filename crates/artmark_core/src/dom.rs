use std::sync::LazyLock;

use ego_tree::{NodeId, NodeMut, NodeRef};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("`body` is a valid selector"));

/// Loading progress reported by the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    Loading,
    Interactive,
    Complete,
}

/// One structural change: nodes appended to or detached from `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Records delivered together by the host's change feed, in order.
pub type MutationBatch = Vec<MutationRecord>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0:?} is not part of the document")]
    UnknownNode(NodeId),
    #[error("node {0:?} has no parent to detach from")]
    NoParent(NodeId),
}

/// A live hypermedia document: parsed tree, location and readiness.
///
/// Queries never fail; the host mutates the tree through [`Document::insert_html`]
/// and [`Document::remove`] and forwards the returned records to the watcher.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    location: String,
    ready_state: ReadyState,
}

impl Document {
    /// Parse a finished snapshot; the ready state starts at `Complete`.
    pub fn parse(location: impl Into<String>, source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
            location: location.into(),
            ready_state: ReadyState::Complete,
        }
    }

    pub fn with_ready_state(mut self, state: ReadyState) -> Self {
        self.ready_state = state;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// In-place navigation (history push) changes the location without a reload.
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        self.ready_state = state;
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn body(&self) -> Option<ElementRef<'_>> {
        self.root().select(&BODY).next()
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    /// First descendant of `scope` (or of the document) matching `selector`.
    ///
    /// Document-wide queries walk down from the root element, so detached
    /// subtrees are never matched.
    pub fn query(&self, scope: Option<NodeId>, selector: &Selector) -> Option<ElementRef<'_>> {
        match scope {
            Some(id) => self.element(id)?.select(selector).next(),
            None => self.root().select(selector).next(),
        }
    }

    pub fn query_all(&self, scope: Option<NodeId>, selector: &Selector) -> Vec<ElementRef<'_>> {
        match scope {
            Some(id) => match self.element(id) {
                Some(element) => element.select(selector).collect(),
                None => Vec::new(),
            },
            None => self.root().select(selector).collect(),
        }
    }

    /// True when `node` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return true;
        }
        self.html
            .tree
            .get(node)
            .is_some_and(|n| n.ancestors().any(|a| a.id() == ancestor))
    }

    /// Element `depth` parents above `node`; `depth == 0` is the node itself.
    pub fn ancestor(&self, node: NodeId, depth: usize) -> Option<ElementRef<'_>> {
        let mut current = self.html.tree.get(node)?;
        for _ in 0..depth {
            current = current.parent()?;
        }
        ElementRef::wrap(current)
    }

    /// Resolve an attribute URL the way a browser exposes `element.href`.
    pub fn absolute_url(&self, reference: &str) -> Option<String> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with('#') || lower.starts_with("javascript:") {
            return None;
        }
        if let Ok(url) = Url::parse(trimmed) {
            return Some(url.into());
        }
        Url::parse(&self.location)
            .ok()
            .and_then(|base| base.join(trimmed).ok())
            .map(Into::into)
    }

    /// Append every top-level node of `fragment` under `parent`.
    pub fn insert_html(
        &mut self,
        parent: NodeId,
        fragment: &str,
    ) -> Result<MutationRecord, DomError> {
        let parsed = Html::parse_fragment(fragment);
        let mut target = self
            .html
            .tree
            .get_mut(parent)
            .ok_or(DomError::UnknownNode(parent))?;

        let mut added = Vec::new();
        for child in parsed.root_element().children() {
            let mut inserted = target.append(child.value().clone());
            added.push(inserted.id());
            graft(&mut inserted, child);
        }

        Ok(MutationRecord {
            target: parent,
            added,
            removed: Vec::new(),
        })
    }

    /// Detach `node` (and its subtree) from its parent.
    pub fn remove(&mut self, node: NodeId) -> Result<MutationRecord, DomError> {
        let mut target = self
            .html
            .tree
            .get_mut(node)
            .ok_or(DomError::UnknownNode(node))?;
        let parent = target
            .parent()
            .map(|p| p.id())
            .ok_or(DomError::NoParent(node))?;
        target.detach();

        Ok(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![node],
        })
    }
}

fn graft(dest: &mut NodeMut<'_, Node>, source: NodeRef<'_, Node>) {
    for child in source.children() {
        let mut copy = dest.append(child.value().clone());
        graft(&mut copy, child);
    }
}

/// Concatenated, trimmed text content of an element.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
