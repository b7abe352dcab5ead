//! Named selector tables and the lazily resolved element bundle.
//!
//! Profiles describe their queries as a nested JSON table:
//!
//! ```json
//! { "illust": { "med": { "img": { "s": ".viewbody .captify" } },
//!               "mng": { "imgs": { "ALL": ".viewbody img" } } },
//!   "misc":   { "content": { "s": "body", "doc": true } } }
//! ```
//!
//! which flattens to the names `illust.med.img`, `illust.mng.imgs` and `misc.content`.
//! `s` resolves at most one node, `ALL` every match. `doc` queries the whole
//! document even when a detail container narrows the scope.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use artmark_logging::artmark_debug;
use ego_tree::NodeId;
use scraper::{ElementRef, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::dom::Document;
use crate::error::ConfigError;

/// A CSS query compiled once when the profile loads.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Query {
    raw: String,
    selector: Selector,
}

impl Query {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::parse_for("query", raw)
    }

    fn parse_for(key: &str, raw: &str) -> Result<Self, ConfigError> {
        let selector = Selector::parse(raw).map_err(|err| ConfigError::InvalidSelector {
            key: key.to_string(),
            query: raw.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn matches(&self, element: &ElementRef<'_>) -> bool {
        self.selector.matches(element)
    }
}

impl TryFrom<String> for Query {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Query {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSpec {
    pub query: String,
    pub many: bool,
    pub document_scoped: bool,
}

impl SelectorSpec {
    pub fn single(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            many: false,
            document_scoped: false,
        }
    }

    pub fn all(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            many: true,
            document_scoped: false,
        }
    }

    pub fn document_scoped(mut self) -> Self {
        self.document_scoped = true;
        self
    }
}

/// Flat `name -> spec` table. The base table of a profile is never mutated;
/// overrides produce a new merged table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub struct SelectorTable {
    entries: BTreeMap<String, SelectorSpec>,
}

impl SelectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        flatten_into(&mut table.entries, "", value)?;
        Ok(table)
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: SelectorSpec) {
        self.entries.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&SelectorSpec> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Override-wins merge: a leaf present in `overrides` replaces the base leaf
    /// entirely; every other base leaf is kept.
    pub fn merged(&self, overrides: &SelectorTable) -> SelectorTable {
        let mut entries = self.entries.clone();
        for (name, spec) in &overrides.entries {
            entries.insert(name.clone(), spec.clone());
        }
        SelectorTable { entries }
    }

    pub fn compile(&self) -> Result<CompiledSelectors, ConfigError> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (name, spec) in &self.entries {
            let query = Query::parse_for(name, &spec.query)?;
            entries.insert(
                name.clone(),
                CompiledSelector {
                    query,
                    many: spec.many,
                    document_scoped: spec.document_scoped,
                },
            );
        }
        Ok(CompiledSelectors { entries })
    }
}

impl TryFrom<Value> for SelectorTable {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

fn flatten_into(
    out: &mut BTreeMap<String, SelectorSpec>,
    prefix: &str,
    value: &Value,
) -> Result<(), ConfigError> {
    let Value::Object(map) = value else {
        return Err(ConfigError::InvalidTable {
            key: prefix.to_string(),
            reason: "expected an object".into(),
        });
    };

    if map.contains_key("s") || map.contains_key("ALL") {
        let spec = leaf_spec(prefix, map)?;
        out.insert(prefix.to_string(), spec);
        return Ok(());
    }

    for (key, child) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        flatten_into(out, &name, child)?;
    }
    Ok(())
}

fn leaf_spec(key: &str, map: &serde_json::Map<String, Value>) -> Result<SelectorSpec, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTable {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let (query, many) = match (map.get("s"), map.get("ALL")) {
        (Some(_), Some(_)) => return Err(invalid("both `s` and `ALL` given")),
        (Some(Value::String(q)), None) => (q.clone(), false),
        (None, Some(Value::String(q))) => (q.clone(), true),
        _ => return Err(invalid("query must be a string")),
    };
    let document_scoped = match map.get("doc") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(invalid("`doc` must be a boolean")),
    };

    Ok(SelectorSpec {
        query,
        many,
        document_scoped,
    })
}

#[derive(Debug, Clone)]
pub struct CompiledSelector {
    query: Query,
    many: bool,
    document_scoped: bool,
}

impl CompiledSelector {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn many(&self) -> bool {
        self.many
    }

    pub fn document_scoped(&self) -> bool {
        self.document_scoped
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompiledSelectors {
    entries: HashMap<String, CompiledSelector>,
}

impl CompiledSelectors {
    pub fn get(&self, name: &str) -> Option<&CompiledSelector> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Per-page cache of resolved nodes.
///
/// Lookups that find nothing are not cached, so a poller waiting for a node to
/// appear sees it as soon as it exists. The detail scope is memoised on first
/// success and only forgotten by [`ElementBundle::invalidate`].
#[derive(Debug)]
pub struct ElementBundle {
    selectors: Arc<CompiledSelectors>,
    detail_container: Option<Query>,
    scope: Option<NodeId>,
    resolved: HashMap<String, Vec<NodeId>>,
}

impl ElementBundle {
    pub fn new(selectors: Arc<CompiledSelectors>, detail_container: Option<Query>) -> Self {
        Self {
            selectors,
            detail_container,
            scope: None,
            resolved: HashMap::new(),
        }
    }

    pub fn scope_root(&mut self, doc: &Document) -> Option<NodeId> {
        if self.scope.is_none() {
            if let Some(container) = &self.detail_container {
                self.scope = doc.query(None, container.selector()).map(|el| el.id());
                if let Some(id) = self.scope {
                    artmark_debug!("detail scope `{}` resolved to {id:?}", container.as_str());
                }
            }
        }
        self.scope
    }

    pub fn resolve<'d>(&mut self, doc: &'d Document, name: &str) -> Option<ElementRef<'d>> {
        let id = self.lookup(doc, name).first().copied()?;
        doc.element(id)
    }

    pub fn resolve_all<'d>(&mut self, doc: &'d Document, name: &str) -> Vec<ElementRef<'d>> {
        let ids = self.lookup(doc, name).to_vec();
        ids.into_iter().filter_map(|id| doc.element(id)).collect()
    }

    pub fn has(&mut self, doc: &Document, name: &str) -> bool {
        !self.lookup(doc, name).is_empty()
    }

    /// Drop every cached resolution, the detail scope included.
    pub fn invalidate(&mut self) {
        artmark_debug!("element bundle invalidated ({} cached names)", self.resolved.len());
        self.scope = None;
        self.resolved.clear();
    }

    fn lookup(&mut self, doc: &Document, name: &str) -> &[NodeId] {
        if !self.resolved.contains_key(name) {
            let selectors = Arc::clone(&self.selectors);
            let Some(entry) = selectors.get(name) else {
                artmark_debug!("selector `{name}` is not defined for this site");
                return &[];
            };

            let scope = if entry.document_scoped() {
                None
            } else {
                self.scope_root(doc)
            };
            let found = doc.query_all(scope, entry.query().selector());
            let ids: Vec<NodeId> = if entry.many() {
                found.iter().map(|el| el.id()).collect()
            } else {
                found.first().map(|el| el.id()).into_iter().collect()
            };
            if ids.is_empty() {
                return &[];
            }
            self.resolved.insert(name.to_string(), ids);
        }
        self.resolved.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
