//! Artmark core: document model, selector resolution, context building,
//! marking and the pure state machines behind installation and watching.
mod context;
mod dates;
mod dom;
mod error;
mod identity;
mod install;
mod marking;
mod selectors;
mod services;
mod watcher;

pub use context::{
    normalize_tag, AssetRef, AuthorContext, AuthorRules, ContextBuilder, ContextParts,
    ContextRules, DateEncoding, ExtractionContext, ItemContext, ItemRules, ItemUrl, PathContext,
    PathStrategy, PostedRule, PreparedContext, SecondaryRequest,
};
pub use dates::PostedDate;
pub use dom::{text_of, Document, DomError, MutationBatch, MutationRecord, ReadyState};
pub use error::{ConfigError, ExtractError};
pub use identity::{IdentityPattern, UrlPattern};
pub use install::{AttemptOutcome, ExhaustReason, TaskState};
pub use marking::{
    collect_targets, mark, MarkReport, MarkScope, MarkTarget, MarkingRule, MarkingRules,
};
pub use selectors::{
    CompiledSelector, CompiledSelectors, ElementBundle, Query, SelectorSpec, SelectorTable,
};
pub use services::{InteractionKind, MemoryStore, ProcessedStore, Renderer};
pub use watcher::{MutationWatcher, WatchPhase, WatchRules, WatchSignal};

pub use ego_tree::NodeId;
