//! One site adapter bound to one page for the page's lifetime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use artmark_core::{
    mark, ContextParts, Document, ElementBundle, ExtractionContext, InteractionKind, ItemUrl,
    MarkReport, MarkScope, MutationBatch, MutationRecord, MutationWatcher, NodeId, ProcessedStore,
    ReadyState, Renderer, WatchSignal,
};
use artmark_logging::{artmark_debug, artmark_info};
use futures_util::future::{self, join};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::extract::ContextExtractor;
use crate::fetch::SecondaryFetcher;
use crate::profile::{CompiledProfile, InteractionRule};
use crate::scheduler::{InstallError, InstallReport, InstallationTask, Scheduler};
use crate::settings::EngineSettings;

/// The collaborators a runtime calls out to.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ProcessedStore>,
    pub renderer: Arc<dyn Renderer>,
    pub fetcher: Arc<dyn SecondaryFetcher>,
}

pub struct SiteRuntime {
    profile: Arc<CompiledProfile>,
    settings: EngineSettings,
    document: RefCell<Document>,
    bundle: RefCell<ElementBundle>,
    watcher: RefCell<Option<MutationWatcher>>,
    conditions: RefCell<HashMap<String, bool>>,
    services: Services,
    extractor: ContextExtractor,
    scheduler: Scheduler,
}

impl SiteRuntime {
    pub fn new(
        profile: Arc<CompiledProfile>,
        document: Document,
        services: Services,
        settings: EngineSettings,
    ) -> Self {
        let bundle = profile.new_bundle();
        let watcher = profile.watch().cloned().map(MutationWatcher::new);
        let extractor = ContextExtractor::new(services.fetcher.clone());
        let scheduler = Scheduler::new(settings.retry_interval);
        Self {
            profile,
            settings,
            document: RefCell::new(document),
            bundle: RefCell::new(bundle),
            watcher: RefCell::new(watcher),
            conditions: RefCell::new(HashMap::new()),
            services,
            extractor,
            scheduler,
        }
    }

    pub fn profile(&self) -> &CompiledProfile {
        &self.profile
    }

    /// Host access to the page, e.g. to apply a rewrite before feeding its records.
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.document.borrow_mut())
    }

    pub fn is_item_page(&self) -> bool {
        self.profile.identity().is_item_page(&self.document.borrow())
    }

    fn is_complete(&self) -> bool {
        self.document.borrow().ready_state() == ReadyState::Complete
    }

    pub async fn context(&self, parts: ContextParts) -> ExtractionContext {
        let prepared = {
            let document = self.document.borrow();
            let mut bundle = self.bundle.borrow_mut();
            self.profile
                .context_builder()
                .prepare(&document, &mut bundle, parts)
        };
        self.extractor.resolve(prepared).await
    }

    /// Store answers are memoised until the next page reset.
    fn is_processed(&self, id: &str) -> bool {
        if let Some(&known) = self.conditions.borrow().get(id) {
            return known;
        }
        let known = self.services.store.is_processed(id);
        self.conditions.borrow_mut().insert(id.to_string(), known);
        known
    }

    /// Show the downloaded indicator when the current item is already processed.
    pub async fn display_downloaded(&self) -> bool {
        if !self.is_item_page() {
            return false;
        }
        self.display_current_item().await
    }

    /// After a rewrite the item may live in an overlay while the location still
    /// points at a list page. Only location-identified items need an item page.
    async fn redisplay(&self) -> bool {
        match self.profile.context_rules().item.url {
            ItemUrl::Location => self.display_downloaded().await,
            ItemUrl::Link(_) => self.display_current_item().await,
        }
    }

    async fn display_current_item(&self) -> bool {
        let context = self.context(ContextParts::METADATA).await;
        let Some(id) = context.item.as_ref().map(|item| item.id.clone()) else {
            artmark_debug!("no item identifier on {}", self.document.borrow().location());
            return false;
        };
        if !self.is_processed(&id) {
            return false;
        }
        self.services.renderer.show_downloaded_indicator(&context);
        true
    }

    pub fn mark_downloaded(&self) -> MarkReport {
        let document = self.document.borrow();
        let rules = self.profile.marking();
        let scope = match rules.scope {
            MarkScope::Document => None,
            MarkScope::Detail => self.bundle.borrow_mut().scope_root(&document),
        };
        let report = mark(
            &document,
            scope,
            rules,
            self.profile.identity(),
            |id| self.is_processed(id),
            self.services.renderer.as_ref(),
        );
        artmark_info!(
            "marked {} of {} thumbnail(s) on {}",
            report.marked,
            report.examined,
            document.location()
        );
        report
    }

    /// The behaviours for this page, each bounded by the retry budget.
    pub fn install_tasks(&self) -> Vec<InstallationTask<'_>> {
        let budget = self.settings.retry_budget;
        let mut tasks = Vec::new();
        let item_page = self.is_item_page();

        if item_page {
            tasks.push(InstallationTask::new("display", budget, move || {
                self.display_when_ready()
            }));
        }
        tasks.push(InstallationTask::new("mark", budget, move || {
            future::ready(self.mark_when_ready())
        }));
        if self.watcher.borrow().is_some() {
            tasks.push(InstallationTask::new("watch", budget, move || {
                future::ready(self.arm_watcher())
            }));
        }
        if item_page {
            for rule in self.profile.interactions() {
                tasks.push(InstallationTask::new(rule.name.clone(), budget, move || {
                    self.install_interaction(rule)
                }));
            }
        }
        tasks
    }

    pub async fn install_functions(&self) -> InstallReport {
        let tasks = self.install_tasks();
        artmark_debug!("installing {} task(s) for `{}`", tasks.len(), self.profile.id());
        self.scheduler.install_all(tasks).await
    }

    async fn display_when_ready(&self) -> Result<bool, InstallError> {
        if !self.is_complete() {
            return Ok(false);
        }
        self.display_downloaded().await;
        Ok(true)
    }

    fn mark_when_ready(&self) -> Result<bool, InstallError> {
        if !self.is_complete() {
            return Ok(false);
        }
        self.mark_downloaded();
        Ok(true)
    }

    fn require_selector(&self, name: &str) -> Result<(), InstallError> {
        if self.profile.selectors().contains(name) {
            Ok(())
        } else {
            Err(InstallError::UndefinedSelector(name.to_string()))
        }
    }

    fn resolve_node(&self, name: &str) -> Option<NodeId> {
        let document = self.document.borrow();
        let node = self.bundle.borrow_mut().resolve(&document, name).map(|el| el.id());
        node
    }

    fn arm_watcher(&self) -> Result<bool, InstallError> {
        let mut slot = self.watcher.borrow_mut();
        let Some(watcher) = slot.as_mut() else {
            return Ok(true);
        };
        let content = watcher.rules().content.clone();
        self.require_selector(&content)?;
        if !self.is_complete() {
            return Ok(false);
        }
        let Some(root) = self.resolve_node(&content) else {
            return Ok(false);
        };
        watcher.arm(&self.document.borrow(), root);
        artmark_debug!("watching `{content}` for page rewrites");
        Ok(true)
    }

    async fn install_interaction(&self, rule: &InteractionRule) -> Result<bool, InstallError> {
        self.require_selector(&rule.target)?;
        for name in &rule.requires {
            self.require_selector(name)?;
        }
        if !self.is_complete() {
            return Ok(false);
        }
        match rule.kind {
            InteractionKind::ViewerTrigger => {
                let Some(node) = self.resolve_node(&rule.target) else {
                    return Ok(false);
                };
                let satisfied = rule.requires.is_empty()
                    || rule
                        .requires
                        .iter()
                        .any(|name| self.resolve_node(name).is_some());
                if !satisfied {
                    return Ok(false);
                }
                self.services.renderer.wire_interaction(node, rule.kind);
            }
            InteractionKind::OpenCaption => {
                if !self.settings.open_caption {
                    return Ok(true);
                }
                let Some(node) = self.resolve_node(&rule.target) else {
                    return Ok(false);
                };
                tokio::time::sleep(self.settings.open_caption_delay).await;
                self.services.renderer.wire_interaction(node, rule.kind);
            }
        }
        Ok(true)
    }

    /// Feed one batch to the watcher; a signal re-instruments the page.
    pub async fn handle_mutations(&self, batch: &[MutationRecord]) -> Option<WatchSignal> {
        let signal = {
            let mut slot = self.watcher.borrow_mut();
            let document = self.document.borrow();
            let signal = slot.as_mut()?.process(&document, batch);
            signal
        }?;
        artmark_info!("page rewrite detected ({signal:?}), re-instrumenting");
        self.reset();
        self.redisplay().await;
        self.mark_downloaded();
        Some(signal)
    }

    fn reset(&self) {
        self.bundle.borrow_mut().invalidate();
        self.conditions.borrow_mut().clear();
    }

    /// Handle batches in arrival order until the host closes the feed.
    pub async fn watch(&self, mut feed: UnboundedReceiver<MutationBatch>) {
        while let Some(batch) = feed.recv().await {
            self.handle_mutations(&batch).await;
        }
        artmark_debug!("mutation feed for `{}` closed", self.profile.id());
    }

    pub async fn run(&self, feed: UnboundedReceiver<MutationBatch>) -> InstallReport {
        let (report, ()) = join(self.install_functions(), self.watch(feed)).await;
        report
    }
}
