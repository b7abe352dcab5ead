use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use artmark_core::{
    CompiledSelectors, ConfigError, ContextBuilder, ContextRules, ElementBundle, IdentityPattern,
    InteractionKind, MarkingRules, Query, SelectorTable, WatchRules,
};
use artmark_logging::{artmark_debug, artmark_info};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("cannot read profile {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid profile {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("profile `{id}`: {source}")]
    Config { id: String, source: ConfigError },
}

/// A behaviour wired onto a node of the item page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionRule {
    pub name: String,
    pub kind: InteractionKind,
    /// Selector-table name of the node to wire.
    pub target: String,
    /// Further names that must resolve before wiring.
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Everything the engine knows about one site, as written in its JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteProfile {
    pub id: String,
    /// Exact host names, or `*.example.com` for any subdomain.
    pub hosts: Vec<String>,
    pub item_pattern: IdentityPattern,
    #[serde(default)]
    pub detail_container: Option<Query>,
    pub selectors: SelectorTable,
    #[serde(default)]
    pub selector_override: Option<SelectorTable>,
    pub context: ContextRules,
    #[serde(default)]
    pub marking: MarkingRules,
    #[serde(default)]
    pub watch: Option<WatchRules>,
    #[serde(default)]
    pub interactions: Vec<InteractionRule>,
}

impl SiteProfile {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn matches_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|pattern| match pattern.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .is_some_and(|rest| rest.ends_with('.')),
            None => pattern.eq_ignore_ascii_case(host),
        })
    }
}

/// A profile whose selector table has been merged and compiled.
#[derive(Debug)]
pub struct CompiledProfile {
    profile: SiteProfile,
    selectors: Arc<CompiledSelectors>,
}

impl CompiledProfile {
    pub fn compile(profile: SiteProfile) -> Result<Self, ProfileError> {
        Self::compile_with(profile, None)
    }

    /// Compile with a runtime override applied on top of the profile's own.
    pub fn compile_with(
        profile: SiteProfile,
        extra: Option<&SelectorTable>,
    ) -> Result<Self, ProfileError> {
        let mut table = match &profile.selector_override {
            Some(overrides) => profile.selectors.merged(overrides),
            None => profile.selectors.clone(),
        };
        if let Some(extra) = extra {
            table = table.merged(extra);
        }
        let selectors = table.compile().map_err(|source| ProfileError::Config {
            id: profile.id.clone(),
            source,
        })?;
        artmark_debug!("profile `{}` compiled {} selectors", profile.id, table.len());
        Ok(Self {
            profile,
            selectors: Arc::new(selectors),
        })
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn identity(&self) -> &IdentityPattern {
        &self.profile.item_pattern
    }

    pub fn selectors(&self) -> &CompiledSelectors {
        &self.selectors
    }

    pub fn new_bundle(&self) -> ElementBundle {
        ElementBundle::new(self.selectors.clone(), self.profile.detail_container.clone())
    }

    pub fn context_builder(&self) -> ContextBuilder<'_> {
        ContextBuilder::new(&self.profile.context, &self.profile.item_pattern)
    }

    pub fn context_rules(&self) -> &ContextRules {
        &self.profile.context
    }

    pub fn marking(&self) -> &MarkingRules {
        &self.profile.marking
    }

    pub fn watch(&self) -> Option<&WatchRules> {
        self.profile.watch.as_ref()
    }

    pub fn interactions(&self) -> &[InteractionRule] {
        &self.profile.interactions
    }
}

pub fn load_profile(path: &Path) -> Result<CompiledProfile, ProfileError> {
    let text = fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let profile = SiteProfile::from_json(&text).map_err(|source| ProfileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    CompiledProfile::compile(profile)
}

/// The set of known sites, picked from by page location.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: Vec<Arc<CompiledProfile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, profile: CompiledProfile) {
        self.profiles.push(Arc::new(profile));
    }

    /// Load every `*.json` file of `dir`, in file-name order.
    pub fn from_dir(dir: &Path) -> Result<Self, ProfileError> {
        let io_error = |source| ProfileError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            registry.register(load_profile(&path)?);
        }
        artmark_info!("loaded {} site profile(s) from {}", registry.len(), dir.display());
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledProfile>> {
        self.profiles.iter().find(|p| p.id() == id).cloned()
    }

    pub fn select(&self, location: &str) -> Option<Arc<CompiledProfile>> {
        let url = url::Url::parse(location).ok()?;
        let host = url.host_str()?;
        self.profiles
            .iter()
            .find(|p| p.profile().matches_host(host))
            .cloned()
    }
}
