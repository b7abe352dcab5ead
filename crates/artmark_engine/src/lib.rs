//! Artmark engine: site profiles, the per-page runtime, retrying installation
//! and the secondary-document fetch.
mod decode;
mod extract;
mod fetch;
mod profile;
mod renderer;
mod runtime;
mod scheduler;
mod settings;
mod types;

pub use decode::{decode_page, CharsetSource, DecodeError, DecodedPage};
pub use extract::{ContextExtractor, PathError};
pub use fetch::{FetchSettings, ReqwestFetcher, SecondaryFetcher};
pub use profile::{
    load_profile, CompiledProfile, InteractionRule, ProfileError, ProfileRegistry, SiteProfile,
};
pub use renderer::LogRenderer;
pub use runtime::{Services, SiteRuntime};
pub use scheduler::{InstallError, InstallReport, InstallationTask, Scheduler, TaskOutcome};
pub use settings::{EngineSettings, SettingsError};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput};
