//! Runs one site profile against a saved page and prints what the engine sees.

mod processed;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use artmark_core::{ContextParts, Document, TaskState};
use artmark_engine::{
    decode_page, EngineSettings, LogRenderer, ProfileRegistry, ReqwestFetcher, Services,
    SiteRuntime,
};
use artmark_logging::{artmark_info, LogDestination};
use clap::Parser;
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "artmark-probe", about = "Extract artwork context from a saved page")]
struct Cli {
    /// Directory of site profile JSON files.
    #[arg(long)]
    profiles: PathBuf,
    /// Saved HTML of the page.
    #[arg(long)]
    html: PathBuf,
    /// Address the page was saved from; picks the profile.
    #[arg(long)]
    location: String,
    /// Engine settings (RON).
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Already downloaded item ids (RON).
    #[arg(long)]
    processed: Option<PathBuf>,
    /// Skip the path sub-record, and with it any secondary fetch.
    #[arg(long)]
    no_path: bool,
    /// Also run the installation tasks and print their outcome.
    #[arg(long)]
    install: bool,
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    artmark_logging::initialize(LogDestination::Terminal, cli.log_level);

    let registry = ProfileRegistry::from_dir(&cli.profiles)
        .with_context(|| format!("loading profiles from {}", cli.profiles.display()))?;
    let Some(profile) = registry.select(&cli.location) else {
        bail!("no profile matches {}", cli.location);
    };
    artmark_info!("using profile `{}`", profile.id());

    let settings = cli
        .settings
        .as_deref()
        .map(EngineSettings::load_or_default)
        .unwrap_or_default();
    let store = cli
        .processed
        .as_deref()
        .map(processed::load_processed)
        .unwrap_or_default();

    let bytes = fs::read(&cli.html).with_context(|| format!("reading {}", cli.html.display()))?;
    let decoded = decode_page(&bytes, None, None)?;
    let document = Document::parse(cli.location.clone(), &decoded.html);

    let services = Services {
        store: Arc::new(store),
        renderer: Arc::new(LogRenderer::new()),
        fetcher: Arc::new(ReqwestFetcher::new(settings.fetch.clone())),
    };
    let runtime = SiteRuntime::new(profile, document, services, settings);

    let parts = if cli.no_path {
        ContextParts::METADATA
    } else {
        ContextParts::ALL
    };

    let executor = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting the runtime")?;
    executor.block_on(async {
        if runtime.is_item_page() {
            let context = runtime.context(parts).await;
            println!("{}", serde_json::to_string_pretty(&context)?);
        } else {
            println!("not an item page");
        }

        if cli.install {
            let report = runtime.install_functions().await;
            for outcome in &report.outcomes {
                let verdict = match &outcome.state {
                    TaskState::Installed { attempts } => format!("installed ({attempts})"),
                    TaskState::Exhausted { attempts, reason } => {
                        format!("gave up ({attempts}): {reason:?}")
                    }
                    TaskState::Pending { .. } => "pending".to_string(),
                };
                println!("{:<16} {verdict}", outcome.name);
            }
        }
        Ok::<_, anyhow::Error>(())
    })
}
