use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use artmark_core::{
    ContextParts, Document, ExtractionContext, InteractionKind, ItemUrl, MarkTarget, MemoryStore,
    NodeId, Query, ReadyState, Renderer, SecondaryRequest, TaskState, WatchSignal,
};
use artmark_engine::{
    load_profile, CompiledProfile, EngineSettings, FailureKind, FetchError, FetchMetadata,
    FetchOutput, SecondaryFetcher, Services, SiteProfile, SiteRuntime,
};
use futures_util::future::join;
use pretty_assertions::assert_eq;

#[derive(Default)]
struct Recorder {
    marks: Mutex<Vec<String>>,
    indicators: Mutex<Vec<String>>,
    wired: Mutex<Vec<InteractionKind>>,
}

impl Recorder {
    fn marks(&self) -> Vec<String> {
        self.marks.lock().unwrap().clone()
    }

    fn indicators(&self) -> Vec<String> {
        self.indicators.lock().unwrap().clone()
    }

    fn wired(&self) -> Vec<InteractionKind> {
        self.wired.lock().unwrap().clone()
    }
}

impl Renderer for Recorder {
    fn apply_mark(&self, target: &MarkTarget, _method: Option<&str>) {
        self.marks.lock().unwrap().push(target.item_id.clone());
    }

    fn show_downloaded_indicator(&self, context: &ExtractionContext) {
        let id = context.item.as_ref().map(|item| item.id.clone()).unwrap_or_default();
        self.indicators.lock().unwrap().push(id);
    }

    fn wire_interaction(&self, _node: NodeId, kind: InteractionKind) {
        self.wired.lock().unwrap().push(kind);
    }
}

/// Serves a canned secondary document, or fails when there is none.
struct StubFetcher {
    body: Option<&'static str>,
    requests: Mutex<Vec<SecondaryRequest>>,
}

impl StubFetcher {
    fn serving(body: &'static str) -> Self {
        Self {
            body: Some(body),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            body: None,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl SecondaryFetcher for StubFetcher {
    async fn fetch(&self, request: &SecondaryRequest) -> Result<FetchOutput, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let Some(body) = self.body else {
            return Err(FetchError {
                kind: FailureKind::Timeout,
                message: "stub timeout".into(),
            });
        };
        Ok(FetchOutput {
            bytes: body.as_bytes().to_vec(),
            metadata: FetchMetadata {
                original_url: request.url.clone(),
                final_url: request.url.clone(),
                redirect_count: 0,
                content_type: Some("text/html; charset=utf-8".into()),
                byte_len: body.len() as u64,
            },
        })
    }
}

fn profile_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/profiles")
        .join(name)
}

struct Harness {
    runtime: SiteRuntime,
    renderer: Arc<Recorder>,
    store: Arc<MemoryStore>,
    fetcher: Arc<StubFetcher>,
}

fn harness(
    profile: &str,
    document: Document,
    fetcher: StubFetcher,
    settings: EngineSettings,
) -> Harness {
    harness_for(
        load_profile(&profile_path(profile)).unwrap(),
        document,
        fetcher,
        settings,
    )
}

fn harness_for(
    profile: CompiledProfile,
    document: Document,
    fetcher: StubFetcher,
    settings: EngineSettings,
) -> Harness {
    artmark_logging::initialize_for_tests();
    let profile = Arc::new(profile);
    let renderer = Arc::new(Recorder::default());
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(fetcher);
    let services = Services {
        store: store.clone(),
        renderer: renderer.clone(),
        fetcher: fetcher.clone(),
    };
    Harness {
        runtime: SiteRuntime::new(profile, document, services, settings),
        renderer,
        store,
        fetcher,
    }
}

fn node(doc: &Document, query: &str) -> NodeId {
    doc.query(None, Query::parse(query).unwrap().selector())
        .unwrap_or_else(|| panic!("no node for {query}"))
        .id()
}

const DEVIANT_ITEM: &str = "https://www.deviantart.com/painter/art/Sunset-123";

fn deviant_page() -> Document {
    Document::parse(
        DEVIANT_ITEM,
        r#"<html><body>
        <div class="dev-page-container">
          <div class="dev-title-container">
            <h1><a href="https://www.deviantart.com/painter/art/Sunset-123">Sunset</a></h1>
            <span class="author"><a class="username" href="https://www.deviantart.com/painter">Painter</a></span>
            <div class="dev-about-breadcrumb"><a>#landscape</a></div>
          </div>
          <div class="dev-view-deviation">
            <img class="dev-content-normal" src="https://images.example/s.jpg">
            <img class="dev-content-full" src="https://images.example/f.jpg">
          </div>
          <div class="dev-metainfo-content dev-metainfo-details"><dl><dd><span ts="1609459200">Jan 1</span></dd></dl></div>
        </div>
        <div id="more">
          <span class="thumb"><a href="https://www.deviantart.com/painter/art/Other-7">o</a></span>
          <span class="thumb"><a href="/painter/art/Sunset-123">s</a></span>
        </div>
        </body></html>"#,
    )
}

fn title_block(slug: &str) -> String {
    format!(
        r#"<div class="dev-title-container" id="title-{slug}">
             <h1><a href="https://www.deviantart.com/painter/art/{slug}">{slug}</a></h1>
           </div>"#
    )
}

#[tokio::test]
async fn item_page_installs_display_marking_and_watch() {
    let h = harness(
        "deviant.json",
        deviant_page(),
        StubFetcher::failing(),
        EngineSettings::default(),
    );
    h.store.record("Sunset-123");

    assert!(h.runtime.is_item_page());
    let report = h.runtime.install_functions().await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.installed(), 3);
    assert_eq!(h.renderer.indicators(), vec!["Sunset-123".to_string()]);
    assert_eq!(h.renderer.marks(), vec!["Sunset-123".to_string()]);

    let context = h.runtime.context(ContextParts::ALL).await;
    let item = context.item.unwrap();
    assert_eq!(item.posted_ymd.as_deref(), Some("2021/01/01"));
    assert_eq!(item.tags, vec!["landscape".to_string()]);
    assert_eq!(context.author.unwrap().id, "painter");
    assert_eq!(
        context.path.unwrap().original[0].src,
        "https://images.example/f.jpg"
    );
}

#[tokio::test]
async fn overlay_rewrites_reset_the_page_state() {
    let h = harness(
        "deviant.json",
        deviant_page(),
        StubFetcher::failing(),
        EngineSettings::default(),
    );
    h.runtime.install_functions().await;
    assert!(h.renderer.indicators().is_empty());
    assert!(h.renderer.marks().is_empty());

    // learned after the first pass; only a reset lets the runtime see it
    h.store.record("Next-9");
    h.store.record("Other-7");
    h.store.record("Final-10");
    let mut resets = 0;

    // the overlay opens with its first item already inside
    let record = h.runtime.with_document(|doc| {
        let body = doc.body().unwrap().id();
        let fragment = format!(
            r#"<div class="minibrowse-container dev-page-container" id="mb">{}<span class="thumb"><a href="/painter/art/Other-7">o</a></span></div>"#,
            title_block("Next-9")
        );
        doc.insert_html(body, &fragment).unwrap()
    });
    let signal = h.runtime.handle_mutations(&[record]).await;
    let overlay = h.runtime.with_document(|doc| node(doc, "#mb"));
    assert_eq!(signal, Some(WatchSignal::OverlayOpened { overlay }));
    resets += 1;
    assert_eq!(h.renderer.indicators(), vec!["Next-9".to_string()]);
    assert_eq!(h.renderer.marks(), vec!["Other-7".to_string()]);

    // the overlay swaps its item in place
    let batch = h.runtime.with_document(|doc| {
        let old = node(doc, "#title-Next-9");
        let removed = doc.remove(old).unwrap();
        let added = doc.insert_html(overlay, &title_block("Final-10")).unwrap();
        vec![removed, added]
    });
    assert_eq!(
        h.runtime.handle_mutations(&batch).await,
        Some(WatchSignal::DetailReplaced)
    );
    resets += 1;
    assert_eq!(
        h.renderer.indicators(),
        vec!["Next-9".to_string(), "Final-10".to_string()]
    );

    // churn elsewhere in the page is no longer observed
    let outside = h.runtime.with_document(|doc| {
        let more = node(doc, "#more");
        doc.insert_html(more, &title_block("Ignored-1")).unwrap()
    });
    assert_eq!(h.runtime.handle_mutations(&[outside]).await, None);
    assert_eq!(resets, 2);
    assert_eq!(h.renderer.indicators().len(), 2);
}

const DEVIANT_GALLERY: &str = "https://www.deviantart.com/painter/gallery/";

fn deviant_gallery() -> Document {
    Document::parse(
        DEVIANT_GALLERY,
        r#"<html><body>
        <div id="gallery">
          <span class="thumb"><a href="/painter/art/Next-9">n</a></span>
          <span class="thumb"><a href="/painter/art/Other-7">o</a></span>
        </div>
        </body></html>"#,
    )
}

#[tokio::test]
async fn overlay_over_a_gallery_shows_the_indicator() {
    let h = harness(
        "deviant.json",
        deviant_gallery(),
        StubFetcher::failing(),
        EngineSettings::default(),
    );
    h.store.record("Next-9");

    assert!(!h.runtime.is_item_page());
    let report = h.runtime.install_functions().await;
    let names: Vec<_> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["mark", "watch"]);
    assert_eq!(report.installed(), 2);
    assert!(h.renderer.indicators().is_empty());
    assert_eq!(h.renderer.marks(), vec!["Next-9".to_string()]);

    let record = h.runtime.with_document(|doc| {
        let body = doc.body().unwrap().id();
        let fragment = format!(
            r#"<div class="minibrowse-container dev-page-container" id="mb">{}</div>"#,
            title_block("Next-9")
        );
        doc.insert_html(body, &fragment).unwrap()
    });
    let signal = h.runtime.handle_mutations(&[record]).await;
    let overlay = h.runtime.with_document(|doc| node(doc, "#mb"));
    assert_eq!(signal, Some(WatchSignal::OverlayOpened { overlay }));
    assert_eq!(h.renderer.indicators(), vec!["Next-9".to_string()]);

    // the overlay pushes its item into the history without a reload
    h.runtime
        .with_document(|doc| doc.set_location("https://www.deviantart.com/painter/art/Next-9"));
    assert!(h.runtime.is_item_page());
    assert!(h.runtime.display_downloaded().await);
    assert_eq!(
        h.renderer.indicators(),
        vec!["Next-9".to_string(), "Next-9".to_string()]
    );
}

#[tokio::test]
async fn location_identified_items_stay_hidden_over_a_gallery() {
    let text = fs::read_to_string(profile_path("deviant.json")).unwrap();
    let mut profile = SiteProfile::from_json(&text).unwrap();
    profile.context.item.url = ItemUrl::Location;
    let compiled = CompiledProfile::compile(profile).unwrap();
    let h = harness_for(
        compiled,
        deviant_gallery(),
        StubFetcher::failing(),
        EngineSettings::default(),
    );
    h.store.record("Next-9");
    h.runtime.install_functions().await;

    let record = h.runtime.with_document(|doc| {
        let body = doc.body().unwrap().id();
        let fragment = format!(
            r#"<div class="minibrowse-container dev-page-container">{}</div>"#,
            title_block("Next-9")
        );
        doc.insert_html(body, &fragment).unwrap()
    });
    let signal = h.runtime.handle_mutations(&[record]).await;

    assert!(matches!(signal, Some(WatchSignal::OverlayOpened { .. })));
    assert!(h.renderer.indicators().is_empty());
}

#[tokio::test(start_paused = true)]
async fn tasks_wait_for_the_document_to_complete() {
    let settings = EngineSettings {
        retry_interval: Duration::from_millis(500),
        ..EngineSettings::default()
    };
    let page = deviant_page().with_ready_state(ReadyState::Interactive);
    let h = harness("deviant.json", page, StubFetcher::failing(), settings);
    h.store.record("Sunset-123");

    let finish_loading = async {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        h.runtime
            .with_document(|doc| doc.set_ready_state(ReadyState::Complete));
    };
    let (report, ()) = join(h.runtime.install_functions(), finish_loading).await;

    // attempts at 0, 500, 1000 and 1500 ms
    assert_eq!(report.state_of("display"), Some(&TaskState::Installed { attempts: 4 }));
    assert_eq!(report.state_of("mark"), Some(&TaskState::Installed { attempts: 4 }));
    assert_eq!(h.renderer.indicators(), vec!["Sunset-123".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn page_that_never_loads_exhausts_every_task() {
    let settings = EngineSettings {
        retry_budget: 3,
        ..EngineSettings::default()
    };
    let page = deviant_page().with_ready_state(ReadyState::Loading);
    let h = harness("deviant.json", page, StubFetcher::failing(), settings);

    let report = h.runtime.install_functions().await;
    assert_eq!(report.installed(), 0);
    assert!(report
        .outcomes
        .iter()
        .all(|outcome| outcome.state.attempts() == 3));
    assert!(h.renderer.marks().is_empty());
}

const TINAMI_ITEM: &str = "https://www.tinami.com/view/1001";

fn tinami_page() -> Document {
    Document::parse(
        TINAMI_ITEM,
        r#"<html><body>
        <div class="viewdata"><h1><span>Castle</span></h1></div>
        <div class="viewbody"><img class="captify" src="https://img.tinami.com/illust2/thumb/546/abc.jpg"></div>
        <form id="open_original_content">
          <input type="hidden" name="ego" value="abc">
          <input type="hidden" name="illust" value="1001">
        </form>
        <div class="view_info">2017年06月03日 12:34</div>
        <div class="tag"><span>castle</span><span> sky </span></div>
        <div class="description">line one</div>
        <div class="description">line two</div>
        <div class="prof"><p><a href="https://www.tinami.com/profile/777">Builder</a></p></div>
        <div id="show_all">more</div>
        </body></html>"#,
    )
}

const ORIGINAL_DOCUMENT: &str = r#"<html><body>
  <img src="/img/header.png">
  <img src="https://img.tinami.com/illust2/img/546/abc.jpg">
</body></html>"#;

#[tokio::test]
async fn secondary_document_supplies_the_path() {
    let h = harness(
        "tinami.json",
        tinami_page(),
        StubFetcher::serving(ORIGINAL_DOCUMENT),
        EngineSettings::default(),
    );

    let context = h.runtime.context(ContextParts::ALL).await;

    let path = context.path.expect("path from secondary document");
    assert_eq!(path.original.len(), 1);
    assert_eq!(path.original[0].src, "https://img.tinami.com/illust2/img/546/abc.jpg");
    let requests = h.fetcher.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, TINAMI_ITEM);
    assert_eq!(requests[0].body(), "ego=abc&illust=1001");

    let item = context.item.unwrap();
    assert_eq!(item.id, "1001");
    assert_eq!(item.title.as_deref(), Some("Castle"));
    assert_eq!(item.posted, Some(1_496_493_240_000));
    assert_eq!(item.tags, vec!["castle".to_string(), "sky".to_string()]);
    assert_eq!(item.caption.as_deref(), Some("line one\nline two"));
    assert_eq!(context.author.unwrap().id, "777");
}

#[tokio::test]
async fn failed_secondary_fetch_only_voids_the_path() {
    let h = harness(
        "tinami.json",
        tinami_page(),
        StubFetcher::failing(),
        EngineSettings::default(),
    );

    let context = h.runtime.context(ContextParts::ALL).await;
    assert_eq!(context.path, None);
    assert_eq!(context.item.map(|item| item.id), Some("1001".to_string()));
    assert_eq!(context.author.map(|author| author.name), Some("Builder".to_string()));
}

#[tokio::test]
async fn metadata_display_never_fetches() {
    let h = harness(
        "tinami.json",
        tinami_page(),
        StubFetcher::serving(ORIGINAL_DOCUMENT),
        EngineSettings::default(),
    );
    h.store.record("1001");

    assert!(h.runtime.display_downloaded().await);
    assert!(h.fetcher.requests.lock().unwrap().is_empty());
    assert_eq!(h.renderer.indicators(), vec!["1001".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn item_page_wires_viewer_and_caption_hooks() {
    let h = harness(
        "tinami.json",
        tinami_page(),
        StubFetcher::serving(ORIGINAL_DOCUMENT),
        EngineSettings::default(),
    );

    let started = tokio::time::Instant::now();
    let report = h.runtime.install_functions().await;

    assert_eq!(report.installed(), 4);
    assert_eq!(report.state_of("middleClick"), Some(&TaskState::Installed { attempts: 1 }));
    assert_eq!(
        h.renderer.wired(),
        vec![InteractionKind::ViewerTrigger, InteractionKind::OpenCaption]
    );
    assert_eq!(started.elapsed(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn caption_hook_is_inert_when_disabled() {
    let settings = EngineSettings {
        open_caption: false,
        ..EngineSettings::default()
    };
    let h = harness("tinami.json", tinami_page(), StubFetcher::failing(), settings);

    let report = h.runtime.install_functions().await;
    assert_eq!(report.state_of("openCaption"), Some(&TaskState::Installed { attempts: 1 }));
    assert_eq!(h.renderer.wired(), vec![InteractionKind::ViewerTrigger]);
}

#[tokio::test]
async fn list_page_only_marks() {
    let page = Document::parse(
        "https://www.tinami.com/search/list?keyword=castle",
        r#"<table><tr>
            <td><p class="capt">a</p><a href="/view/1001">1001</a></td>
            <td><p class="capt">b</p><a href="/view/1002">1002</a></td>
        </tr></table>"#,
    );
    let h = harness("tinami.json", page, StubFetcher::failing(), EngineSettings::default());
    h.store.record("1002");

    assert!(!h.runtime.is_item_page());
    let report = h.runtime.install_functions().await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.state_of("mark"), Some(&TaskState::Installed { attempts: 1 }));
    assert_eq!(h.renderer.marks(), vec!["1002".to_string()]);
    assert!(h.renderer.indicators().is_empty());
}

#[tokio::test]
async fn run_follows_the_feed_until_it_closes() {
    let h = harness(
        "deviant.json",
        deviant_page(),
        StubFetcher::failing(),
        EngineSettings::default(),
    );
    h.store.record("Next-9");
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let host = async {
        // the first batch arrives once the watcher is armed
        tokio::task::yield_now().await;
        let record = h.runtime.with_document(|doc| {
            let body = doc.body().unwrap().id();
            let fragment = format!(
                r#"<div class="minibrowse-container dev-page-container">{}</div>"#,
                title_block("Next-9")
            );
            doc.insert_html(body, &fragment).unwrap()
        });
        tx.send(vec![record]).unwrap();
        drop(tx);
    };
    let (report, ()) = join(h.runtime.run(rx), host).await;

    assert_eq!(report.installed(), 3);
    assert_eq!(h.renderer.indicators(), vec!["Next-9".to_string()]);
}
