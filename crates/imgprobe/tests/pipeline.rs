//! End-to-end pipeline tests against a local mock HTTP server.
//!
//! Each test builds a configuration pointing at a `wiremock` server and a
//! temporary output directory, runs the resolver, and checks the manifest
//! and the files on disk.

use async_trait::async_trait;
use imgprobe::catalog::EntityDescriptor;
use imgprobe::config::{PageConfig, PipelineConfig, ResolutionPolicy};
use imgprobe::manifest::{resolve_reference, Manifest};
use imgprobe::progress::{self, ProgressEventKind};
use imgprobe::renderer::{NavigationResult, RenderContext, Renderer};
use imgprobe::resolver::Resolver;
use imgprobe::source::{RenderedPageSource, StaticCatalogSource};
use imgprobe::FetchOutcome;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0xFF, 0xD9,
];
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

// ── Helpers ──

fn config(server: &MockServer, out: &TempDir, ids: &[&str], templates: &[&str]) -> PipelineConfig {
    PipelineConfig {
        output_dir: out.path().to_path_buf(),
        base_url: server.uri(),
        templates: templates.iter().map(|t| t.to_string()).collect(),
        catalog: ids
            .iter()
            .map(|id| EntityDescriptor::new(*id, id.to_uppercase()))
            .collect(),
        request_delay_ms: 0,
        request_timeout_ms: Some(5_000),
        ..PipelineConfig::default()
    }
}

async fn serve(server: &MockServer, at: &str, body: &[u8], content_type: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", content_type)
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

async fn run_static(
    config: &PipelineConfig,
    policy: Option<ResolutionPolicy>,
) -> imgprobe::RunReport {
    config.validate().unwrap();
    let source = StaticCatalogSource::from_config(config);
    let resolver = Resolver::from_config(config, config.request_delay()).unwrap();
    resolver.run(&source, policy).await.unwrap()
}

/// Every reference in the manifest must point at a non-empty file.
fn assert_manifest_files_exist(config: &PipelineConfig, manifest: &Manifest) {
    for (id, refs) in manifest.iter() {
        for r in refs {
            let file = resolve_reference(config.public_prefix.as_deref(), &config.output_dir, r);
            let meta = std::fs::metadata(&file)
                .unwrap_or_else(|e| panic!("{id}: {} missing: {e}", file.display()));
            assert!(meta.len() > 0, "{id}: {} is empty", file.display());
        }
    }
}

// ── Scenarios ──

#[tokio::test]
async fn second_template_hit_after_404() {
    let server = MockServer::start().await;
    serve(&server, "/uploads/mg3-blue.jpg", JPEG, "image/jpeg").await;
    let out = TempDir::new().unwrap();
    let config = config(
        &server,
        &out,
        &["mg3-blue"],
        &["{base}/images/cars/{id}.jpg", "{base}/uploads/{id}.jpg"],
    );

    let report = run_static(&config, None).await;

    let paths = report.manifest.get("mg3-blue").unwrap();
    assert_eq!(paths, ["/cars/mg3-blue-1.jpg"]);
    assert!(paths[0].ends_with(".jpg"));
    assert_eq!(
        std::fs::read(out.path().join("mg3-blue-1.jpg")).unwrap(),
        JPEG
    );
    // The 404 attempt left nothing behind.
    assert!(!out.path().join("mg3-blue.jpg").exists());

    let attempts = &report.entities[0].attempts;
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].outcome, FetchOutcome::HttpError { status: 404 });
    assert!(attempts[1].outcome.is_success());
}

#[tokio::test]
async fn all_candidates_missing_still_writes_manifest() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config(
        &server,
        &out,
        &["mg-rx5"],
        &["{base}/images/{id}.jpg", "{base}/images/{id}.png"],
    );

    let report = run_static(&config, None).await;

    assert_eq!(report.manifest.get("mg-rx5"), Some(&[][..]));
    let on_disk = Manifest::load(&config.manifest_path()).unwrap();
    assert_eq!(on_disk, report.manifest);

    let files: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files, vec!["images.json".to_string()]);
}

#[tokio::test]
async fn first_success_skips_remaining_candidates() {
    let server = MockServer::start().await;
    serve(&server, "/a/mg5-white.jpg", JPEG, "image/jpeg").await;
    Mock::given(path("/b/mg5-white.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
        .expect(0)
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let config = config(
        &server,
        &out,
        &["mg5-white"],
        &["{base}/a/{id}.jpg", "{base}/b/{id}.png"],
    );

    let report = run_static(&config, Some(ResolutionPolicy::FirstSuccess)).await;
    assert_eq!(report.manifest.get("mg5-white").unwrap(), ["/cars/mg5-white.jpg"]);
    assert_eq!(report.attempts(), 1);
}

#[tokio::test]
async fn collect_all_records_every_hit() {
    let server = MockServer::start().await;
    serve(&server, "/a/mg-gt-red.jpg", JPEG, "image/jpeg").await;
    serve(&server, "/c/mg-gt-red.PNG", PNG, "image/png").await;

    let out = TempDir::new().unwrap();
    let config = config(
        &server,
        &out,
        &["mg-gt-red"],
        &["{base}/a/{id}.jpg", "{base}/b/{id}.jpg", "{base}/c/{id}.PNG"],
    );

    let report = run_static(&config, Some(ResolutionPolicy::CollectAll)).await;
    assert_eq!(
        report.manifest.get("mg-gt-red").unwrap(),
        ["/cars/mg-gt-red.jpg", "/cars/mg-gt-red-2.png"]
    );
    assert!(!out.path().join("mg-gt-red-1.jpg").exists());
    assert_manifest_files_exist(&config, &report.manifest);
}

// ── Properties ──

#[tokio::test]
async fn one_entry_per_entity_and_files_exist() {
    let server = MockServer::start().await;
    serve(&server, "/images/cars/mg3-black.jpg", JPEG, "image/jpeg").await;
    serve(&server, "/images/mg-zs-silver.png", PNG, "image/png").await;

    let out = TempDir::new().unwrap();
    let ids = ["mg3-black", "mg3-grey", "mg-zs-silver", "jetour-t2"];
    let config = config(
        &server,
        &out,
        &ids,
        &["{base}/images/cars/{id}.jpg", "{base}/images/{id}.png"],
    );

    let report = run_static(&config, None).await;

    assert_eq!(report.manifest.len(), ids.len());
    let order: Vec<_> = report.manifest.iter().map(|(id, _)| id).collect();
    assert_eq!(order, ids);
    assert_eq!(report.manifest.resolved_count(), 2);
    assert_manifest_files_exist(&config, &report.manifest);
}

#[tokio::test]
async fn rerun_produces_identical_manifest() {
    let server = MockServer::start().await;
    serve(&server, "/images/cars/mg3-blue.jpg", JPEG, "image/jpeg").await;

    let out = TempDir::new().unwrap();
    let config = config(
        &server,
        &out,
        &["mg3-blue", "mg3-grey"],
        &["{base}/images/cars/{id}.jpg", "{base}/images/{id}.png"],
    );

    run_static(&config, None).await;
    let first = std::fs::read(config.manifest_path()).unwrap();
    run_static(&config, None).await;
    let second = std::fs::read(config.manifest_path()).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn stale_file_removed_when_candidate_now_fails() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    std::fs::write(out.path().join("mg5-silver.jpg"), b"from last week").unwrap();

    let config = config(&server, &out, &["mg5-silver"], &["{base}/images/{id}.jpg"]);
    let report = run_static(&config, None).await;

    assert_eq!(report.manifest.get("mg5-silver"), Some(&[][..]));
    assert!(!out.path().join("mg5-silver.jpg").exists());
}

#[tokio::test]
async fn redirects_followed_and_bounded() {
    let server = MockServer::start().await;
    Mock::given(path("/images/cars/mg-zs-white.jpg"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", "/cdn/zs-white-final.jpg"),
        )
        .mount(&server)
        .await;
    serve(&server, "/cdn/zs-white-final.jpg", JPEG, "image/jpeg").await;
    Mock::given(path("/images/cars/mg-gt-black.jpg"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/images/cars/mg-gt-black.jpg"),
        )
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let mut config = config(
        &server,
        &out,
        &["mg-zs-white", "mg-gt-black"],
        &["{base}/images/cars/{id}.jpg"],
    );
    config.max_redirects = 2;

    let report = run_static(&config, None).await;

    assert_eq!(
        report.manifest.get("mg-zs-white").unwrap(),
        ["/cars/mg-zs-white.jpg"]
    );
    assert_eq!(report.manifest.get("mg-gt-black"), Some(&[][..]));
    assert_eq!(
        report.entities[1].attempts[0].outcome,
        FetchOutcome::TooManyRedirects { limit: 2 }
    );
    assert!(!out.path().join("mg-gt-black.jpg").exists());
}

#[tokio::test]
async fn delay_applies_after_every_attempt() {
    let server = MockServer::start().await;
    serve(&server, "/x/jetour-t2.jpg", JPEG, "image/jpeg").await;

    let out = TempDir::new().unwrap();
    let mut config = config(
        &server,
        &out,
        &["jetour-t2"],
        &["{base}/missing/{id}.jpg", "{base}/x/{id}.jpg", "{base}/y/{id}.jpg"],
    );
    config.request_delay_ms = 60;

    let started = Instant::now();
    let report = run_static(&config, Some(ResolutionPolicy::CollectAll)).await;
    assert_eq!(report.attempts(), 3);
    assert!(started.elapsed() >= Duration::from_millis(180));
}

#[tokio::test]
async fn progress_events_follow_run_order() {
    let server = MockServer::start().await;
    serve(&server, "/images/mg3-blue.jpg", JPEG, "image/jpeg").await;

    let out = TempDir::new().unwrap();
    let config = config(&server, &out, &["mg3-blue"], &["{base}/images/{id}.jpg"]);
    let (tx, mut rx) = progress::channel();
    let source = StaticCatalogSource::from_config(&config);
    let resolver = Resolver::from_config(&config, Duration::ZERO)
        .unwrap()
        .with_progress(tx);

    resolver.run(&source, None).await.unwrap();
    drop(resolver);

    let mut kinds = Vec::new();
    let mut last_seq = 0;
    while let Ok(ev) = rx.recv().await {
        assert!(ev.seq > last_seq);
        last_seq = ev.seq;
        kinds.push(match ev.event {
            ProgressEventKind::SourceReady { .. } => "source",
            ProgressEventKind::EntityStarted { .. } => "start",
            ProgressEventKind::AttemptFinished { success, .. } => {
                assert!(success);
                "attempt"
            }
            ProgressEventKind::EntityResolved { images, .. } => {
                assert_eq!(images, 1);
                "resolved"
            }
            ProgressEventKind::ManifestWritten { .. } => "manifest",
            ProgressEventKind::Warning { .. } => "warning",
        });
    }
    assert_eq!(kinds, ["source", "start", "attempt", "resolved", "manifest"]);
}

// ── Rendered page source ──

struct StaticPage(String);

struct StaticPageContext(String);

#[async_trait]
impl Renderer for StaticPage {
    async fn new_context(&self) -> anyhow::Result<Box<dyn RenderContext>> {
        Ok(Box::new(StaticPageContext(self.0.clone())))
    }
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RenderContext for StaticPageContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> anyhow::Result<NavigationResult> {
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }
    async fn get_html(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn rendered_page_collects_all_card_images() {
    let server = MockServer::start().await;
    serve(&server, "/media/gt-front.jpg", JPEG, "image/jpeg").await;
    serve(&server, "/media/gt-side.webp", PNG, "image/webp").await;

    let html = r#"
        <nav><img src="/media/logo.png"></nav>
        <div class="car-item">
          <h3>MG GT</h3>
          <div class="price">AED 120</div>
          <img src="/media/gt-front.jpg">
          <img data-src="/media/gt-broken.jpg">
          <img src="/media/gt-side.webp">
        </div>
        <div class="car-item">
          <h3>MG GT</h3>
          <img src="/media/gt-front.jpg">
        </div>"#;

    let out = TempDir::new().unwrap();
    let config = config(&server, &out, &[], &["{base}/{id}.jpg"]);
    let page = PageConfig {
        url: format!("{}/rent", server.uri()),
        settle_ms: 0,
        ..PageConfig::default()
    };
    let source = RenderedPageSource::new(Arc::new(StaticPage(html.to_string())), page);
    let resolver = Resolver::from_config(&config, Duration::ZERO).unwrap();

    let report = resolver.run(&source, None).await.unwrap();

    assert_eq!(report.policy, ResolutionPolicy::CollectAll);
    assert_eq!(
        report.manifest.get("mg-gt").unwrap(),
        ["/cars/mg-gt.jpg", "/cars/mg-gt-2.webp"]
    );
    // Second card with the same name gets its own entry.
    assert_eq!(report.manifest.get("mg-gt_2").unwrap(), ["/cars/mg-gt_2.jpg"]);
    assert!(!out.path().join("mg-gt-1.jpg").exists());
    assert_manifest_files_exist(&config, &report.manifest);
}

#[tokio::test]
async fn scraped_ids_never_share_file_names() {
    let server = MockServer::start().await;
    serve(&server, "/media/a.jpg", JPEG, "image/jpeg").await;
    serve(&server, "/media/b.jpg", JPEG, "image/jpeg").await;
    serve(&server, "/media/c.jpg", JPEG, "image/jpeg").await;

    // The unnamed second card falls back to "Car 2", whose id `car-2` is
    // also the stem of the first card's third image.
    let html = r#"
        <div class="car-item">
          <h3>Car</h3>
          <img src="/media/a.jpg">
          <img src="/media/b.jpg">
          <img src="/media/c.jpg">
        </div>
        <div class="car-item">
          <img src="/media/gone.jpg">
        </div>"#;

    let out = TempDir::new().unwrap();
    let config = config(&server, &out, &[], &["{base}/{id}.jpg"]);
    let page = PageConfig {
        url: format!("{}/rent", server.uri()),
        settle_ms: 0,
        ..PageConfig::default()
    };
    let source = RenderedPageSource::new(Arc::new(StaticPage(html.to_string())), page);
    let resolver = Resolver::from_config(&config, Duration::ZERO).unwrap();

    let report = resolver.run(&source, None).await.unwrap();

    assert_eq!(
        report.manifest.get("car").unwrap(),
        ["/cars/car.jpg", "/cars/car-1.jpg", "/cars/car-2.jpg"]
    );
    assert!(!report.manifest.contains("car-2"));
    assert!(report.manifest.get("car-2_2").unwrap().is_empty());
    assert_manifest_files_exist(&config, &report.manifest);
    assert_eq!(std::fs::read(out.path().join("car-2.jpg")).unwrap(), JPEG);
    assert!(!out.path().join("car-2_2.jpg").exists());
}

#[tokio::test]
async fn rich_manifest_keeps_name_and_price() {
    let server = MockServer::start().await;
    serve(&server, "/media/gt.jpg", JPEG, "image/jpeg").await;

    let html = r#"
        <div class="car-item">
          <h3>MG GT</h3>
          <span class="price">AED 120</span>
          <img src="/media/gt.jpg">
        </div>"#;

    let out = TempDir::new().unwrap();
    let config = PipelineConfig {
        rich_manifest: true,
        ..config(&server, &out, &[], &["{base}/{id}.jpg"])
    };
    let page = PageConfig {
        url: format!("{}/rent", server.uri()),
        settle_ms: 0,
        ..PageConfig::default()
    };
    let source = RenderedPageSource::new(Arc::new(StaticPage(html.to_string())), page);
    let resolver = Resolver::from_config(&config, Duration::ZERO).unwrap();

    let report = resolver.run(&source, None).await.unwrap();

    let raw = std::fs::read_to_string(config.manifest_path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        json["mg-gt"],
        serde_json::json!({
            "name": "MG GT",
            "price": "AED 120",
            "images": ["/cars/mg-gt.jpg"],
        })
    );
    let loaded = Manifest::load(&config.manifest_path()).unwrap();
    assert_eq!(loaded, report.manifest);
}
