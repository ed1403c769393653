//! End-to-end crawls against an in-memory site.

use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use spider_engine::downloader::ActiveRequests;
use spider_engine::middlewares::NON_200_REASON;
use spider_engine::prelude::*;
use spider_engine::spider::Seeds;
use spider_engine::EngineState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PAGE: RecordSchema = RecordSchema::new("Page", &["path"]);
const BASE: &str = "http://site.test";
/// A seed that the spider fails to build.
const BROKEN_SEED: &str = "!broken";

/// An in-memory site: every page answers with its status and one link per line.
struct Site {
    pages: HashMap<&'static str, (u16, Vec<&'static str>)>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    fetches: Mutex<Vec<String>>,
}

impl Site {
    /// `pages` holds `(path, status, links)` with the links separated by spaces.
    fn new(pages: &[(&'static str, u16, &'static str)]) -> Arc<Self> {
        Arc::new(Site {
            pages: pages
                .iter()
                .map(|(path, status, links)| {
                    (*path, (*status, links.split_whitespace().collect()))
                })
                .collect(),
            latency: Duration::from_millis(5),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fetches: Mutex::new(Vec::new()),
        })
    }

    fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().iter().filter(|p| *p == path).count()
    }
}

struct SiteDownloader {
    site: Arc<Site>,
    active: ActiveRequests,
}

impl SiteDownloader {
    fn new(site: &Arc<Site>) -> Self {
        SiteDownloader {
            site: Arc::clone(site),
            active: ActiveRequests::new(),
        }
    }
}

#[async_trait]
impl Downloader for SiteDownloader {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn download(&self, request: &Request) -> Result<Response, DownloadError> {
        let now = self.site.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.site.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.site.latency).await;
        self.site.in_flight.fetch_sub(1, Ordering::SeqCst);

        let path = request.url.path().to_string();
        self.site.fetches.lock().push(path.clone());
        let Some((status, links)) = self.site.pages.get(path.as_str()) else {
            return Err(DownloadError::Connect(format!("no route to {path}")));
        };
        let status = reqwest::StatusCode::from_u16(*status)
            .map_err(|e| DownloadError::Other(e.to_string()))?;
        Ok(Response::ok(request.clone(), links.join("\n")).with_status(status))
    }

    fn active(&self) -> &ActiveRequests {
        &self.active
    }
}

/// Records every page it sees and follows every link.
struct SiteSpider {
    seeds: Vec<&'static str>,
    opened: Arc<AtomicBool>,
    closed: Arc<Mutex<Option<String>>>,
}

impl SiteSpider {
    fn new(seeds: &[&'static str]) -> Self {
        SiteSpider {
            seeds: seeds.to_vec(),
            opened: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl Spider for SiteSpider {
    fn name(&self) -> &str {
        "site"
    }

    fn start_requests(&self) -> Seeds {
        let seeds: Vec<_> = self
            .seeds
            .iter()
            .map(|path| match *path {
                BROKEN_SEED => Err(SpiderError::GeneralError("cannot build seed".into())),
                path => Request::get(&format!("{BASE}{path}")),
            })
            .collect();
        stream::iter(seeds).boxed()
    }

    fn parse(&self, response: Response) -> Outputs {
        outputs_async(async move {
            let mut outputs: Vec<Output> =
                vec![PAGE.record().with("path", response.url.path())?.into()];
            for link in response.text()?.lines().filter(|l| !l.is_empty()) {
                outputs.push(Request::new(response.urljoin(link)?).into());
            }
            Ok(outputs)
        })
    }

    async fn opened(&self) {
        self.opened.store(true, Ordering::SeqCst);
    }

    async fn closed(&self, reason: &str) {
        *self.closed.lock() = Some(reason.to_string());
    }
}

/// Collects the paths of every finalized record.
#[derive(Clone, Default)]
struct Collect {
    paths: Arc<Mutex<Vec<String>>>,
}

impl Collect {
    fn sorted(&self) -> Vec<String> {
        let mut paths = self.paths.lock().clone();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Pipeline for Collect {
    fn name(&self) -> &str {
        "collect"
    }

    async fn process_record(&self, record: Record) -> Result<Option<Record>, SpiderError> {
        if let Some(path) = record.get("path")?.and_then(|v| v.as_str()) {
            self.paths.lock().push(path.to_string());
        }
        Ok(Some(record))
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn builder(spider: SiteSpider, site: &Arc<Site>, collect: &Collect) -> CrawlerBuilder<SiteSpider> {
    init_logging();
    CrawlerBuilder::new(spider)
        .downloader(SiteDownloader::new(site))
        .add_pipeline(collect.clone())
        .scheduler_poll_interval(Duration::from_millis(10))
        .handle_ctrl_c(false)
        .stats_dump(false)
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn follows_links_until_the_site_is_exhausted() {
    let site = Site::new(&[
        ("/", 200, "/a /b"),
        ("/a", 200, "/c"),
        ("/b", 200, ""),
        ("/c", 200, ""),
    ]);
    let collect = Collect::default();
    let spider = SiteSpider::new(&["/"]);
    let opened = Arc::clone(&spider.opened);
    let closed = Arc::clone(&spider.closed);

    let crawler = builder(spider, &site, &collect).build().await.unwrap();
    let stats = crawler.get_stats();
    let handle = crawler.handle();
    assert_eq!(handle.state(), EngineState::Idle);

    crawler.start_crawl().await.unwrap();

    assert_eq!(collect.sorted(), vec!["/", "/a", "/b", "/c"]);
    assert_eq!(handle.state(), EngineState::Closed);
    assert_eq!(stats.finish_reason().as_deref(), Some("finished"));
    assert_eq!(stats.requests_enqueued.load(Ordering::SeqCst), 4);
    assert_eq!(stats.responses_received.load(Ordering::SeqCst), 4);
    assert_eq!(stats.records_processed.load(Ordering::SeqCst), 4);
    assert!(eventually(|| opened.load(Ordering::SeqCst)).await);
    assert!(eventually(|| closed.lock().as_deref() == Some("finished")).await);
}

#[tokio::test]
async fn seed_error_ends_the_seeds_but_finishes_in_flight_work() {
    let site = Site::new(&[("/a", 200, "/c"), ("/b", 200, ""), ("/c", 200, "")]);
    let collect = Collect::default();
    let spider = SiteSpider::new(&["/a", BROKEN_SEED, "/b"]);
    let closed = Arc::clone(&spider.closed);

    let crawler = builder(spider, &site, &collect).build().await.unwrap();
    let stats = crawler.get_stats();
    crawler.start_crawl().await.unwrap();

    assert_eq!(collect.sorted(), vec!["/a", "/c"]);
    assert_eq!(site.fetch_count("/b"), 0);
    assert_eq!(stats.finish_reason().as_deref(), Some("finished"));
    assert!(eventually(|| closed.lock().as_deref() == Some("finished")).await);
}

struct RedoOnce {
    redone: AtomicBool,
}

#[async_trait]
impl Middleware for RedoOnce {
    fn name(&self) -> &str {
        "redo_once"
    }

    fn hooks(&self) -> Hooks {
        Hooks::RESPONSE
    }

    async fn process_response(
        &self,
        request: &Request,
        response: Response,
    ) -> Result<ResponseAction, SpiderError> {
        if request.url.path() == "/flaky" && !self.redone.swap(true, Ordering::SeqCst) {
            return Ok(ResponseAction::Reschedule(Request::new(request.url.clone())));
        }
        Ok(ResponseAction::Continue(response))
    }
}

#[tokio::test]
async fn rescheduled_response_produces_no_output() {
    let site = Site::new(&[("/flaky", 200, "")]);
    let collect = Collect::default();

    let crawler = builder(SiteSpider::new(&["/flaky"]), &site, &collect)
        .add_middleware(RedoOnce {
            redone: AtomicBool::new(false),
        })
        .build()
        .await
        .unwrap();
    let stats = crawler.get_stats();
    crawler.start_crawl().await.unwrap();

    // The first fetch was rescheduled and only the second produced a record.
    assert_eq!(site.fetch_count("/flaky"), 2);
    assert_eq!(collect.sorted(), vec!["/flaky"]);
    assert_eq!(stats.requests_rescheduled.load(Ordering::SeqCst), 1);
    assert_eq!(stats.finish_reason().as_deref(), Some("finished"));
}

#[tokio::test]
async fn download_failure_is_reported_and_the_crawl_goes_on() {
    let site = Site::new(&[("/ok", 200, "")]);
    let collect = Collect::default();

    let crawler = builder(SiteSpider::new(&["/broken", "/ok"]), &site, &collect)
        .build()
        .await
        .unwrap();
    let stats = crawler.get_stats();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    crawler.events().subscribe(EventKind::Error, move |event| {
        let seen = Arc::clone(&seen);
        async move {
            if let Event::Error { error, source } = event {
                seen.lock().push((error.kind(), source));
            }
        }
    });

    crawler.start_crawl().await.unwrap();

    assert_eq!(collect.sorted(), vec!["/ok"]);
    assert_eq!(stats.download_errors_for("connect"), 1);
    assert_eq!(stats.errors.load(Ordering::SeqCst), 1);
    assert!(eventually(|| errors.lock().as_slice() == [("connect", "downloader".to_string())]).await);
    assert_eq!(stats.finish_reason().as_deref(), Some("finished"));
}

#[tokio::test]
async fn filtered_responses_are_ignored_and_counted() {
    let site = Site::new(&[
        ("/", 200, "/missing /here"),
        ("/missing", 404, ""),
        ("/here", 200, ""),
    ]);
    let collect = Collect::default();

    let crawler = builder(SiteSpider::new(&["/"]), &site, &collect)
        .with_middleware_kind(MiddlewareKind::ResponseFilter)
        .build()
        .await
        .unwrap();
    let stats = crawler.get_stats();
    crawler.start_crawl().await.unwrap();

    assert_eq!(collect.sorted(), vec!["/", "/here"]);
    assert_eq!(stats.requests_ignored.load(Ordering::SeqCst), 1);
    assert_eq!(stats.ignored_for(NON_200_REASON), 1);
    assert_eq!(stats.errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrency_limit_bounds_in_flight_fetches() {
    let links = "/1 /2 /3 /4 /5 /6 /7 /8";
    let mut pages = vec![("/", 200, links)];
    pages.extend(links.split_whitespace().map(|path| (path, 200, "")));
    let site = Site::new(&pages);
    let collect = Collect::default();

    let crawler = builder(SiteSpider::new(&["/"]), &site, &collect)
        .concurrency(2)
        .build()
        .await
        .unwrap();
    crawler.start_crawl().await.unwrap();

    assert_eq!(collect.sorted().len(), 9);
    assert!(site.peak.load(Ordering::SeqCst) <= 2);
}

/// A spider whose seeds never run out.
struct Endless;

impl Spider for Endless {
    fn name(&self) -> &str {
        "endless"
    }

    fn start_requests(&self) -> Seeds {
        stream::iter(0u64..)
            .map(|n| Request::get(&format!("{BASE}/page/{n}")))
            .boxed()
    }

    fn parse(&self, _response: Response) -> Outputs {
        no_outputs()
    }
}

struct AnyPage {
    active: ActiveRequests,
}

#[async_trait]
impl Downloader for AnyPage {
    fn name(&self) -> &str {
        "any_page"
    }

    async fn download(&self, request: &Request) -> Result<Response, DownloadError> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(Response::ok(request.clone(), "ok"))
    }

    fn active(&self) -> &ActiveRequests {
        &self.active
    }
}

#[tokio::test]
async fn stop_through_the_handle_drains_and_closes() {
    init_logging();
    let crawler = CrawlerBuilder::new(Endless)
        .downloader(AnyPage {
            active: ActiveRequests::new(),
        })
        .concurrency(4)
        .handle_ctrl_c(false)
        .stats_dump(false)
        .build()
        .await
        .unwrap();
    let stats = crawler.get_stats();
    let handle = crawler.handle();

    let stopper = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.stop();
    });

    tokio::time::timeout(Duration::from_secs(10), crawler.start_crawl())
        .await
        .expect("crawl did not stop")
        .unwrap();

    assert!(handle.is_stopping());
    assert_eq!(handle.state(), EngineState::Closed);
    assert_eq!(stats.finish_reason().as_deref(), Some("shutdown"));
    assert!(stats.responses_received.load(Ordering::SeqCst) > 0);
    // Everything that was sent was also answered before closing.
    assert_eq!(
        stats.requests_sent.load(Ordering::SeqCst),
        stats.requests_succeeded.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn process_runs_every_crawler_to_completion() {
    let first_site = Site::new(&[("/", 200, "/a"), ("/a", 200, "")]);
    let second_site = Site::new(&[("/", 200, "/x /y"), ("/x", 200, ""), ("/y", 200, "")]);
    let first_pages = Collect::default();
    let second_pages = Collect::default();

    let mut process = CrawlerProcess::new().handle_ctrl_c(false);
    let first = builder(SiteSpider::new(&["/"]), &first_site, &first_pages)
        .build()
        .await
        .unwrap();
    let second = builder(SiteSpider::new(&["/"]), &second_site, &second_pages)
        .build()
        .await
        .unwrap();
    let stats = [first.get_stats(), second.get_stats()];
    process.add(first);
    process.add(second);
    assert_eq!(process.len(), 2);
    let handles = process.handles();

    tokio::time::timeout(Duration::from_secs(10), process.start())
        .await
        .expect("process did not finish")
        .unwrap();

    assert_eq!(first_pages.sorted(), vec!["/", "/a"]);
    assert_eq!(second_pages.sorted(), vec!["/", "/x", "/y"]);
    for (stats, handle) in stats.iter().zip(&handles) {
        assert_eq!(stats.finish_reason().as_deref(), Some("finished"));
        assert_eq!(handle.state(), EngineState::Closed);
    }
}

#[tokio::test]
async fn stopping_the_process_drains_every_crawler() {
    init_logging();
    let mut process = CrawlerProcess::new().handle_ctrl_c(false);
    let mut stats = Vec::new();
    for _ in 0..2 {
        let crawler = CrawlerBuilder::new(Endless)
            .downloader(AnyPage {
                active: ActiveRequests::new(),
            })
            .concurrency(2)
            .handle_ctrl_c(false)
            .stats_dump(false)
            .build()
            .await
            .unwrap();
        stats.push(crawler.get_stats());
        process.add(crawler);
    }

    let handles = process.handles();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        for handle in &handles {
            handle.stop();
        }
    });

    tokio::time::timeout(Duration::from_secs(10), process.start())
        .await
        .expect("process did not stop")
        .unwrap();

    for stats in &stats {
        assert_eq!(stats.finish_reason().as_deref(), Some("shutdown"));
        assert!(stats.responses_received.load(Ordering::SeqCst) > 0);
    }
}
