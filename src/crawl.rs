use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;

use crate::cli::CrawlArgs;
use crate::error::ItemError;
use crate::extract;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::formats::AppRecord;
use crate::sitemap::{self, SitemapIndex};
use crate::store;

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let started_at = Instant::now();

    if args.workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }

    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output dir: {}", out_dir.display()))?;
    let out_dir = out_dir
        .canonicalize()
        .with_context(|| format!("resolve output dir: {}", out_dir.display()))?;

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new().context("build transport")?);

    let index = Arc::new(
        SitemapIndex::load(fetcher.as_ref(), &args.sitemap_url)
            .await
            .context("load sitemap index")?,
    );
    tracing::info!(sub_sitemaps = index.len(), "loaded sitemap index");

    let (records, failures) = crawl_catalog(
        fetcher,
        index,
        args.max_items / args.workers,
        args.workers,
        &out_dir,
    )
    .await?;

    if failures.transport > 0 || failures.structured_data > 0 {
        tracing::warn!(
            transport = failures.transport,
            structured_data = failures.structured_data,
            "items dropped"
        );
    }

    let elapsed_ms = started_at.elapsed().as_millis();
    println!("Fetched {} apps in {elapsed_ms}ms", records.len());
    println!("App metadata stored at {}", out_dir.display());

    Ok(())
}

#[derive(Debug, Default)]
struct FailureTally {
    transport: usize,
    structured_data: usize,
}

impl FailureTally {
    fn count(&mut self, err: &ItemError) {
        match err {
            ItemError::Transport(_) => self.transport += 1,
            ItemError::StructuredData(_) => self.structured_data += 1,
        }
    }
}

/// Fan out partition workers over the shared index and gather every outcome.
///
/// Successful records are unioned into a map keyed by id, so the same app
/// reached through two overlapping partitions lands once. Failures are only
/// tallied; they never join the aggregate.
async fn crawl_catalog(
    fetcher: Arc<dyn Fetcher>,
    index: Arc<SitemapIndex>,
    quota: usize,
    workers: usize,
    out_dir: &Path,
) -> anyhow::Result<(HashMap<String, AppRecord>, FailureTally)> {
    let mut partitions = tokio::task::JoinSet::new();
    for worker_index in 0..workers {
        let fetcher = fetcher.clone();
        let index = index.clone();
        let out_dir = out_dir.to_owned();
        partitions.spawn(async move {
            crawl_partition(fetcher, index, worker_index, quota, out_dir).await
        });
    }

    let mut records: HashMap<String, AppRecord> = HashMap::new();
    let mut failures = FailureTally::default();

    while let Some(joined) = partitions.join_next().await {
        let outcomes = joined.context("join partition worker")??;
        for outcome in outcomes {
            match outcome {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(err) => failures.count(&err),
            }
        }
    }

    Ok((records, failures))
}

/// One partition worker: pull the URL quota from the assigned slice of the
/// index, then fetch every page at once and wait for all of them.
async fn crawl_partition(
    fetcher: Arc<dyn Fetcher>,
    index: Arc<SitemapIndex>,
    worker_index: usize,
    quota: usize,
    out_dir: PathBuf,
) -> anyhow::Result<Vec<Result<AppRecord, ItemError>>> {
    tracing::info!(worker = worker_index, quota, "partition worker started");

    let urls = sitemap::collect_partition_urls(fetcher.as_ref(), &index, worker_index, quota)
        .await
        .with_context(|| format!("collect urls for worker {worker_index}"))?;
    tracing::info!(worker = worker_index, urls = urls.len(), "partition urls retrieved");

    let mut fetches = tokio::task::JoinSet::new();
    for url in urls {
        let fetcher = fetcher.clone();
        let out_dir = out_dir.clone();
        fetches.spawn(async move { fetch_and_store(fetcher.as_ref(), &url, &out_dir).await });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = fetches.join_next().await {
        outcomes.push(joined.context("join page fetch")?);
    }

    let fetched = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    tracing::info!(worker = worker_index, fetched, "partition worker finished");

    Ok(outcomes)
}

/// Fetch one detail page, extract its record, and persist it keyed by id.
/// Every per-item fault collapses into an [`ItemError`]; sorting out what to
/// do with it is the caller's business.
pub async fn fetch_and_store(
    fetcher: &dyn Fetcher,
    url: &str,
    out_dir: &Path,
) -> Result<AppRecord, ItemError> {
    let outcome = fetch_and_store_inner(fetcher, url, out_dir).await;
    if let Err(err) = &outcome {
        tracing::warn!(url, kind = err.kind(), error = %err, "detail page dropped");
    }

    outcome
}

async fn fetch_and_store_inner(
    fetcher: &dyn Fetcher,
    url: &str,
    out_dir: &Path,
) -> Result<AppRecord, ItemError> {
    let body = fetcher
        .fetch_bytes(url)
        .await
        .map_err(ItemError::Transport)?;
    let html = String::from_utf8_lossy(&body);

    let record = extract::extract_record(&html, url)?;
    store::write_record(out_dir, &record).map_err(ItemError::Transport)?;

    Ok(record)
}
