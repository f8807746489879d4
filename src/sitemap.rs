use std::collections::HashSet;
use std::io::Read as _;

use anyhow::Context as _;
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::extract::DETAIL_PATH_MARKER;
use crate::fetch::Fetcher;

/// Distance between the partition start offsets of neighbouring workers.
///
/// Each worker begins at `worker_index * PARTITION_STRIDE` and then steps
/// through the index one entry at a time, so partitions of neighbouring
/// workers may overlap and the tail of a large index may go unvisited. That
/// sampling is intended: every worker stops at its URL quota anyway, and the
/// final aggregate collapses duplicate ids.
pub const PARTITION_STRIDE: usize = 10;

/// Root sitemap index: the ordered sub-sitemap locations, loaded once and
/// shared read-only by all partition workers.
#[derive(Debug, Clone)]
pub struct SitemapIndex {
    locations: Vec<String>,
}

impl SitemapIndex {
    pub async fn load(fetcher: &dyn Fetcher, index_url: &str) -> anyhow::Result<Self> {
        let body = fetcher
            .fetch_bytes(index_url)
            .await
            .with_context(|| format!("fetch sitemap index: {index_url}"))?;
        let xml = String::from_utf8(body).context("sitemap index is not utf-8")?;
        let locations = parse_locations(&xml).context("parse sitemap index")?;

        Ok(Self { locations })
    }

    #[cfg(test)]
    pub(crate) fn from_locations(locations: Vec<String>) -> Self {
        Self { locations }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Sub-sitemap URLs assigned to one worker, in index order. A start
    /// offset past the end of the index yields nothing; there is no
    /// wraparound.
    pub fn partition(&self, worker_index: usize) -> impl Iterator<Item = &str> + '_ {
        self.locations
            .iter()
            .skip(worker_index * PARTITION_STRIDE)
            .map(String::as_str)
    }
}

/// One worker's URL quota: walk the worker's partition of the index, draining
/// sub-sitemaps until `quota` detail URLs are in hand or the partition ends.
pub async fn collect_partition_urls(
    fetcher: &dyn Fetcher,
    index: &SitemapIndex,
    worker_index: usize,
    quota: usize,
) -> anyhow::Result<HashSet<String>> {
    let mut urls: HashSet<String> = HashSet::new();

    for sitemap_url in index.partition(worker_index) {
        if urls.len() >= quota {
            break;
        }
        let batch = extract_item_urls(fetcher, sitemap_url, quota - urls.len()).await?;
        urls.extend(batch);
    }

    Ok(urls)
}

/// Detail-page URLs listed by one gzip-compressed sub-sitemap, capped at
/// `max_count` and short-circuiting once the cap is met.
///
/// Fetch, decompression, and XML failures propagate: sitemaps are
/// infrastructure, and a broken one aborts the run instead of being scored
/// as per-item failures.
pub async fn extract_item_urls(
    fetcher: &dyn Fetcher,
    sitemap_url: &str,
    max_count: usize,
) -> anyhow::Result<HashSet<String>> {
    let mut urls = HashSet::new();
    if max_count == 0 {
        return Ok(urls);
    }

    let body = fetcher
        .fetch_bytes(sitemap_url)
        .await
        .with_context(|| format!("fetch sub-sitemap: {sitemap_url}"))?;

    let mut xml = String::new();
    GzDecoder::new(body.as_slice())
        .read_to_string(&mut xml)
        .with_context(|| format!("decompress sub-sitemap: {sitemap_url}"))?;

    let locations =
        parse_locations(&xml).with_context(|| format!("parse sub-sitemap: {sitemap_url}"))?;
    for location in locations {
        if !location.contains(DETAIL_PATH_MARKER) {
            continue;
        }
        urls.insert(location);
        if urls.len() >= max_count {
            break;
        }
    }

    Ok(urls)
}

/// `<loc>` text values of a sitemap or sitemap-index document, in document
/// order. Works for both `<sitemapindex>` and `<urlset>` roots.
fn parse_locations(xml: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut locations = Vec::new();
    let mut buf = Vec::new();
    let mut in_loc = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .context("read sitemap xml event")?
        {
            Event::Start(start) => {
                in_loc = start.local_name().as_ref() == b"loc";
            }
            Event::Text(text) if in_loc => {
                let value = text.unescape().context("unescape loc text")?;
                let value = value.trim();
                if !value.is_empty() {
                    locations.push(value.to_owned());
                }
            }
            Event::End(_) => {
                in_loc = false;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(locations)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write as _;

    use async_trait::async_trait;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    struct StubFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no fixture for {url}"))
        }
    }

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).expect("gzip write");
        encoder.finish().expect("gzip finish")
    }

    fn urlset(locs: &[&str]) -> String {
        let entries = locs
            .iter()
            .map(|loc| format!("  <url><loc>{loc}</loc></url>\n"))
            .collect::<String>();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{entries}</urlset>\n"
        )
    }

    #[test]
    fn parse_locations_reads_sitemap_index() -> anyhow::Result<()> {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap>
    <loc>https://example.com/sitemaps/part-0.xml.gz</loc>
    <lastmod>2024-01-01</lastmod>
  </sitemap>
  <sitemap>
    <loc> https://example.com/sitemaps/part-1.xml.gz </loc>
  </sitemap>
</sitemapindex>
"#;

        let locations = parse_locations(xml)?;
        assert_eq!(
            locations,
            vec![
                "https://example.com/sitemaps/part-0.xml.gz",
                "https://example.com/sitemaps/part-1.xml.gz",
            ]
        );

        Ok(())
    }

    #[test]
    fn partition_offsets_follow_the_stride() {
        let locations = (0..25).map(|i| format!("sitemap-{i}")).collect();
        let index = SitemapIndex::from_locations(locations);

        let worker0 = index.partition(0).collect::<Vec<_>>();
        assert_eq!(worker0.len(), 25);
        assert_eq!(worker0[0], "sitemap-0");

        let worker1 = index.partition(1).collect::<Vec<_>>();
        assert_eq!(worker1.len(), 15);
        assert_eq!(worker1[0], "sitemap-10");

        assert_eq!(index.partition(3).count(), 0, "offset past the end");
    }

    #[tokio::test]
    async fn extract_item_urls_filters_and_caps() -> anyhow::Result<()> {
        let sitemap_url = "https://example.com/sitemaps/part-0.xml.gz";
        let xml = urlset(&[
            "https://example.com/store/apps/details?id=com.a",
            "https://example.com/store/apps",
            "https://example.com/store/apps/details?id=com.b",
            "https://example.com/store/apps/collection/topselling",
            "https://example.com/about",
        ]);
        let fetcher = StubFetcher {
            responses: HashMap::from([(sitemap_url.to_owned(), gzip(&xml))]),
        };

        let capped = extract_item_urls(&fetcher, sitemap_url, 1).await?;
        assert_eq!(capped.len(), 1);
        assert!(
            capped
                .iter()
                .all(|url| url.contains("/store/apps/details"))
        );

        let all = extract_item_urls(&fetcher, sitemap_url, 10).await?;
        assert_eq!(all.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn extract_item_urls_rejects_uncompressed_body() {
        let sitemap_url = "https://example.com/sitemaps/part-0.xml.gz";
        let fetcher = StubFetcher {
            responses: HashMap::from([(sitemap_url.to_owned(), urlset(&[]).into_bytes())]),
        };

        let err = extract_item_urls(&fetcher, sitemap_url, 5)
            .await
            .expect_err("plain xml must not pass for gzip");
        assert!(format!("{err:#}").contains("decompress"));
    }

    #[tokio::test]
    async fn collect_partition_urls_spans_sub_sitemaps_until_quota() -> anyhow::Result<()> {
        let first = urlset(&[
            "https://example.com/store/apps/details?id=com.a",
            "https://example.com/store/apps/details?id=com.b",
        ]);
        let second = urlset(&["https://example.com/store/apps/details?id=com.c"]);
        let fetcher = StubFetcher {
            responses: HashMap::from([
                ("https://example.com/s/0.xml.gz".to_owned(), gzip(&first)),
                ("https://example.com/s/1.xml.gz".to_owned(), gzip(&second)),
            ]),
        };
        let index = SitemapIndex::from_locations(vec![
            "https://example.com/s/0.xml.gz".to_owned(),
            "https://example.com/s/1.xml.gz".to_owned(),
        ]);

        let urls = collect_partition_urls(&fetcher, &index, 0, 3).await?;
        assert_eq!(urls.len(), 3);

        // Quota met by the first sub-sitemap: the second is never fetched,
        // so a missing fixture for it would not matter either.
        let urls = collect_partition_urls(&fetcher, &index, 0, 2).await?;
        assert_eq!(urls.len(), 2);
        assert!(!urls.contains("https://example.com/store/apps/details?id=com.c"));

        Ok(())
    }

    #[tokio::test]
    async fn collect_partition_urls_is_empty_past_the_index() -> anyhow::Result<()> {
        let fetcher = StubFetcher {
            responses: HashMap::new(),
        };
        let index = SitemapIndex::from_locations(vec!["https://example.com/s/0.xml.gz".to_owned()]);

        let urls = collect_partition_urls(&fetcher, &index, 2, 5).await?;
        assert!(urls.is_empty());

        Ok(())
    }
}
