use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::error::ItemError;
use crate::formats::AppRecord;

/// Path marker every catalog detail URL contains.
pub const DETAIL_PATH_MARKER: &str = "/store/apps/details";

/// `X.Y` or `X.Y.Z` with numeric groups; the first match in a marker block
/// becomes the current version.
static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.)?(\d+\.)(\d+)").expect("valid version pattern"));

static LD_JSON_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid ld+json selector")
});

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid script selector"));

/// The well-known structured-data payload embedded on a detail page.
#[derive(Debug, Deserialize)]
struct LdJsonData {
    name: String,
    #[serde(rename = "applicationCategory")]
    application_category: String,
    #[serde(rename = "aggregateRating")]
    aggregate_rating: Option<AggregateRating>,
}

#[derive(Debug, Deserialize)]
struct AggregateRating {
    #[serde(rename = "ratingValue")]
    rating_value: Option<String>,
}

/// The record id is the `id` query parameter of the detail URL.
pub fn item_id_from_url(url: &str) -> anyhow::Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("parse detail url: {url}"))?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow::anyhow!("detail url has no id parameter: {url}"))
}

/// Turn a fetched detail page into a record.
///
/// The structured-data block is mandatory: a page without a parseable
/// ld+json script yields no record. The version scan on the remaining inline
/// scripts is best-effort and can leave the version unset.
pub fn extract_record(html: &str, url: &str) -> Result<AppRecord, ItemError> {
    let id = item_id_from_url(url).map_err(ItemError::StructuredData)?;

    let document = Html::parse_document(html);
    let ld = parse_ld_json(&document).map_err(ItemError::StructuredData)?;

    let stars = match ld.aggregate_rating.and_then(|rating| rating.rating_value) {
        Some(value) => value
            .parse::<f32>()
            .with_context(|| format!("parse rating value {value:?}"))
            .map_err(ItemError::StructuredData)?,
        None => 0.0,
    };

    let script_texts = inline_script_texts(&document);
    let current_version = scan_version(script_texts.iter().map(String::as_str), &ld.name);

    Ok(AppRecord {
        id,
        name: ld.name,
        stars,
        category: ld.application_category,
        current_version,
    })
}

fn parse_ld_json(document: &Html) -> anyhow::Result<LdJsonData> {
    let node = document
        .select(&LD_JSON_SELECTOR)
        .next()
        .ok_or_else(|| anyhow::anyhow!("page has no ld+json block"))?;
    let text = node.text().collect::<String>();

    serde_json::from_str(text.trim()).context("parse ld+json payload")
}

fn inline_script_texts(document: &Html) -> Vec<String> {
    document
        .select(&SCRIPT_SELECTOR)
        .map(|node| node.text().collect::<String>())
        .collect()
}

/// Scan inline script texts, in document order, for the current version.
///
/// Only the first block containing the name-keyed marker `["<name>"]` is
/// consulted: a version-shaped match inside it wins, anything else yields the
/// literal `"N/A"`, and later blocks are never looked at. Returns `None` when
/// no block carries the marker at all.
pub fn scan_version<'a>(
    script_texts: impl IntoIterator<Item = &'a str>,
    name: &str,
) -> Option<String> {
    let marker = format!("[\"{name}\"]");

    for text in script_texts {
        if !text.contains(&marker) {
            continue;
        }
        let version = match VERSION_PATTERN.find(text) {
            Some(found) => found.as_str().to_owned(),
            None => "N/A".to_owned(),
        };
        return Some(version);
    }

    None
}
