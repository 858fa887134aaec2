use std::collections::HashSet;
use std::time::Duration;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::{registrable_domain, ProductSignals};

const SERP_API_URL: &str = "https://serpapi.com/search.json";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(25);
const MAX_QUERIES: usize = 3;

// Listing, cart and support pages that a product search keeps surfacing.
static NON_PRODUCT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/search", r"/collections", r"/category", r"/c/", r"/s\?", r"/cart", r"/account",
        r"/help", r"/blog",
    ]
    .iter()
    .map(|pattern| Regex::new(&format!("(?i){}", pattern)).unwrap())
    .collect()
});

/// Derives at most three deduplicated search queries from a signal record.
pub fn build_queries(signals: &ProductSignals) -> Vec<String> {
    let title = signals.title.trim();
    let brand = signals.brand.as_deref().unwrap_or("").trim();
    let model = signals
        .identifiers
        .get("model")
        .or_else(|| signals.identifiers.get("mpn"))
        .map(String::as_str)
        .unwrap_or("");

    let brand_model = format!("{} {}", brand, model).trim().to_string();
    let exact = match title.is_empty() {
        true => brand_model.clone(),
        false => format!("\"{}\"", title),
    };
    let narrow = match brand_model.is_empty() {
        true => title.to_string(),
        false => brand_model,
    };
    let broad = format!("{} {}", title, brand).trim().to_string();

    [exact, narrow, broad]
        .into_iter()
        .filter(|query| !query.trim().is_empty())
        .unique()
        .take(MAX_QUERIES)
        .collect()
}

/// Keyed client for the external search provider. A missing key means
/// "provider unavailable": every search degrades to zero results.
pub struct SerpClient {
    client: Client,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct SerpQuery<'a> {
    engine: &'a str,
    q: &'a str,
    num: u8,
    api_key: &'a str,
    hl: &'a str,
    gl: &'a str,
}

#[derive(Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Deserialize)]
struct OrganicResult {
    link: Option<String>,
}

impl SerpClient {
    pub fn new(api_key: String) -> Self {
        let api_key = Some(api_key.trim().to_string()).filter(|key| !key.is_empty());
        SerpClient {
            client: Client::new(),
            api_key,
        }
    }

    /// Ordered organic result links for one query; empty on any failure.
    pub async fn organic_links(&self, query: &str, num: u8) -> Vec<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            log::warn!("Search provider key missing, returning no results");
            return vec![];
        };

        let params = SerpQuery {
            engine: "google",
            q: query,
            num,
            api_key,
            hl: "en",
            gl: "us",
        };
        match self
            .client
            .get(SERP_API_URL)
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => match response.json::<SerpResponse>().await {
                Ok(body) => body
                    .organic_results
                    .into_iter()
                    .filter_map(|result| result.link)
                    .collect(),
                Err(e) => {
                    log::error!("Error when deserializing search response: {:?}", e);
                    vec![]
                }
            },
            Err(e) => {
                log::error!("Got error from search api: {:?}", e);
                vec![]
            }
        }
    }
}

/// Issues every query with the seed's domain excluded and reduces the
/// results to at most `max_candidates` product-looking URLs, one per
/// domain. Never fails; a failed query contributes nothing.
pub async fn search_candidates(
    serp: &SerpClient,
    queries: &[String],
    original_url: &str,
    results_per_query: u8,
    max_candidates: usize,
) -> Vec<String> {
    let mut links = Vec::new();
    let original_domain = registrable_domain(original_url);
    for query in queries {
        let scoped = format!("{} -site:{}", query, original_domain);
        links.extend(serp.organic_links(&scoped, results_per_query).await);
    }
    filter_candidate_urls(links, &original_domain, max_candidates)
}

/// Order-preserving reduction: drop non-product paths, drop the seed's
/// own domain, keep the first URL seen per domain, cap the total.
pub fn filter_candidate_urls(
    urls: Vec<String>,
    original_domain: &str,
    max_candidates: usize,
) -> Vec<String> {
    let mut seen_domains = HashSet::new();
    let mut candidates = Vec::new();

    for url in urls {
        if !looks_like_product_url(&url) {
            continue;
        }
        let domain = registrable_domain(&url);
        if domain.is_empty() || domain == original_domain || seen_domains.contains(&domain) {
            continue;
        }
        seen_domains.insert(domain);
        candidates.push(url);
        if candidates.len() == max_candidates {
            break;
        }
    }

    candidates
}

fn looks_like_product_url(url: &str) -> bool {
    !NON_PRODUCT_PATTERNS.iter().any(|pattern| pattern.is_match(url))
}
