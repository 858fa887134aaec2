use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client,
};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use strsim::normalized_levenshtein;
use tokio::sync::Semaphore;

use crate::configuration::{PipelineSettings, SimilarityWeights};
use crate::domain::{registrable_domain, ProductSignals, ScoredCandidate, IDENTIFIER_KINDS};

use super::{extract_product_signals, PageFetcher};

const MAX_EMBEDDED_ATTRIBUTES: usize = 8;
const MAX_COMPARED_ATTRIBUTES: usize = 12;
const MAX_MATCHING_IDENTIFIERS: f64 = 2.0;
const ATTRIBUTE_FUZZY_FLOOR: f64 = 0.85;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// Batch embedding client for the external provider. Any failure,
/// including a missing key, degrades to no vectors.
pub struct EmbeddingClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl EmbeddingClient {
    pub fn new(api_key: String, model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        EmbeddingClient {
            client: Client::with_config(config),
            model,
        }
    }

    /// One vector per input text, order-preserving; empty on any failure.
    pub async fn embed(&self, texts: Vec<String>) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return vec![];
        }

        let request = match CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts)
            .build()
        {
            Ok(request) => request,
            Err(e) => {
                log::error!("Failed to build embedding request: {:?}", e);
                return vec![];
            }
        };

        match self.client.embeddings().create(request).await {
            Ok(response) => response.data.into_iter().map(|d| d.embedding).collect(),
            Err(e) => {
                log::error!("Got error from embedding api: {:?}", e);
                vec![]
            }
        }
    }
}

/// Extracts signals for every candidate with bounded parallelism, embeds
/// seed and survivors in one batch, fuses the similarity signals and
/// returns the ranked, thresholded top of the list.
pub async fn score_candidates(
    fetcher: &PageFetcher,
    embedder: &EmbeddingClient,
    settings: &PipelineSettings,
    seed: &ProductSignals,
    candidate_urls: Vec<String>,
) -> Vec<ScoredCandidate> {
    let semaphore = Arc::new(Semaphore::new(settings.extract_concurrency.max(1)));
    let mut handles = Vec::with_capacity(candidate_urls.len());
    for url in candidate_urls {
        let semaphore = Arc::clone(&semaphore);
        let fetcher = fetcher.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            Some(extract_product_signals(&fetcher, &url).await)
        }));
    }

    let mut candidates = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(signals)) => candidates.push(signals),
            Ok(None) => {}
            // One failed candidate never affects the others.
            Err(e) => log::error!("Candidate extraction task failed: {:?}", e),
        }
    }

    if candidates.is_empty() {
        return vec![];
    }

    let mut texts = Vec::with_capacity(candidates.len() + 1);
    texts.push(embedding_text(seed));
    texts.extend(candidates.iter().map(embedding_text));

    let mut embeddings = embedder.embed(texts).await;
    let (seed_embedding, candidate_embeddings) = if embeddings.len() == candidates.len() + 1 {
        (embeddings.remove(0), embeddings)
    } else {
        if !embeddings.is_empty() {
            log::warn!(
                "Embedding count mismatch: got {} vectors for {} inputs",
                embeddings.len(),
                candidates.len() + 1
            );
        }
        (vec![], vec![vec![]; candidates.len()])
    };

    let scored = candidates
        .into_iter()
        .zip(candidate_embeddings)
        .map(|(signals, embedding)| {
            let similarity = compute_similarity(
                seed,
                &signals,
                &seed_embedding,
                &embedding,
                &settings.weights,
            );
            ScoredCandidate {
                domain: registrable_domain(&signals.url),
                similarity,
                signals,
            }
        })
        .collect();

    rank_candidates(scored, settings.similarity_floor, settings.max_competitors)
}

/// Sort descending, apply the minimum-similarity floor, keep the top N.
pub fn rank_candidates(
    mut scored: Vec<ScoredCandidate>,
    similarity_floor: f64,
    max_competitors: usize,
) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    scored.retain(|candidate| candidate.similarity >= similarity_floor);
    scored.truncate(max_competitors);
    scored
}

/// Text fed to the embedding provider for one record: title, brand,
/// identifier values and the first few attribute pairs.
pub fn embedding_text(signals: &ProductSignals) -> String {
    let identifiers = signals.identifiers.values().join(" ");
    let attributes = signals
        .attributes
        .iter()
        .take(MAX_EMBEDDED_ATTRIBUTES)
        .map(|(key, value)| format!("{}:{}", key, value))
        .join(" ");

    [
        signals.title.as_str(),
        signals.brand.as_deref().unwrap_or(""),
        identifiers.as_str(),
        attributes.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .join(" ")
}

/// Weighted fusion of the individual similarity signals into [0, 1].
pub fn compute_similarity(
    seed: &ProductSignals,
    candidate: &ProductSignals,
    seed_embedding: &[f32],
    candidate_embedding: &[f32],
    weights: &SimilarityWeights,
) -> f64 {
    let s_emb = cosine(seed_embedding, candidate_embedding);

    let s_title = token_set_ratio(
        &seed.title.to_lowercase(),
        &candidate.title.to_lowercase(),
    );

    let mut matching: f64 = 0.0;
    for kind in IDENTIFIER_KINDS {
        if let (Some(a), Some(b)) = (seed.identifiers.get(kind), candidate.identifiers.get(kind)) {
            // Exact string equality only; formatting differences count
            // as a miss.
            if !a.is_empty() && a == b {
                matching += 1.0;
            }
        }
    }
    let s_id = matching.min(MAX_MATCHING_IDENTIFIERS) / MAX_MATCHING_IDENTIFIERS;

    let seed_brand = seed.brand.as_deref().unwrap_or("").to_lowercase();
    let candidate_brand = candidate.brand.as_deref().unwrap_or("").to_lowercase();
    let s_brand = match !seed_brand.is_empty() && seed_brand == candidate_brand {
        true => 1.0,
        false => 0.0,
    };

    let matches = seed
        .attributes
        .iter()
        .filter_map(|(key, value)| candidate.attributes.get(key).map(|other| (value, other)))
        .take(MAX_COMPARED_ATTRIBUTES)
        .filter(|(value, other)| attribute_values_match(value, other))
        .count();
    let denominator = seed
        .attributes
        .len()
        .min(candidate.attributes.len())
        .max(1);
    let s_attr = matches as f64 / denominator as f64;

    weights.embedding * s_emb
        + weights.title * s_title
        + weights.identifier * s_id
        + weights.brand * s_brand
        + weights.attribute * s_attr
}

/// Cosine similarity; 0 when either vector is absent or degenerate.
fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += *x as f64 * *y as f64;
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Token-set ratio in [0, 1]: the best edit-distance ratio between the
/// shared-token core and each side's remainder, so word order and
/// repeated words don't matter.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    if tokens_a == tokens_b {
        return 1.0;
    }

    let common = tokens_a.intersection(&tokens_b).join(" ");
    let only_a = tokens_a.difference(&tokens_b).join(" ");
    let only_b = tokens_b.difference(&tokens_a).join(" ");

    let left = join_tokens(&common, &only_a);
    let right = join_tokens(&common, &only_b);

    [
        normalized_levenshtein(&common, &left),
        normalized_levenshtein(&common, &right),
        normalized_levenshtein(&left, &right),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}

fn join_tokens(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{} {}", base, rest),
    }
}

/// Two attribute values match when they share an embedded number token or
/// their fuzzy ratio clears the floor.
fn attribute_values_match(a: &str, b: &str) -> bool {
    if a.trim().is_empty() || b.trim().is_empty() {
        return false;
    }

    let numbers_a: Vec<&str> = NUMBER_RE.find_iter(a).map(|m| m.as_str()).collect();
    let numbers_b: Vec<&str> = NUMBER_RE.find_iter(b).map(|m| m.as_str()).collect();
    if !numbers_a.is_empty() && numbers_a.iter().any(|n| numbers_b.contains(n)) {
        return true;
    }

    token_set_ratio(&normalize_value(a), &normalize_value(b)) >= ATTRIBUTE_FUZZY_FLOOR
}

fn normalize_value(text: &str) -> String {
    text.to_lowercase().split_whitespace().join(" ")
}

#[cfg(test)]
mod tests {
    use crate::configuration::SimilarityWeights;
    use crate::domain::{ProductSignals, ScoredCandidate};

    use super::{
        attribute_values_match, compute_similarity, cosine, embedding_text, rank_candidates,
        token_set_ratio,
    };

    fn full_signals(url: &str) -> ProductSignals {
        let mut signals = ProductSignals::empty(url);
        signals.title = "Acme Blender X-200".to_string();
        signals.brand = Some("Acme".to_string());
        signals
            .identifiers
            .insert("gtin".to_string(), "01234567890123".to_string());
        signals
            .identifiers
            .insert("model".to_string(), "X-200".to_string());
        signals
            .attributes
            .insert("color".to_string(), "Black".to_string());
        signals
            .attributes
            .insert("jar_capacity".to_string(), "1.5 L".to_string());
        signals
    }

    #[test]
    fn token_set_ratio_ignores_order_and_duplicates() {
        assert_eq!(token_set_ratio("acme blender x-200", "acme blender x-200"), 1.0);
        assert_eq!(token_set_ratio("blender acme x-200", "acme blender x-200"), 1.0);
        assert_eq!(token_set_ratio("acme acme blender", "blender acme"), 1.0);
        assert_eq!(token_set_ratio("", "acme"), 0.0);
        assert_eq!(token_set_ratio("", ""), 0.0);
    }

    #[test]
    fn token_set_ratio_subset_counts_as_full_match() {
        // One title being a token subset of the other is the classic
        // store-suffix case.
        assert_eq!(
            token_set_ratio("wireless mouse m185", "wireless mouse m185 black edition"),
            1.0
        );
    }

    #[test]
    fn token_set_ratio_disjoint_is_low() {
        assert!(token_set_ratio("garden hose", "usb charger") < 0.5);
    }

    #[test]
    fn cosine_handles_missing_and_degenerate_vectors() {
        assert_eq!(cosine(&[], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn attribute_values_match_on_shared_number_or_fuzzy_text() {
        assert!(attribute_values_match("6.1 in", "screen 6.1 inches"));
        assert!(attribute_values_match("Stainless Steel", "stainless  steel"));
        assert!(!attribute_values_match("Red", "Blue"));
        assert!(!attribute_values_match("", "Blue"));
    }

    #[test]
    fn identical_records_with_equal_embeddings_score_one() {
        let seed = full_signals("https://acme.com/p/1");
        let candidate = full_signals("https://rival.com/p/1");
        let embedding = vec![0.6f32, 0.8];

        let similarity = compute_similarity(
            &seed,
            &candidate,
            &embedding,
            &embedding,
            &SimilarityWeights::default(),
        );

        assert!((similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_embeddings_still_rank_on_remaining_signals() {
        let seed = full_signals("https://acme.com/p/1");
        let candidate = full_signals("https://rival.com/p/1");
        let weights = SimilarityWeights::default();

        let similarity = compute_similarity(&seed, &candidate, &[], &[], &weights);

        // Everything except the embedding signal: 0.22 + 0.18 + 0.10 + 0.10.
        assert!((similarity - 0.60).abs() < 1e-9);
        assert!(similarity >= 0.50);
    }

    #[test]
    fn identifier_overlap_is_capped_at_two() {
        let mut seed = full_signals("https://acme.com/p/1");
        let mut candidate = full_signals("https://rival.com/p/1");
        for signals in [&mut seed, &mut candidate] {
            signals
                .identifiers
                .insert("mpn".to_string(), "MPN-77".to_string());
            signals
                .identifiers
                .insert("sku".to_string(), "SKU-88".to_string());
        }
        // Zero out every other signal to isolate s_id.
        let weights = SimilarityWeights {
            embedding: 0.0,
            title: 0.0,
            identifier: 1.0,
            brand: 0.0,
            attribute: 0.0,
        };

        let similarity = compute_similarity(&seed, &candidate, &[], &[], &weights);

        assert!((similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn differing_identifier_values_do_not_match() {
        let seed = full_signals("https://acme.com/p/1");
        let mut candidate = full_signals("https://rival.com/p/1");
        candidate
            .identifiers
            .insert("gtin".to_string(), "1234567890123".to_string());
        candidate
            .identifiers
            .insert("model".to_string(), "X-300".to_string());
        let weights = SimilarityWeights {
            embedding: 0.0,
            title: 0.0,
            identifier: 1.0,
            brand: 0.0,
            attribute: 0.0,
        };

        let similarity = compute_similarity(&seed, &candidate, &[], &[], &weights);

        assert_eq!(similarity, 0.0);
    }

    #[test]
    fn embedding_text_caps_attribute_pairs() {
        let mut signals = full_signals("https://acme.com/p/1");
        for i in 0..20 {
            signals
                .attributes
                .insert(format!("key_{:02}", i), format!("value {}", i));
        }

        let text = embedding_text(&signals);

        assert!(text.starts_with("Acme Blender X-200 Acme"));
        assert_eq!(text.matches(':').count(), 8);
    }

    #[test]
    fn rank_candidates_sorts_filters_and_truncates() {
        let scored: Vec<ScoredCandidate> = [0.42, 0.91, 0.55, 0.77, 0.50, 0.63, 0.88, 0.49]
            .iter()
            .enumerate()
            .map(|(i, similarity)| ScoredCandidate {
                domain: format!("store{}.com", i),
                similarity: *similarity,
                signals: ProductSignals::empty(&format!("https://store{}.com/p", i)),
            })
            .collect();

        let ranked = rank_candidates(scored, 0.50, 5);

        let similarities: Vec<f64> = ranked.iter().map(|c| c.similarity).collect();
        assert_eq!(similarities, vec![0.91, 0.88, 0.77, 0.63, 0.55]);
        assert!(ranked.iter().all(|c| c.similarity >= 0.50));
        assert!(ranked.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }
}
