use serde::Serialize;

use super::signals::{ProductSignals, ScoredCandidate};

/// Result shape returned to callers: the seed record plus the ranked
/// competitor entries with their evidence.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub seed: SeedReport,
    pub competitors: Vec<CompetitorEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub url: String,
    pub signals: ProductSignals,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetitorEntry {
    pub domain: String,
    pub url: String,
    pub similarity: f64,
    pub signals: ProductSignals,
}

impl AnalysisReport {
    pub fn new(seed_url: &str, seed_signals: ProductSignals, scored: Vec<ScoredCandidate>) -> Self {
        let competitors = scored
            .into_iter()
            .map(|candidate| CompetitorEntry {
                domain: candidate.domain,
                url: candidate.signals.url.clone(),
                similarity: round_similarity(candidate.similarity),
                signals: candidate.signals,
            })
            .collect();

        AnalysisReport {
            seed: SeedReport {
                url: seed_url.to_string(),
                signals: seed_signals,
            },
            competitors,
        }
    }
}

fn round_similarity(similarity: f64) -> f64 {
    (similarity * 1000.0).round() / 1000.0
}
