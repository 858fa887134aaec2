use actix_web::web::Data;
use uuid::Uuid;

use crate::configuration::PipelineSettings;
use crate::domain::AnalysisReport;

use super::{
    build_queries, extract_product_signals, score_candidates, search_candidates, EmbeddingClient,
    JobStore, PageFetcher, ProgressStatus, SerpClient,
};

/// Progress handle for one pipeline run. The silent variant backs the
/// synchronous form flow; the reporting variant publishes each checkpoint
/// to a job in the store.
pub struct Progress {
    target: Option<(Data<JobStore>, Uuid)>,
}

impl Progress {
    pub fn silent() -> Self {
        Progress { target: None }
    }

    pub fn reporting(store: Data<JobStore>, job_id: Uuid) -> Self {
        Progress {
            target: Some((store, job_id)),
        }
    }

    pub fn emit(&self, stage: &str, status: ProgressStatus, message: impl Into<String>) {
        if let Some((store, job_id)) = &self.target {
            store.emit(*job_id, stage, status, message);
        }
    }
}

/// Runs the whole pipeline for one seed URL: extract seed signals, build
/// queries, search candidates, score them, assemble the report. Every
/// provider failure along the way degrades instead of aborting, so an
/// error here is an unexpected terminal failure for the caller to surface.
pub async fn run_analysis(
    fetcher: &PageFetcher,
    serp: &SerpClient,
    embedder: &EmbeddingClient,
    settings: &PipelineSettings,
    seed_url: &str,
    progress: &Progress,
) -> anyhow::Result<AnalysisReport> {
    progress.emit(
        "extract",
        ProgressStatus::Running,
        format!("Extracting product signals from {}", seed_url),
    );
    let seed_signals = extract_product_signals(fetcher, seed_url).await;
    log::info!(
        "Extracted seed signals for {} | title: {:?}, schema: {}",
        seed_url,
        seed_signals.title,
        seed_signals.schema_present
    );
    progress.emit(
        "extract",
        ProgressStatus::Ok,
        format!("Extracted signals, title: {:?}", seed_signals.title),
    );

    let queries = build_queries(&seed_signals);
    progress.emit(
        "queries",
        ProgressStatus::Ok,
        format!("Built {} search queries", queries.len()),
    );

    let candidate_urls = search_candidates(
        serp,
        &queries,
        seed_url,
        settings.results_per_query,
        settings.max_candidates,
    )
    .await;
    log::info!(
        "Found {} candidate urls for {}",
        candidate_urls.len(),
        seed_url
    );
    progress.emit(
        "search",
        ProgressStatus::Ok,
        format!("Found {} candidate urls", candidate_urls.len()),
    );

    let scored = score_candidates(fetcher, embedder, settings, &seed_signals, candidate_urls).await;
    progress.emit(
        "score",
        ProgressStatus::Ok,
        format!("Scored {} competitors above the floor", scored.len()),
    );

    let report = AnalysisReport::new(seed_url, seed_signals, scored);
    progress.emit("finalize", ProgressStatus::Done, "Analysis complete");
    Ok(report)
}
