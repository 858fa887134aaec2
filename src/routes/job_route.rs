use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::configuration::PipelineSettings;
use crate::services::{
    run_analysis, EmbeddingClient, JobStore, PageFetcher, Progress, ProgressStatus, SerpClient,
};

#[derive(Deserialize)]
struct StartJobRequest {
    url: String,
}

/// Job-based flow: validate the seed URL, register a job and run the
/// pipeline in the background, publishing progress at each checkpoint.
#[post("")]
async fn start_job(
    body: web::Json<StartJobRequest>,
    store: web::Data<JobStore>,
    fetcher: web::Data<PageFetcher>,
    serp: web::Data<SerpClient>,
    embedder: web::Data<EmbeddingClient>,
    settings: web::Data<PipelineSettings>,
) -> HttpResponse {
    let seed_url = body.url.trim().to_string();
    if seed_url.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": "url is required" }));
    }

    let job_id = store.create();
    let progress = Progress::reporting(store.clone(), job_id);
    let store = store.clone();
    let fetcher = fetcher.clone();
    let serp = serp.clone();
    let embedder = embedder.clone();
    let settings = settings.clone();

    tokio::spawn(async move {
        match run_analysis(&fetcher, &serp, &embedder, &settings, &seed_url, &progress).await {
            Ok(report) => store.complete(job_id, report),
            Err(e) => {
                let message = format!("Analysis failed: {:#}", e);
                log::error!("Job {} failed for {}. Error: {:?}", job_id, seed_url, e);
                progress.emit("finalize", ProgressStatus::Error, message.clone());
                store.fail(job_id, &message);
            }
        }
    });

    HttpResponse::Accepted().json(serde_json::json!({ "job_id": job_id }))
}

#[get("/{job_id}")]
async fn job_status(path: web::Path<Uuid>, store: web::Data<JobStore>) -> HttpResponse {
    match store.snapshot(*path) {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": "unknown job" })),
    }
}
