use actix_web::http::header;
use actix_web::{post, web, HttpResponse};
use askama::Template;
use serde::Deserialize;

use crate::configuration::PipelineSettings;
use crate::domain::AnalysisReport;
use crate::services::{run_analysis, EmbeddingClient, PageFetcher, Progress, SerpClient};

#[derive(Deserialize)]
struct AnalyzeForm {
    url: String,
}

#[derive(Template)]
#[template(path = "results.html")]
struct ResultsTemplate {
    report: AnalysisReport,
}

/// Synchronous flow: run the whole pipeline for the submitted seed URL
/// and render the competitor list. An empty URL redisplays the form
/// without starting any pipeline work.
#[post("/analyze")]
async fn analyze(
    form: web::Form<AnalyzeForm>,
    fetcher: web::Data<PageFetcher>,
    serp: web::Data<SerpClient>,
    embedder: web::Data<EmbeddingClient>,
    settings: web::Data<PipelineSettings>,
) -> HttpResponse {
    let seed_url = form.url.trim().to_string();
    if seed_url.is_empty() {
        return HttpResponse::SeeOther()
            .insert_header((header::LOCATION, "/"))
            .finish();
    }

    match run_analysis(
        &fetcher,
        &serp,
        &embedder,
        &settings,
        &seed_url,
        &Progress::silent(),
    )
    .await
    {
        Ok(report) => HttpResponse::Ok().body(ResultsTemplate { report }.render().unwrap()),
        Err(e) => {
            log::error!("Analysis failed for {}. Error: {:?}", seed_url, e);
            HttpResponse::InternalServerError().body("Analysis failed")
        }
    }
}
