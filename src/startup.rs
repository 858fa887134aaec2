use std::net::TcpListener;

use actix_files::Files;
use actix_web::{
    dev::Server,
    middleware::Logger,
    web::{self, Data},
    App, HttpServer,
};

use crate::{
    configuration::PipelineSettings,
    routes::{analyze_route, default_route, job_route},
    services::{EmbeddingClient, JobStore, PageFetcher, SerpClient},
};

pub fn run(
    listener: TcpListener,
    fetcher: PageFetcher,
    serp_client: SerpClient,
    embedding_client: EmbeddingClient,
    pipeline_settings: PipelineSettings,
    job_store: JobStore,
) -> Result<Server, std::io::Error> {
    let fetcher = Data::new(fetcher);
    let serp_client = Data::new(serp_client);
    let embedding_client = Data::new(embedding_client);
    let pipeline_settings = Data::new(pipeline_settings);
    let job_store = Data::new(job_store);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .service(Files::new("/static", "./templates/static").prefer_utf8(true))
            .service(default_route::index)
            .service(default_route::health)
            .service(analyze_route::analyze)
            .service(
                web::scope("/jobs")
                    .service(job_route::start_job)
                    .service(job_route::job_status),
            )
            .app_data(fetcher.clone())
            .app_data(serp_client.clone())
            .app_data(embedding_client.clone())
            .app_data(pipeline_settings.clone())
            .app_data(job_store.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
