use std::{net::TcpListener, time::Duration};

use env_logger::Env;
use rival::{
    configuration::get_configuration,
    services::{EmbeddingClient, JobStore, PageFetcher, SerpClient},
    startup::run,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(address)?;

    let fetcher = PageFetcher::new(
        Duration::from_secs(configuration.pipeline.fetch_timeout_secs),
        configuration.pipeline.fetch_max_retries,
    );
    let serp_client = SerpClient::new(configuration.api_keys.serpapi);
    let embedding_client = EmbeddingClient::new(
        configuration.api_keys.openai,
        configuration.pipeline.embedding_model.clone(),
    );

    run(
        listener,
        fetcher,
        serp_client,
        embedding_client,
        configuration.pipeline,
        JobStore::default(),
    )?
    .await
}
