use std::time::Duration;

use reqwest::{header, Client, StatusCode};

// Several stores block default client identifiers, so present a
// realistic browser.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36";
const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// HTTP page fetcher with retry and content-type validation. Every
/// failure mode collapses to `None` so extraction can proceed on empty
/// input instead of aborting the pipeline.
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl PageFetcher {
    pub fn new(timeout: Duration, max_retries: u8) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static(ACCEPT_LANGUAGE),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build the page fetcher http client");

        PageFetcher {
            client,
            timeout,
            max_retries,
        }
    }

    /// Fetches one page as HTML text. Succeeds only on a 200 response
    /// whose content type contains `text/html`; retries up to
    /// `max_retries` extra times with linearly increasing backoff.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }

            match self.client.get(url).timeout(self.timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    let content_type = response
                        .headers()
                        .get(header::CONTENT_TYPE)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("")
                        .to_string();

                    if status == StatusCode::OK && content_type.contains("text/html") {
                        match response.text().await {
                            Ok(body) => return Some(body),
                            Err(e) => {
                                log::error!("Failed to read body from {}. Error: {:?}", url, e)
                            }
                        }
                    } else {
                        log::warn!(
                            "Skipping response from {}: status {}, content-type {:?}",
                            url,
                            status,
                            content_type
                        );
                    }
                }
                Err(e) => log::error!("No response from {}. Error: {:?}", url, e),
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::PageFetcher;

    #[tokio::test]
    async fn fetch_unreachable_host_returns_none() {
        let fetcher = PageFetcher::new(Duration::from_secs(1), 0);
        // Port 1 refuses connections, no retries configured.
        let result = fetcher.fetch("http://127.0.0.1:1/product").await;
        assert!(result.is_none());
    }
}
