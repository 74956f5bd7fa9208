use std::time::Duration;

use reqwest::Client;

use crate::error::CrawlError;

const USER_AGENT: &str = concat!("exam_scraper/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 30;

/// Shared HTTP client for a crawl run.
pub fn build_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()
        .expect("Failed to build HTTP client")
}

/// Fetch a page body. Non-2xx statuses and transport failures surface as
/// errors, never as empty bodies.
pub async fn fetch_html(client: &Client, url: &str) -> Result<String, CrawlError> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}
