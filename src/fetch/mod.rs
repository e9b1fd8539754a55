mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, anyhow};
use reqwest::Url;

/// Issues a GET for `url` and parses the body as JSON.
///
/// Non-2xx responses are errors, carrying the status and body text.
pub async fn fetch_json<C: HttpClient>(client: &C, url: Url) -> Result<serde_json::Value> {
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await.context("request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow!("API returned status {}: {}", status, body));
    }

    let json: serde_json::Value = resp
        .json()
        .await
        .context("response body is not valid JSON")?;
    Ok(json)
}
