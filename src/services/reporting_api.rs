//! Trait for calling an analytics reporting API.

use anyhow::Result;
use serde_json::Value;

/// Abstraction over a reporting endpoint (e.g., Piwik).
///
/// `params` are sent in the given order; repeated names are all sent.
#[async_trait::async_trait]
pub trait ReportingApi: Send + Sync {
    /// Invokes `method` and returns the parsed JSON body.
    async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<Value>;
}
