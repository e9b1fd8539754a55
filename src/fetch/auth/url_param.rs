use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends a credential as a URL query parameter.
///
/// Piwik authenticates every reporting call through the `token_auth`
/// parameter. Injecting it here keeps the secret out of the URLs that the
/// reporting client builds and logs.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> UrlParam<C> {
    pub fn token_auth(inner: C, token: String) -> Self {
        Self {
            inner,
            param_name: "token_auth".to_string(),
            key: token,
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}
