use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::config::ReportConfig;
use crate::fetch::auth::UrlParam;
use crate::fetch::{BasicClient, HttpClient, fetch_json};
use crate::services::reporting_api::ReportingApi;

pub struct PiwikClient<C> {
    http: C,
    base_url: Url,
}

impl PiwikClient<UrlParam<BasicClient>> {
    /// Builds a client whose requests carry the configured `token_auth`.
    pub fn from_config(config: &ReportConfig) -> Result<Self> {
        let http = BasicClient::with_timeout(config.request_timeout())?;
        Self::new(UrlParam::token_auth(http, config.token.clone()), config)
    }
}

impl<C: HttpClient> PiwikClient<C> {
    pub fn new(http: C, config: &ReportConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.piwik_uri)
            .with_context(|| format!("invalid piwik_uri '{}'", config.piwik_uri))?;

        base_url
            .query_pairs_mut()
            .append_pair("module", "API")
            .append_pair("idSite", &config.id_site)
            .append_pair("format", "JSON")
            .append_pair("period", &config.period)
            .append_pair("date", &config.date);

        Ok(Self { http, base_url })
    }

    /// URL for one API call: the fixed base, then `method`, then every param in order.
    pub fn method_url(&self, method: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("method", method);
            for (name, value) in params {
                query.append_pair(name, value);
            }
        }
        url
    }
}

/// Piwik reports failures as `{"result": "error", "message": "..."}` with a 200 status.
fn api_error(body: &Value) -> Option<String> {
    if body["result"].as_str() == Some("error") {
        let message = body["message"].as_str().unwrap_or("unknown error");
        Some(message.to_string())
    } else {
        None
    }
}

#[async_trait]
impl<C: HttpClient> ReportingApi for PiwikClient<C> {
    async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = self.method_url(method, params);
        debug!(%url, "Calling reporting API");

        let body = fetch_json(&self.http, url)
            .await
            .with_context(|| format!("{method} call failed"))?;

        if let Some(message) = api_error(&body) {
            return Err(anyhow!("{method} returned an API error: {message}"));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn config() -> ReportConfig {
        ReportConfig::from_json(
            r#"{"piwik_uri":"https://stats.example.com/index.php","token":"secret",
                "idSite":3,"period":"range","date":"2017-05-01,2017-05-31"}"#,
        )
        .unwrap()
    }

    fn client() -> PiwikClient<BasicClient> {
        PiwikClient::new(BasicClient::new(), &config()).unwrap()
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_method_url_base_parameters() {
        let url = client().method_url("UserId.getUsers", &[]);
        let pairs = pairs(&url);

        assert_eq!(url.path(), "/index.php");
        assert_eq!(
            pairs,
            vec![
                ("module".to_string(), "API".to_string()),
                ("idSite".to_string(), "3".to_string()),
                ("format".to_string(), "JSON".to_string()),
                ("period".to_string(), "range".to_string()),
                ("date".to_string(), "2017-05-01,2017-05-31".to_string()),
                ("method".to_string(), "UserId.getUsers".to_string()),
            ]
        );
    }

    #[test]
    fn test_method_url_keeps_every_parameter() {
        let url = client().method_url(
            "Live.getVisitorProfile",
            &[("visitorId", "abc123"), ("limitVisits", "50")],
        );
        let pairs = pairs(&url);

        assert!(pairs.contains(&("visitorId".to_string(), "abc123".to_string())));
        assert!(pairs.contains(&("limitVisits".to_string(), "50".to_string())));
    }

    #[test]
    fn test_method_url_does_not_leak_token() {
        let url = client().method_url("UserId.getUsers", &[]);
        assert!(!url.as_str().contains("secret"));
        assert!(!url.as_str().contains("token_auth"));
    }

    #[test]
    fn test_method_url_encodes_values() {
        let url = client().method_url("Live.getVisitorProfile", &[("visitorId", "a&b=c")]);
        let pairs = pairs(&url);
        assert!(pairs.contains(&("visitorId".to_string(), "a&b=c".to_string())));
    }

    #[test]
    fn test_invalid_base_uri() {
        let mut config = config();
        config.piwik_uri = "not a url".to_string();
        assert!(PiwikClient::new(BasicClient::new(), &config).is_err());
    }

    type Recorded = Arc<Mutex<Vec<Url>>>;

    /// Answers every request with a canned response and keeps the URLs it saw.
    struct RecordingClient {
        seen: Recorded,
        status: u16,
        body: &'static str,
    }

    impl RecordingClient {
        fn new(status: u16, body: &'static str) -> (Self, Recorded) {
            let seen = Recorded::default();
            let client = Self {
                seen: seen.clone(),
                status,
                body,
            };
            (client, seen)
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.seen.lock().unwrap().push(req.url().clone());
            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body)
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    #[tokio::test]
    async fn test_call_sends_token_once_after_parameters() {
        let (http, seen) = RecordingClient::new(200, r#"{"userId":"alice","lastVisits":[]}"#);
        let client =
            PiwikClient::new(UrlParam::token_auth(http, "secret".to_string()), &config()).unwrap();

        let body = client
            .call("Live.getVisitorProfile", &[("visitorId", "abc123")])
            .await
            .unwrap();
        assert_eq!(body["userId"], "alice");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let pairs = pairs(&seen[0]);
        let names: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();

        let token_positions: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, name)| **name == "token_auth")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(token_positions.len(), 1);
        let token_at = token_positions[0];
        assert_eq!(pairs[token_at].1, "secret");

        let method_at = names.iter().position(|n| *n == "method").unwrap();
        let visitor_at = names.iter().position(|n| *n == "visitorId").unwrap();
        assert!(method_at < token_at);
        assert!(visitor_at < token_at);
    }

    #[tokio::test]
    async fn test_call_rejects_api_error_body() {
        let (http, _) = RecordingClient::new(200, r#"{"result":"error","message":"token_auth is invalid"}"#);
        let client = PiwikClient::new(http, &config()).unwrap();

        let err = client.call("UserId.getUsers", &[]).await.unwrap_err();
        assert!(format!("{err:#}").contains("token_auth is invalid"));
    }

    #[tokio::test]
    async fn test_call_rejects_error_status() {
        let (http, _) = RecordingClient::new(503, "down for maintenance");
        let client = PiwikClient::new(http, &config()).unwrap();

        let err = client.call("UserId.getUsers", &[]).await.unwrap_err();
        assert!(format!("{err:#}").contains("503"));
    }

    #[tokio::test]
    async fn test_call_rejects_non_json_body() {
        let (http, _) = RecordingClient::new(200, "<html>login</html>");
        let client = PiwikClient::new(http, &config()).unwrap();

        assert!(client.call("UserId.getUsers", &[]).await.is_err());
    }

    #[test]
    fn test_api_error_detection() {
        let err = serde_json::json!({"result": "error", "message": "You can't access this resource"});
        assert_eq!(
            api_error(&err).as_deref(),
            Some("You can't access this resource")
        );

        let ok = serde_json::json!([{"idvisitor": "abc"}]);
        assert_eq!(api_error(&ok), None);
    }
}
