use anyhow::{Result, Context};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::Signer;
use crate::cli::config::ApiSettings;
use crate::client::NoteClient;
use crate::crawler::error::CrawlError;

const FEED_URI: &str = "/api/sns/web/v1/feed";
const SITE_ORIGIN: &str = "https://www.xiaohongshu.com";

/// Response code the API uses when the caller's IP is blocked
const IP_BLOCK_CODE: i64 = 300012;

/// HTTP statuses the API answers with when it wants a captcha solved
const VERIFY_STATUSES: [u16; 2] = [461, 471];

/// Client for the web note API; every request is signed through a `Signer`
pub struct XhsClient {
    client: Client,
    base_url: String,
    user_agent: String,
    cookie: String,
    a1: String,
    web_session: String,
    signer: Arc<dyn Signer>,
}

/// Split a cookie header into name/value pairs
pub fn parse_cookie(cookie: &str) -> HashMap<String, String> {
    cookie.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

impl XhsClient {
    pub fn new(settings: &ApiSettings, cookie: &str, signer: Arc<dyn Signer>) -> Result<Self> {
        let cookies = parse_cookie(cookie);
        let a1 = cookies.get("a1")
            .cloned()
            .context("Cookie does not contain an a1 value")?;
        let web_session = cookies.get("web_session").cloned().unwrap_or_default();
        if web_session.is_empty() {
            warn!("Cookie has no web_session; requests will be anonymous");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            user_agent: settings.user_agent.clone(),
            cookie: cookie.to_string(),
            a1,
            web_session,
            signer,
        })
    }

    async fn post(&self, uri: &str, payload: &Value) -> Result<Value, CrawlError> {
        let signature = self.signer.sign(uri, Some(payload), &self.a1, &self.web_session).await?;

        let body = serde_json::to_string(payload)
            .map_err(|e| CrawlError::Validation(format!("unserializable payload: {}", e)))?;

        let response = self.client.post(format!("{}{}", self.base_url, uri))
            .header(CONTENT_TYPE, "application/json;charset=UTF-8")
            .header(USER_AGENT, &self.user_agent)
            .header(ORIGIN, SITE_ORIGIN)
            .header(REFERER, format!("{}/", SITE_ORIGIN))
            .header(COOKIE, &self.cookie)
            .header("x-s", &signature.x_s)
            .header("x-t", &signature.x_t)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if VERIFY_STATUSES.contains(&status.as_u16()) {
            return Err(CrawlError::Fetch {
                code: i64::from(status.as_u16()),
                message: "verification required".to_string(),
            });
        }

        let body: Value = response.json().await?;
        debug!("{} answered {} (success: {})", uri, status, body["success"]);

        if body["success"].as_bool() == Some(true) {
            return Ok(body.get("data").cloned().unwrap_or(Value::Null));
        }

        let code = body["code"].as_i64().unwrap_or(-1);
        let message = body["msg"].as_str().unwrap_or("unknown error").to_string();
        if code == IP_BLOCK_CODE {
            return Err(CrawlError::Fetch { code, message: format!("ip blocked: {}", message) });
        }

        Err(CrawlError::Fetch { code, message })
    }
}

#[async_trait]
impl NoteClient for XhsClient {
    async fn fetch_note(&self, id: &str, access_token: &str) -> Result<Value, CrawlError> {
        if id.is_empty() || access_token.is_empty() {
            return Err(CrawlError::Validation(format!("note '{}' has no id or access token", id)));
        }

        let payload = json!({
            "source_note_id": id,
            "image_formats": ["jpg", "webp", "avif"],
            "extra": { "need_body_topic": 1 },
            "xsec_source": "pc_feed",
            "xsec_token": access_token,
        });

        let data = self.post(FEED_URI, &payload).await?;

        data.pointer("/items/0/note_card")
            .cloned()
            .ok_or_else(|| CrawlError::Fetch {
                code: -1,
                message: format!("no note card in response for {}", id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{SignError, Signature};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COOKIE_STR: &str = "abRequestId=abc; a1=a1-value; webId=w; web_session=session-value";
    const NOTE_ID: &str = "675bc154000000000103dbfa";

    struct FixedSigner;

    #[async_trait]
    impl Signer for FixedSigner {
        async fn sign(&self, _uri: &str, _payload: Option<&Value>, a1: &str, web_session: &str) -> Result<Signature, SignError> {
            assert_eq!(a1, "a1-value");
            assert_eq!(web_session, "session-value");
            Ok(Signature { x_s: "XYW_sig".into(), x_t: "1700000000000".into() })
        }
    }

    struct BrokenSigner;

    #[async_trait]
    impl Signer for BrokenSigner {
        async fn sign(&self, _uri: &str, _payload: Option<&Value>, _a1: &str, _web_session: &str) -> Result<Signature, SignError> {
            Err(SignError::Exhausted { attempts: 10 })
        }
    }

    fn client_for(server: &MockServer, signer: Arc<dyn Signer>) -> XhsClient {
        let settings = ApiSettings {
            base_url: server.uri(),
            ..ApiSettings::default()
        };
        XhsClient::new(&settings, COOKIE_STR, signer).unwrap()
    }

    #[test]
    fn test_parse_cookie() {
        let cookies = parse_cookie(COOKIE_STR);
        assert_eq!(cookies["a1"], "a1-value");
        assert_eq!(cookies["web_session"], "session-value");
        assert_eq!(cookies.len(), 4);
    }

    #[test]
    fn test_cookie_without_a1_is_rejected() {
        let result = XhsClient::new(&ApiSettings::default(), "web_session=x", Arc::new(FixedSigner));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_note_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FEED_URI))
            .and(header("x-s", "XYW_sig"))
            .and(header("x-t", "1700000000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "code": 0,
                "data": { "items": [ { "id": NOTE_ID, "note_card": { "note_id": NOTE_ID, "title": "연남동" } } ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(FixedSigner));
        let note = client.fetch_note(NOTE_ID, "token").await.unwrap();

        assert_eq!(note, json!({ "note_id": NOTE_ID, "title": "연남동" }));
    }

    #[tokio::test]
    async fn test_rejected_request_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FEED_URI))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "code": IP_BLOCK_CODE,
                "msg": "blocked"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(FixedSigner));
        let err = client.fetch_note(NOTE_ID, "token").await.unwrap_err();

        assert!(matches!(err, CrawlError::Fetch { code: IP_BLOCK_CODE, .. }));
    }

    #[tokio::test]
    async fn test_verification_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FEED_URI))
            .respond_with(ResponseTemplate::new(461))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(FixedSigner));
        let err = client.fetch_note(NOTE_ID, "token").await.unwrap_err();

        assert!(matches!(err, CrawlError::Fetch { code: 461, .. }));
    }

    #[tokio::test]
    async fn test_missing_note_card() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FEED_URI))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": { "items": [] } })))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(FixedSigner));
        assert!(matches!(client.fetch_note(NOTE_ID, "token").await, Err(CrawlError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FEED_URI))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(FixedSigner));
        assert!(matches!(client.fetch_note(NOTE_ID, "token").await, Err(CrawlError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_signing_failure_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(BrokenSigner));
        assert!(matches!(client.fetch_note(NOTE_ID, "token").await, Err(CrawlError::Transient(_))));
    }

    #[tokio::test]
    async fn test_empty_token_is_validation_error() {
        let server = MockServer::start().await;
        let client = client_for(&server, Arc::new(FixedSigner));

        assert!(matches!(client.fetch_note(NOTE_ID, "").await, Err(CrawlError::Validation(_))));
    }
}
