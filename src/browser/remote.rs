use anyhow::{Result, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::browser::{parse_signature, SignError, Signature, Signer};

#[derive(Debug, Serialize)]
struct SignServiceRequest<'a> {
    uri: &'a str,
    data: Option<&'a Value>,
    a1: &'a str,
    web_session: &'a str,
}

/// Signs requests through an HTTP sign service that keeps its own browser open
pub struct RemoteSigner {
    client: Client,
    base_url: String,
}

impl RemoteSigner {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    async fn sign(
        &self,
        uri: &str,
        payload: Option<&Value>,
        a1: &str,
        web_session: &str,
    ) -> Result<Signature, SignError> {
        let endpoint = format!("{}/sign", self.base_url);
        let request = SignServiceRequest {
            uri,
            data: payload,
            a1,
            web_session,
        };

        debug!("Requesting signature for {} from {}", uri, endpoint);

        let response = self.client.post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SignError::Service(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Sign service returned {}: {}", status, body);
            return Err(SignError::Service(format!("status {}: {}", status, body)));
        }

        let raw = response.json::<Value>()
            .await
            .map_err(|e| SignError::Service(format!("unreadable response: {}", e)))?;

        parse_signature(&raw, "x-s", "x-t")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sign_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .and(body_json(json!({
                "uri": "/api/sns/web/v1/feed",
                "data": { "source_note_id": "n1" },
                "a1": "a1-value",
                "web_session": "session-value",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "x-s": "XYW_sig", "x-t": "1739606846149" })))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RemoteSigner::new(&server.uri()).unwrap();
        let payload = json!({ "source_note_id": "n1" });
        let signature = signer.sign("/api/sns/web/v1/feed", Some(&payload), "a1-value", "session-value")
            .await
            .unwrap();

        assert_eq!(signature.x_s, "XYW_sig");
        assert_eq!(signature.x_t, "1739606846149");
    }

    #[tokio::test]
    async fn test_sign_service_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .respond_with(ResponseTemplate::new(500).set_body_string("window._webmsxyw is not a function"))
            .mount(&server)
            .await;

        let signer = RemoteSigner::new(&server.uri()).unwrap();
        let result = signer.sign("/api/sns/web/v1/feed", None, "a1", "").await;

        assert!(matches!(result, Err(SignError::Service(_))));
    }
}
