use anyhow::{Result, Context};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::session::BrowserSession;
use crate::browser::{parse_signature, SignError, Signature, Signer};
use crate::cli::config::BrowserSettings;

/// Signs requests by evaluating the site's own signing function in a live browser.
///
/// The session is shared and mutated on every call (cookie injection, reload),
/// so calls are serialized through a mutex.
pub struct BrowserSigner {
    settings: BrowserSettings,
    session: Mutex<BrowserSession>,
}

impl BrowserSigner {
    /// Create a signer; the browser is launched lazily on the first signature
    pub async fn new(settings: BrowserSettings) -> Result<Self> {
        let stealth_script = match &settings.stealth_script_path {
            Some(path) => Some(
                tokio::fs::read_to_string(path).await
                    .context(format!("Failed to read stealth script: {}", path.display()))?,
            ),
            None => None,
        };

        let session = BrowserSession::new(settings.clone(), stealth_script);

        Ok(Self {
            settings,
            session: Mutex::new(session),
        })
    }

    async fn attempt(
        &self,
        session: &mut BrowserSession,
        uri: &str,
        payload: Option<&Value>,
        a1: &str,
    ) -> Result<Signature, SignError> {
        let browser_err = |e: anyhow::Error| SignError::Browser(format!("{:#}", e));

        if !session.is_initialized() {
            session.initialize().await.map_err(browser_err)?;
        }

        session.navigate(&self.settings.home_url).await.map_err(browser_err)?;
        session.add_cookie("a1", a1, &self.settings.cookie_domain).await.map_err(browser_err)?;
        session.refresh().await.map_err(browser_err)?;

        // The signing function is not ready right after the reload
        sleep(Duration::from_millis(self.settings.settle_millis)).await;

        let args = vec![
            Value::String(uri.to_string()),
            payload.cloned().unwrap_or(Value::Null),
        ];
        let raw = session.execute_script(&self.settings.sign_script, args).await
            .map_err(|e| SignError::Script(format!("{:#}", e)))?;

        parse_signature(&raw, "X-s", "X-t")
    }
}

#[async_trait]
impl Signer for BrowserSigner {
    async fn sign(
        &self,
        uri: &str,
        payload: Option<&Value>,
        a1: &str,
        _web_session: &str,
    ) -> Result<Signature, SignError> {
        let attempts = self.settings.sign_attempts.max(1);
        let mut session = self.session.lock().await;

        for attempt in 1..=attempts {
            match self.attempt(&mut session, uri, payload, a1).await {
                Ok(signature) => {
                    debug!("Signed {} on attempt {}", uri, attempt);
                    return Ok(signature);
                }
                Err(e) => {
                    warn!("Signing attempt {}/{} failed: {}", attempt, attempts, e);
                    // Start the next attempt from a fresh browser
                    if let Err(e) = session.close().await {
                        warn!("Failed to reset browser session: {}", e);
                    }
                }
            }
        }

        Err(SignError::Exhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unreachable_settings(sign_attempts: u32) -> BrowserSettings {
        BrowserSettings {
            webdriver_url: "http://127.0.0.1:9".to_string(),
            sign_attempts,
            settle_millis: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_sign_attempts() {
        let signer = BrowserSigner::new(unreachable_settings(2)).await.unwrap();
        let payload = json!({ "source_note_id": "675bc154000000000103dbfa" });

        let result = signer.sign("/api/sns/web/v1/feed", Some(&payload), "a1-value", "session").await;

        assert!(matches!(result, Err(SignError::Exhausted { attempts: 2 })));
        assert!(!signer.session.lock().await.is_initialized());
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let signer = BrowserSigner::new(unreachable_settings(0)).await.unwrap();

        let result = signer.sign("/api/sns/web/v1/feed", None, "a1-value", "").await;

        assert!(matches!(result, Err(SignError::Exhausted { attempts: 1 })));
    }

    #[tokio::test]
    async fn test_missing_stealth_script_fails_construction() {
        let mut settings = unreachable_settings(1);
        settings.stealth_script_path = Some("/nonexistent/stealth.min.js".into());

        assert!(BrowserSigner::new(settings).await.is_err());
    }
}
