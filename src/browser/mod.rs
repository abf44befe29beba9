pub mod remote;
pub mod session;
pub mod signer;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// Re-export common types
pub use remote::RemoteSigner;
pub use signer::BrowserSigner;

/// Signature pair the note API expects on every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// `x-s` header value
    pub x_s: String,

    /// `x-t` header value (a millisecond timestamp)
    pub x_t: String,
}

/// Signing failure
#[derive(Debug, Error)]
pub enum SignError {
    #[error("browser error: {0}")]
    Browser(String),

    #[error("sign script error: {0}")]
    Script(String),

    #[error("sign service error: {0}")]
    Service(String),

    #[error("signing failed after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Produces request signatures; may block for seconds per call
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        uri: &str,
        payload: Option<&Value>,
        a1: &str,
        web_session: &str,
    ) -> Result<Signature, SignError>;
}

/// Read a signature out of a JSON object; the timestamp may be a number or a string
pub(crate) fn parse_signature(raw: &Value, s_key: &str, t_key: &str) -> Result<Signature, SignError> {
    let x_s = raw.get(s_key)
        .and_then(Value::as_str)
        .ok_or_else(|| SignError::Script(format!("missing '{}' in {}", s_key, raw)))?;

    let x_t = match raw.get(t_key) {
        Some(Value::String(t)) => t.clone(),
        Some(Value::Number(t)) => t.to_string(),
        _ => return Err(SignError::Script(format!("missing '{}' in {}", t_key, raw))),
    };

    Ok(Signature {
        x_s: x_s.to_string(),
        x_t,
    })
}
