//! SSI policy-server handshake
//!
//! When SSI is enabled a verification session has to be opened with the
//! wallet API before the provider is asked for a fee quote.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{SettlementError, SettlementResult};
use crate::provider::types::PolicyServer;

#[async_trait]
pub trait SsiVerifier: Send + Sync {
    /// Open a policy-server session for `consumer` on `did`.
    async fn init_session(&self, consumer: &str, did: &str) -> SettlementResult<PolicyServer>;
}

#[derive(Clone)]
pub struct HttpSsiVerifier {
    base_url: String,
    http: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInitRequest<'a> {
    address: &'a str,
    did: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionInitResponse {
    success: bool,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpSsiVerifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl SsiVerifier for HttpSsiVerifier {
    async fn init_session(&self, consumer: &str, did: &str) -> SettlementResult<PolicyServer> {
        let url = format!("{}/policy/session/init", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&SessionInitRequest { address: consumer, did })
            .send()
            .await
            .map_err(|err| SettlementError::ssi(format!("session init unreachable: {}", err)))?;

        if !response.status().is_success() {
            return Err(SettlementError::ssi(format!(
                "session init returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .json::<SessionInitResponse>()
            .await
            .map_err(|err| SettlementError::ssi(format!("invalid session init response: {}", err)))?;

        match body {
            SessionInitResponse { success: true, session_id: Some(session_id), .. } => {
                tracing::info!("SSI session opened for {} on {}", consumer, did);
                Ok(PolicyServer { session_id })
            }
            SessionInitResponse { message, .. } => Err(SettlementError::ssi(
                message.unwrap_or_else(|| "verifier rejected the session".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_handshake_returns_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/policy/session/init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "sessionId": "sess-42"
            })))
            .mount(&server)
            .await;

        let session = HttpSsiVerifier::new(server.uri())
            .init_session("0xconsumer", "did:op:1")
            .await
            .unwrap();
        assert_eq!(session.session_id, "sess-42");
    }

    #[tokio::test]
    async fn rejected_handshake_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "credential expired"
            })))
            .mount(&server)
            .await;

        let err = HttpSsiVerifier::new(server.uri())
            .init_session("0xconsumer", "did:op:1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "SSI verification failed: credential expired");
    }
}
