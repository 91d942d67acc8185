use std::time::Duration;

use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::error::GatewayError;
use crate::util::preview;

use super::prepared_upstream::PreparedUpstream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const ERROR_BODY_PREVIEW_CHARS: usize = 500;
const ERROR_BODY_READ_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|err| GatewayError::Transport(format!("Failed to build HTTP client: {err}")))
}

#[derive(Debug, Deserialize)]
struct AnonymousTokenResponse {
    #[serde(default)]
    token: String,
}

/// HTTP client for the upstream chat service.
pub struct HttpTransport {
    client: reqwest::Client,
    upstream: PreparedUpstream,
    static_token: String,
    anonymous_token: bool,
    response_timeout: Duration,
    token_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with a pooled client for the configured upstream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the upstream URLs are unusable or the client cannot be built.
    pub fn new(config: &UpstreamConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_reqwest_client()?,
            upstream: PreparedUpstream::new(config)?,
            static_token: config.token.clone(),
            anonymous_token: config.anonymous_token,
            response_timeout: Duration::from_secs(config.timeout_secs),
            token_timeout: Duration::from_secs(config.token_timeout_secs),
        })
    }

    /// Bound on the response head of a chat call and on each idle gap while reading its body.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Fetch a one-time anonymous credential.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport failure, a non-200 status, an undecodable body, or
    /// a token that is empty or unusable in an `Authorization` header.
    pub async fn fetch_anonymous_token(&self) -> Result<String, GatewayError> {
        let headers = self.upstream.token_headers()?;
        let response = self
            .client
            .get(self.upstream.auth_url().clone())
            .headers(headers)
            .timeout(self.token_timeout)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message: "anonymous token request rejected".to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let parsed: AnonymousTokenResponse = serde_json::from_slice(&body).map_err(|err| {
            GatewayError::Internal(format!("undecodable anonymous token response: {err}"))
        })?;
        if parsed.token.is_empty() {
            return Err(GatewayError::Internal(
                "anonymous token response carried an empty token".to_string(),
            ));
        }
        if http::HeaderValue::from_str(&format!("Bearer {}", parsed.token)).is_err() {
            return Err(GatewayError::Internal(
                "anonymous token is not a valid header value".to_string(),
            ));
        }
        Ok(parsed.token)
    }

    /// The credential for one chat call: a fresh anonymous token when enabled, else the static one.
    pub async fn resolve_credential(&self) -> String {
        if self.anonymous_token {
            match self.fetch_anonymous_token().await {
                Ok(token) => {
                    tracing::debug!(token_prefix = preview(&token, 10), "using anonymous token");
                    return token;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "anonymous token unavailable, using static token");
                }
            }
        }
        self.static_token.clone()
    }

    /// Post one chat request. The timeout bounds obtaining the response head; the caller applies
    /// [`Self::response_timeout`] again to every body read.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the request fails or times out and
    /// [`GatewayError::Upstream`] for any status other than 200.
    pub async fn send_chat(
        &self,
        body: bytes::Bytes,
        chat_id: &str,
        token: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let headers = self.upstream.chat_headers(chat_id, token)?;
        let request = self
            .client
            .post(self.upstream.chat_url().clone())
            .headers(headers)
            .body(body);

        let response = match tokio::time::timeout(self.response_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::error!(chat_id, error = %err, "upstream request failed");
                return Err(GatewayError::Transport(err.to_string()));
            }
            Err(_) => {
                tracing::error!(
                    chat_id,
                    timeout_secs = self.response_timeout.as_secs(),
                    "upstream response timed out"
                );
                return Err(GatewayError::Transport(format!(
                    "upstream did not respond within {}s",
                    self.response_timeout.as_secs()
                )));
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = read_error_body(response).await;
            tracing::error!(
                chat_id,
                status = status.as_u16(),
                body = preview(&body, ERROR_BODY_PREVIEW_CHARS),
                "upstream returned an error status"
            );
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message: format!("upstream returned status {}", status.as_u16()),
            });
        }
        Ok(response)
    }
}

async fn read_error_body(response: reqwest::Response) -> String {
    match tokio::time::timeout(ERROR_BODY_READ_TIMEOUT, response.bytes()).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(err)) => format!("<failed to read body: {err}>"),
        Err(_) => "<timed out reading body>".to_string(),
    }
}
