//! REST client for the account service's token-flow endpoints.
//!
//! `create` registers one login attempt and returns the correlation id plus
//! the wait secret; `wait` is a server-side long-poll that releases the API
//! key only once the backend has activated the flow. The secret therefore
//! never travels through the browser or the loopback listener.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::LoginError;

/// Extra client-side allowance on top of the server's advertised wait
/// budget, so the HTTP timeout never races a well-behaved server.
const WAIT_HTTP_MARGIN: Duration = Duration::from_secs(5);

const CREATE_TIMEOUT: Duration = Duration::from_secs(10);

/// One in-flight authentication attempt, as issued by `create`.
#[derive(Clone)]
pub struct TokenFlow {
    pub flow_id: String,
    pub wait_secret: Option<String>,
    pub web_url: Option<String>,
    pub code: Option<String>,
}

impl fmt::Debug for TokenFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenFlow")
            .field("flow_id", &self.flow_id)
            .field("wait_secret", &self.wait_secret.as_ref().map(|_| "***"))
            .field("web_url", &self.web_url)
            .field("code", &self.code)
            .finish()
    }
}

/// Credential fields released by the backend once a flow is activated.
#[derive(Clone)]
pub struct IssuedCredential {
    pub api_key: String,
    pub email: Option<String>,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("api_key", &"***")
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Debug)]
pub enum WaitOutcome {
    Activated(IssuedCredential),
    /// The server-side wait budget elapsed before activation. Not an error:
    /// the caller simply polls again.
    Pending,
}

#[derive(Serialize)]
struct CreateFlowRequest<'a> {
    localhost_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    utm_source: Option<&'a str>,
}

#[derive(Deserialize)]
struct CreateFlowResponse {
    #[serde(alias = "flow_id")]
    token_flow_id: Option<String>,
    wait_secret: Option<String>,
    web_url: Option<String>,
    code: Option<String>,
}

#[derive(Serialize)]
struct WaitRequest<'a> {
    token_flow_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_secret: Option<&'a str>,
    timeout: u64,
}

#[derive(Deserialize)]
struct WaitResponse {
    #[serde(default)]
    timeout: bool,
    #[serde(alias = "token", alias = "token_secret")]
    api_key: Option<String>,
    email: Option<String>,
}

pub struct TokenFlowClient {
    base_url: String,
    http: reqwest::Client,
}

impl TokenFlowClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Registers a new token flow for the given loopback port.
    pub async fn create(
        &self,
        localhost_port: u16,
        next_url: Option<&str>,
        utm_source: Option<&str>,
    ) -> Result<TokenFlow, LoginError> {
        let url = format!("{}/v1/token-flow/create", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&CreateFlowRequest {
                localhost_port,
                next_url,
                utm_source,
            })
            .timeout(CREATE_TIMEOUT)
            .send()
            .await
            .map_err(service_unavailable)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(LoginError::ServiceUnavailable {
                message: format!("token flow create returned status {status}"),
            });
        }
        if !status.is_success() {
            return Err(LoginError::InvalidRequest {
                message: format!("token flow create returned status {status}"),
            });
        }

        let body: CreateFlowResponse = response.json().await.map_err(service_unavailable)?;
        let flow_id = match body.token_flow_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(LoginError::InvalidRequest {
                    message: "token flow create did not return a flow id".to_string(),
                });
            }
        };

        debug!("created token flow {flow_id}");
        Ok(TokenFlow {
            flow_id,
            wait_secret: body.wait_secret,
            web_url: body.web_url,
            code: body.code,
        })
    }

    /// Long-polls the flow once, blocking server-side for up to `timeout`.
    pub async fn wait(
        &self,
        flow_id: &str,
        wait_secret: Option<&str>,
        timeout: Duration,
    ) -> Result<WaitOutcome, LoginError> {
        let url = format!("{}/v1/token-flow/wait", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&WaitRequest {
                token_flow_id: flow_id,
                wait_secret,
                timeout: timeout.as_secs(),
            })
            .timeout(timeout + WAIT_HTTP_MARGIN)
            .send()
            .await
            .map_err(service_unavailable)?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LoginError::Unauthorized);
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => return Err(LoginError::FlowExpired),
            status if status.is_server_error() => {
                return Err(LoginError::ServiceUnavailable {
                    message: format!("token flow wait returned status {status}"),
                });
            }
            status if !status.is_success() => {
                return Err(LoginError::InvalidRequest {
                    message: format!("token flow wait returned status {status}"),
                });
            }
            _ => {}
        }

        let body: WaitResponse = response.json().await.map_err(service_unavailable)?;
        if body.timeout {
            return Ok(WaitOutcome::Pending);
        }

        match body.api_key {
            Some(api_key) if !api_key.is_empty() => Ok(WaitOutcome::Activated(IssuedCredential {
                api_key,
                email: body.email,
            })),
            _ => Err(LoginError::ServiceUnavailable {
                message: "flow activation did not include an API key".to_string(),
            }),
        }
    }
}

fn service_unavailable(error: reqwest::Error) -> LoginError {
    LoginError::ServiceUnavailable {
        message: error.to_string(),
    }
}
