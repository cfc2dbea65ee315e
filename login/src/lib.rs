//! Browser-based login for the memori CLI.
//!
//! One login attempt is a correlated handshake between four parties: this
//! process, an ephemeral loopback listener, the user's browser, and the
//! remote account service. The flow is create → open browser → long-poll
//! `wait` until the backend reports activation, bounded by a single
//! wall-clock deadline. The API key appears only in the authenticated
//! `wait` response, never in anything the browser sends us.

mod server;
mod token_flow;
mod urls;

use std::time::Duration;

use memori_core::CredentialStore;
use memori_core::config::LoginDefaults;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

pub use server::FlowCorrelator;
pub use token_flow::IssuedCredential;
pub use token_flow::TokenFlow;
pub use token_flow::TokenFlowClient;
pub use token_flow::WaitOutcome;
pub use urls::CLI_SOURCE;
pub use urls::build_login_url;

#[derive(Debug, Error)]
pub enum LoginError {
    /// No loopback port could be bound. Fatal for this attempt.
    #[error("could not start the local login listener: {message}")]
    PortError { message: String },

    /// The account service could not be reached or answered 5xx.
    #[error("the account service is unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// The account service rejected the request outright.
    #[error("the account service rejected the request: {message}")]
    InvalidRequest { message: String },

    /// The service no longer recognizes this flow; the user must restart.
    #[error("this login attempt has expired; run `memori login` again")]
    FlowExpired,

    /// The wait secret was rejected; the user must restart.
    #[error("the account service rejected this login attempt; run `memori login` again")]
    Unauthorized,

    /// No activation within the attempt deadline. Recoverable by retrying.
    #[error("timed out waiting for the browser sign-in to complete")]
    TimedOut,

    /// The credential was issued but could not be persisted.
    #[error("could not store the credential in your system keychain: {message}")]
    StoreUnavailable { message: String },
}

#[derive(Clone, Debug)]
pub struct LoginOptions {
    pub auth_base: String,
    pub login_url: String,
    pub next_url: String,
    pub preferred_port: u16,
    /// Server-side budget of each individual `wait` long-poll.
    pub wait_timeout: Duration,
    /// Wall-clock bound on the whole attempt.
    pub deadline: Duration,
    pub open_browser: bool,
}

impl LoginOptions {
    pub fn from_defaults(defaults: &LoginDefaults) -> Self {
        Self {
            auth_base: defaults.auth_base.clone(),
            login_url: defaults.login_url.clone(),
            next_url: defaults.next_url.clone(),
            preferred_port: defaults.port,
            wait_timeout: defaults.wait_timeout,
            deadline: defaults.deadline,
            open_browser: true,
        }
    }
}

/// Terminal success of a login attempt. `store_error` is set when the
/// credential was issued but the keychain write failed; callers must
/// surface that warning rather than drop it.
#[derive(Debug)]
pub struct LoginSuccess {
    pub email: Option<String>,
    pub store_error: Option<LoginError>,
}

/// Runs one complete login attempt. The loopback listener is released on
/// every exit path, including cancellation of this future.
pub async fn run_login_flow(
    opts: LoginOptions,
    store: CredentialStore,
) -> Result<LoginSuccess, LoginError> {
    let correlator = FlowCorrelator::bind(opts.preferred_port)?;
    if correlator.actual_port() != opts.preferred_port && opts.preferred_port != 0 {
        eprintln!(
            "Port {} was unavailable. Using port {}.",
            opts.preferred_port,
            correlator.actual_port()
        );
    }

    let result = drive_flow(&opts, &store, &correlator).await;
    correlator.shutdown();
    result
}

async fn drive_flow(
    opts: &LoginOptions,
    store: &CredentialStore,
    correlator: &FlowCorrelator,
) -> Result<LoginSuccess, LoginError> {
    confirm_listening(correlator).await?;

    let client = TokenFlowClient::new(&opts.auth_base);
    let flow = client
        .create(
            correlator.actual_port(),
            Some(&opts.next_url),
            Some(CLI_SOURCE),
        )
        .await?;

    // The browser page queries the loopback endpoint as soon as it loads,
    // so the id must be visible before the browser is pointed anywhere.
    correlator.publish_flow_id(&flow.flow_id);

    let login_url = match &flow.web_url {
        Some(url) => url.clone(),
        None => build_login_url(&opts.login_url, &flow.flow_id, flow.code.as_deref())?,
    };

    present_login_url(&login_url, flow.code.as_deref(), opts.open_browser);

    let IssuedCredential { api_key, email } = poll_until_activated(&client, &flow, opts).await?;

    let store_error = match store.save(&api_key, email.as_deref()) {
        Ok(()) => None,
        Err(error) => {
            warn!("keychain write failed after activation: {error}");
            Some(LoginError::StoreUnavailable {
                message: error.message(),
            })
        }
    };

    let email = email.or_else(|| store.account_email());
    Ok(LoginSuccess { email, store_error })
}

/// The browser must never be opened before the listener answers its health
/// probe, or the page could query a dead endpoint.
async fn confirm_listening(correlator: &FlowCorrelator) -> Result<(), LoginError> {
    let response = reqwest::get(correlator.health_url())
        .await
        .map_err(|error| LoginError::PortError {
            message: format!("loopback health check failed: {error}"),
        })?;
    if !response.status().is_success() {
        return Err(LoginError::PortError {
            message: format!("loopback health check returned status {}", response.status()),
        });
    }
    Ok(())
}

fn present_login_url(login_url: &str, code: Option<&str>, open_browser: bool) {
    if open_browser && webbrowser::open(login_url).is_ok() {
        eprintln!(
            "The web browser should have opened for you to authenticate.\n\
             If it didn't, copy this URL into your web browser manually:\n"
        );
    } else {
        eprintln!(
            "Was not able to launch a web browser.\n\
             Please go to this URL manually and complete the flow:\n"
        );
    }
    eprintln!("{login_url}\n");
    if let Some(code) = code {
        eprintln!("Enter this code when asked: {code}\n");
    }
}

/// Deadline-bounded poll loop. Each `wait` call long-polls server-side, so
/// the remote call itself is the throttle: a `Pending` answer re-issues the
/// call immediately. The deadline also cancels an in-flight poll, and an
/// activation that lands after expiry is discarded.
async fn poll_until_activated(
    client: &TokenFlowClient,
    flow: &TokenFlow,
    opts: &LoginOptions,
) -> Result<IssuedCredential, LoginError> {
    let deadline = Instant::now() + opts.deadline;

    loop {
        let wait = client.wait(&flow.flow_id, flow.wait_secret.as_deref(), opts.wait_timeout);
        match tokio::time::timeout_at(deadline, wait).await {
            Err(_) => return Err(LoginError::TimedOut),
            Ok(Ok(WaitOutcome::Activated(issued))) => return Ok(issued),
            Ok(Ok(WaitOutcome::Pending)) => {
                if Instant::now() >= deadline {
                    return Err(LoginError::TimedOut);
                }
                debug!("token flow {} still pending", flow.flow_id);
            }
            Ok(Err(error)) => return Err(error),
        }
    }
}
