//! Loopback correlator: an ephemeral localhost listener whose only job is to
//! let the browser page and the CLI agree on which token flow is in flight.
//!
//! The listener never sees a secret. It serves two endpoints for the lifetime
//! of one login attempt: `/health` for readiness probes, and `/` which
//! answers `503 pending` until the orchestrator publishes the flow id and
//! `200 <flow_id>` afterwards. The browser page calls from a different
//! origin, so every response carries `Access-Control-Allow-Origin: *`.

use std::sync::Arc;
use std::sync::OnceLock;
use std::thread;
use std::thread::JoinHandle;

use tiny_http::Header;
use tiny_http::Request;
use tiny_http::Response;
use tiny_http::Server;
use tracing::debug;
use tracing::trace;

use crate::LoginError;

pub struct FlowCorrelator {
    actual_port: u16,
    flow_id: Arc<OnceLock<String>>,
    server: Arc<Server>,
    listener: Option<JoinHandle<()>>,
}

impl FlowCorrelator {
    /// Binds `127.0.0.1:preferred_port`, falling back to an OS-assigned
    /// ephemeral port when the preferred one is taken. Never binds a
    /// wildcard address.
    pub fn bind(preferred_port: u16) -> Result<Self, LoginError> {
        let server = match Server::http(("127.0.0.1", preferred_port)) {
            Ok(server) => server,
            Err(_) if preferred_port != 0 => Server::http(("127.0.0.1", 0))
                .map_err(|error| LoginError::PortError {
                    message: error.to_string(),
                })?,
            Err(error) => {
                return Err(LoginError::PortError {
                    message: error.to_string(),
                });
            }
        };

        let actual_port = match server.server_addr().to_ip() {
            Some(addr) => addr.port(),
            None => {
                return Err(LoginError::PortError {
                    message: "unable to determine the listener port".to_string(),
                });
            }
        };

        let server = Arc::new(server);
        let flow_id: Arc<OnceLock<String>> = Arc::new(OnceLock::new());

        let listener = {
            let server = server.clone();
            let flow_id = flow_id.clone();
            thread::spawn(move || {
                while let Ok(request) = server.recv() {
                    respond(request, &flow_id);
                }
            })
        };

        debug!("loopback correlator listening on 127.0.0.1:{actual_port}");
        Ok(Self {
            actual_port,
            flow_id,
            server,
            listener: Some(listener),
        })
    }

    pub fn actual_port(&self) -> u16 {
        self.actual_port
    }

    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}/health", self.actual_port)
    }

    /// Publishes the flow id to inbound browser requests. Set-once: the
    /// orchestrator is the only writer, and a second publish is a no-op.
    pub fn publish_flow_id(&self, flow_id: &str) {
        if self.flow_id.set(flow_id.to_string()).is_err() {
            debug!("flow id already published, ignoring");
        }
    }

    /// Unbinds the listener. Idempotent; also runs on drop so every exit
    /// path of a login attempt releases the socket.
    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

impl Drop for FlowCorrelator {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}

fn respond(request: Request, flow_id: &OnceLock<String>) {
    let path = request.url().split('?').next().unwrap_or("/").to_string();
    trace!("loopback request: {path}");

    let (status, body) = match path.as_str() {
        "/health" => (200, "ok".to_string()),
        "/" => match flow_id.get() {
            Some(id) => (200, id.clone()),
            None => (503, "pending".to_string()),
        },
        _ => (404, "not found".to_string()),
    };

    let mut response = Response::from_string(body).with_status_code(status);
    for (name, value) in [
        ("Access-Control-Allow-Origin", "*"),
        ("Content-Type", "text/plain; charset=utf-8"),
    ] {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response = response.with_header(header);
        }
    }

    if let Err(error) = request.respond(response) {
        trace!("failed to answer loopback request: {error}");
    }
}
