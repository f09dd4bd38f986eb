//! ZAP handshake service.
//!
//! One task owns the reply socket bound on a well-known endpoint and a
//! control channel. The loop polls both: control commands steer the
//! service (terminate, pause/resume, allow/deny), while each handshake
//! request is parsed, dispatched to the [`Authenticator`], and answered
//! with a [`ZapReply`] whose status code is always one of 200/400/500.
//! Termination takes effect after any in-flight reply has been sent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use zeromq::prelude::*;
use zeromq::{RepSocket, ReqSocket};

use super::authenticator::{Authenticator, AuthVerdict};
use super::zap::{Mechanism, StatusCode, ZapReply, ZapRequest, DEFAULT_ZAP_ENDPOINT};
use crate::context::Context;
use crate::error::{Error, Result};

const POLL_TIMEOUT: Duration = Duration::from_millis(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Control verbs understood by the service loop.
#[derive(Debug, Clone)]
enum ServiceCommand {
    Pause,
    Resume,
    Terminate,
    Allow(Vec<String>),
    Deny(Vec<String>),
}

/// Options for the handshake service.
#[derive(Debug, Clone)]
pub struct ZapServiceOptions {
    /// Endpoint the reply socket binds.
    pub endpoint: String,
}

impl Default for ZapServiceOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ZAP_ENDPOINT.to_string(),
        }
    }
}

/// The handshake service; owns one background task once started.
pub struct ZapService {
    context: Arc<Context>,
    authenticator: Arc<dyn Authenticator>,
    options: ZapServiceOptions,
    control: Option<mpsc::UnboundedSender<ServiceCommand>>,
    task: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl ZapService {
    pub fn new(context: Arc<Context>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self::with_options(context, authenticator, ZapServiceOptions::default())
    }

    pub fn with_options(
        context: Arc<Context>,
        authenticator: Arc<dyn Authenticator>,
        options: ZapServiceOptions,
    ) -> Self {
        Self {
            context,
            authenticator,
            options,
            control: None,
            task: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.options.endpoint
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the reply socket and launches the service loop.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("handshake service already running; stopping first");
            self.stop().await;
        }
        let mut socket = RepSocket::new();
        socket.bind(&self.options.endpoint).await?;
        debug!(endpoint = %self.options.endpoint, "handshake service bound");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let authenticator = Arc::clone(&self.authenticator);
        let task = self
            .context
            .spawn(service_loop(socket, authenticator, running, control_rx));
        self.control = Some(control_tx);
        self.task = Some(task);
        Ok(())
    }

    /// Whitelists addresses through the running service.
    pub fn allow(&self, addresses: Vec<String>) {
        if let Some(control) = &self.control {
            let _ = control.send(ServiceCommand::Allow(addresses));
        }
    }

    /// Blacklists addresses through the running service.
    pub fn deny(&self, addresses: Vec<String>) {
        if let Some(control) = &self.control {
            let _ = control.send(ServiceCommand::Deny(addresses));
        }
    }

    pub fn pause(&self) {
        if let Some(control) = &self.control {
            let _ = control.send(ServiceCommand::Pause);
        }
    }

    pub fn resume(&self) {
        if let Some(control) = &self.control {
            let _ = control.send(ServiceCommand::Resume);
        }
    }

    /// Terminates the loop and joins the task. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(ServiceCommand::Terminate);
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if timeout(JOIN_GRACE, task).await.is_err() {
                warn!("handshake service did not exit within grace; continuing shutdown");
            }
        }
    }
}

async fn service_loop(
    mut socket: RepSocket,
    authenticator: Arc<dyn Authenticator>,
    running: Arc<AtomicBool>,
    mut control: mpsc::UnboundedReceiver<ServiceCommand>,
) {
    let mut paused = false;
    while running.load(Ordering::SeqCst) {
        while let Ok(command) = control.try_recv() {
            match command {
                ServiceCommand::Pause => paused = true,
                ServiceCommand::Resume => paused = false,
                ServiceCommand::Terminate => {
                    running.store(false, Ordering::SeqCst);
                }
                ServiceCommand::Allow(addresses) => {
                    for address in addresses {
                        if let Err(e) = authenticator.allow(&address).await {
                            warn!(address = %address, error = %e, "allow failed");
                        }
                    }
                }
                ServiceCommand::Deny(addresses) => {
                    for address in addresses {
                        if let Err(e) = authenticator.deny(&address).await {
                            warn!(address = %address, error = %e, "deny failed");
                        }
                    }
                }
            }
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if paused {
            tokio::time::sleep(POLL_TIMEOUT).await;
            continue;
        }
        let request = match timeout(POLL_TIMEOUT, socket.recv()).await {
            Err(_) => continue, // poll timeout; check control again
            Ok(Err(e)) => {
                error!(error = %e, "handshake socket failure; stopping service");
                running.store(false, Ordering::SeqCst);
                break;
            }
            Ok(Ok(message)) => message,
        };
        let reply = handle_request(authenticator.as_ref(), &request).await;
        match reply.to_message() {
            Ok(message) => {
                if let Err(e) = socket.send(message).await {
                    error!(error = %e, "failed to send handshake reply");
                }
            }
            Err(e) => error!(error = %e, "failed to encode handshake reply"),
        }
    }
    debug!("handshake service loop exited");
}

async fn handle_request(
    authenticator: &dyn Authenticator,
    message: &zeromq::ZmqMessage,
) -> ZapReply {
    let request = match ZapRequest::from_message(message) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed handshake request");
            return ZapReply::new(Vec::new(), StatusCode::ClientError, e.to_string());
        }
    };
    debug!(
        domain = %request.domain,
        address = %request.address,
        mechanism = request.mechanism.as_str(),
        "handshake request"
    );
    let verdict = evaluate(authenticator, &request).await;
    let mut reply = ZapReply::new(
        request.request_id.clone(),
        verdict.status_code,
        verdict.status_text,
    );
    if verdict.status_code == StatusCode::Ok {
        reply.user_id = request.identity.clone();
    }
    reply
}

/// Whitelisting only exempts an address from the blacklist check; the
/// mechanism's credential validation always runs.
async fn evaluate(authenticator: &dyn Authenticator, request: &ZapRequest) -> AuthVerdict {
    if !request.address.is_empty() && authenticator.is_blacklisted(&request.address).await {
        return AuthVerdict::client_error("address blacklisted");
    }
    match request.mechanism {
        Mechanism::Null => AuthVerdict::ok(),
        Mechanism::Plain => {
            let [username, password] = match request.credentials.as_slice() {
                [username, password] => [username, password],
                _ => return AuthVerdict::client_error("plain mechanism requires two credentials"),
            };
            authenticator
                .validate_credentials(
                    &String::from_utf8_lossy(username),
                    &String::from_utf8_lossy(password),
                )
                .await
        }
        Mechanism::Curve => {
            let key = match request.credentials.as_slice() {
                [key] => key,
                _ => return AuthVerdict::client_error("curve mechanism requires a public key"),
            };
            authenticator
                .validate_public_key(&String::from_utf8_lossy(key))
                .await
        }
    }
}

/// Runs the client side of the handshake against a service endpoint.
///
/// Fails with [`Error::AuthDenied`] when the service answers anything but
/// 200, and with [`Error::Fatal`] when the service cannot be reached.
pub async fn perform_handshake(
    endpoint: &str,
    request: &ZapRequest,
) -> Result<ZapReply> {
    let mut socket = ReqSocket::new();
    timeout(HANDSHAKE_TIMEOUT, socket.connect(endpoint))
        .await
        .map_err(|_| Error::Fatal(format!("handshake service at {endpoint} unreachable")))??;
    socket.send(request.to_message()?).await?;
    let response = timeout(HANDSHAKE_TIMEOUT, socket.recv())
        .await
        .map_err(|_| Error::Fatal(format!("handshake with {endpoint} timed out")))??;
    let reply = ZapReply::from_message(&response)?;
    if reply.status_code != StatusCode::Ok {
        return Err(Error::AuthDenied(format!(
            "{} {}",
            reply.status_code.as_str(),
            reply.status_text
        )));
    }
    Ok(reply)
}
