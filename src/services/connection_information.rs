//! Connection information service.
//!
//! The operator-side registry of everything a deployment exposes: modules
//! register the broadcasts and services they own, and clients query the
//! registry to learn frontend/backend addresses along with the security
//! posture required to reach them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::authentication::{SecurityLevel, ZapOptions};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::messages::{decode_cbor, encode_cbor, Message, MessageRegistry};
use crate::socket::{Request, RequestOptions, Router, RouterOptions};

/// Whether a registered connection is a request/reply service or a
/// pub/sub broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    Service,
    Broadcast,
}

/// Which side of the endpoint the counterparty should take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectOrBind {
    #[default]
    Connect,
    Bind,
}

/// Address and posture of one socket endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketContact {
    pub address: String,
    pub security_level: SecurityLevel,
    pub connect_or_bind: ConnectOrBind,
}

impl SocketContact {
    pub fn new(address: impl Into<String>, security_level: SecurityLevel) -> Self {
        Self {
            address: address.into(),
            security_level,
            connect_or_bind: ConnectOrBind::Connect,
        }
    }
}

/// Socket-role-tagged endpoint details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketDetails {
    Publisher(SocketContact),
    Subscriber(SocketContact),
    XPublisher(SocketContact),
    XSubscriber(SocketContact),
    Request(SocketContact),
    Router(SocketContact),
    Dealer(SocketContact),
    Reply(SocketContact),
    /// A brokered endpoint pair: producers use the frontend, consumers
    /// the backend.
    Proxy {
        frontend: SocketContact,
        backend: SocketContact,
    },
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub name: String,
    pub connection_type: ConnectionType,
    pub socket_details: SocketDetails,
}

/// Asks the operator for everything it knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableConnectionsRequest {}

impl AvailableConnectionsRequest {
    pub const TYPE_TAG: &'static str =
        "Seismq.ConnectionInformation.AvailableConnectionsRequest";
}

impl Message for AvailableConnectionsRequest {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn to_payload(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    fn from_payload(&mut self, payload: &[u8]) -> Result<()> {
        *self = decode_cbor(payload)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn box_clone(&self) -> Box<dyn Message> {
        Box::new(self.clone())
    }
}

/// Everything the operator knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableConnectionsResponse {
    pub details: Vec<ConnectionDetails>,
}

impl AvailableConnectionsResponse {
    pub const TYPE_TAG: &'static str =
        "Seismq.ConnectionInformation.AvailableConnectionsResponse";
}

impl Message for AvailableConnectionsResponse {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn to_payload(&self) -> Result<Vec<u8>> {
        encode_cbor(self)
    }

    fn from_payload(&mut self, payload: &[u8]) -> Result<()> {
        *self = decode_cbor(payload)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn box_clone(&self) -> Box<dyn Message> {
        Box::new(self.clone())
    }
}

/// Options for [`ConnectionInformationService`].
#[derive(Debug, Clone)]
pub struct ConnectionInformationServiceOptions {
    /// Address the registry's router binds.
    pub address: String,
    pub zap: ZapOptions,
}

impl ConnectionInformationServiceOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            zap: ZapOptions::default(),
        }
    }
}

/// The registry service.
pub struct ConnectionInformationService {
    router: Router,
    connections: Arc<RwLock<HashMap<String, ConnectionDetails>>>,
}

impl ConnectionInformationService {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            router: Router::new(context),
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a connection, replacing a same-named entry with a
    /// warning.
    pub fn add_connection(&self, details: ConnectionDetails) {
        if let Ok(mut connections) = self.connections.write() {
            if connections
                .insert(details.name.clone(), details)
                .is_some()
            {
                warn!("replaced a registered connection");
            }
        }
    }

    pub fn remove_connection(&self, name: &str) {
        if let Ok(mut connections) = self.connections.write() {
            connections.remove(name);
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().map(|c| c.len()).unwrap_or(0)
    }

    pub async fn initialize(
        &mut self,
        options: ConnectionInformationServiceOptions,
    ) -> Result<()> {
        let connections = Arc::clone(&self.connections);
        let mut router_options = RouterOptions::new(options.address);
        router_options.zap = options.zap;
        router_options.set_callback(Arc::new(move |type_tag, payload| {
            if type_tag != AvailableConnectionsRequest::TYPE_TAG {
                return Err(Error::UnknownType(type_tag.to_string()));
            }
            let mut request = AvailableConnectionsRequest::default();
            request.from_payload(payload)?;
            let mut details: Vec<ConnectionDetails> = connections
                .read()
                .map_err(|_| Error::Fatal("connection registry lock poisoned".to_string()))?
                .values()
                .cloned()
                .collect();
            details.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(Box::new(AvailableConnectionsResponse { details }) as Box<dyn Message>)
        }));
        self.router.initialize(router_options).await
    }

    pub async fn start(&mut self) -> Result<()> {
        self.router.start().await
    }

    pub async fn stop(&mut self) {
        self.router.stop().await;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.router.is_running()
    }
}

/// Options for [`Requestor`].
#[derive(Debug, Clone)]
pub struct RequestorOptions {
    pub address: String,
    pub timeout: Option<std::time::Duration>,
    pub zap: ZapOptions,
}

impl RequestorOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Some(std::time::Duration::from_secs(5)),
            zap: ZapOptions::default(),
        }
    }
}

/// Client of the connection information service.
pub struct Requestor {
    request: Request,
    zap: ZapOptions,
}

impl Requestor {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            request: Request::new(context),
            zap: ZapOptions::default(),
        }
    }

    pub async fn initialize(&mut self, options: RequestorOptions) -> Result<()> {
        let mut registry = MessageRegistry::new();
        registry.add::<AvailableConnectionsResponse>();
        let mut request_options = RequestOptions::new(options.address, registry);
        request_options.timeout = options.timeout;
        request_options.zap = options.zap.clone();
        self.zap = options.zap;
        self.request.initialize(request_options).await
    }

    /// The operator's ZAP options, to be reused for the connections it
    /// announced.
    #[must_use]
    pub fn zap_options(&self) -> &ZapOptions {
        &self.zap
    }

    /// Everything the operator knows; `None` on timeout.
    pub async fn available_connections(&mut self) -> Result<Option<Vec<ConnectionDetails>>> {
        let request = AvailableConnectionsRequest::default();
        let Some(reply) = self.request.request(&request).await? else {
            return Ok(None);
        };
        let response = reply
            .as_any()
            .downcast_ref::<AvailableConnectionsResponse>()
            .ok_or_else(|| Error::Decode("unexpected reply type".to_string()))?;
        Ok(Some(response.details.clone()))
    }

    /// Frontend contact of a named proxy broadcast.
    pub async fn proxy_broadcast_frontend(&mut self, name: &str) -> Result<SocketContact> {
        self.proxy_contact(name, ConnectionType::Broadcast, true).await
    }

    /// Backend contact of a named proxy broadcast.
    pub async fn proxy_broadcast_backend(&mut self, name: &str) -> Result<SocketContact> {
        self.proxy_contact(name, ConnectionType::Broadcast, false).await
    }

    /// Frontend contact of a named proxy service.
    pub async fn proxy_service_frontend(&mut self, name: &str) -> Result<SocketContact> {
        self.proxy_contact(name, ConnectionType::Service, true).await
    }

    /// Backend contact of a named proxy service.
    pub async fn proxy_service_backend(&mut self, name: &str) -> Result<SocketContact> {
        self.proxy_contact(name, ConnectionType::Service, false).await
    }

    async fn proxy_contact(
        &mut self,
        name: &str,
        connection_type: ConnectionType,
        frontend: bool,
    ) -> Result<SocketContact> {
        let details = self
            .available_connections()
            .await?
            .ok_or_else(|| Error::Fatal("connection information request timed out".to_string()))?;
        let entry = details
            .iter()
            .find(|d| d.name == name && d.connection_type == connection_type)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("no registered connection named '{name}'"))
            })?;
        match &entry.socket_details {
            SocketDetails::Proxy { frontend: f, backend: b } => {
                Ok(if frontend { f.clone() } else { b.clone() })
            }
            _ => Err(Error::InvalidArgument(format!(
                "connection '{name}' is not a proxy"
            ))),
        }
    }

    pub async fn disconnect(&mut self) {
        self.request.disconnect().await;
    }
}
