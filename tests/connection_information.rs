//! Connection discovery through the operator registry.

use std::sync::Arc;
use std::time::Duration;

use seismq::authentication::SecurityLevel;
use seismq::services::connection_information::{
    ConnectionDetails, ConnectionInformationService, ConnectionInformationServiceOptions,
    ConnectionType, Requestor, RequestorOptions, SocketContact, SocketDetails,
};
use seismq::{Context, Error};

const OPERATOR: &str = "tcp://127.0.0.1:17071";

fn heartbeat_entry() -> ConnectionDetails {
    ConnectionDetails {
        name: "Heartbeat".to_string(),
        connection_type: ConnectionType::Broadcast,
        socket_details: SocketDetails::Proxy {
            frontend: SocketContact::new("tcp://127.0.0.1:17081", SecurityLevel::Grasslands),
            backend: SocketContact::new("tcp://127.0.0.1:17082", SecurityLevel::Grasslands),
        },
    }
}

fn cache_entry() -> ConnectionDetails {
    ConnectionDetails {
        name: "PacketCache".to_string(),
        connection_type: ConnectionType::Service,
        socket_details: SocketDetails::Proxy {
            frontend: SocketContact::new("tcp://127.0.0.1:17083", SecurityLevel::Grasslands),
            backend: SocketContact::new("tcp://127.0.0.1:17084", SecurityLevel::Grasslands),
        },
    }
}

#[tokio::test]
async fn modules_discover_registered_endpoints() -> anyhow::Result<()> {
    let context = Arc::new(Context::current());

    let mut service = ConnectionInformationService::new(Arc::clone(&context));
    service.add_connection(heartbeat_entry());
    service.add_connection(cache_entry());
    service
        .initialize(ConnectionInformationServiceOptions::new(OPERATOR))
        .await?;
    service.start().await?;
    assert!(service.is_running());

    let mut requestor = Requestor::new(Arc::clone(&context));
    let mut options = RequestorOptions::new(OPERATOR);
    options.timeout = Some(Duration::from_secs(2));
    requestor.initialize(options).await?;

    let connections = requestor
        .available_connections()
        .await?
        .expect("the operator answers");
    assert_eq!(connections.len(), 2);
    assert_eq!(connections[0].name, "Heartbeat"); // sorted by name

    let frontend = requestor.proxy_broadcast_frontend("Heartbeat").await?;
    assert_eq!(frontend.address, "tcp://127.0.0.1:17081");
    let backend = requestor.proxy_broadcast_backend("Heartbeat").await?;
    assert_eq!(backend.address, "tcp://127.0.0.1:17082");

    let backend = requestor.proxy_service_backend("PacketCache").await?;
    assert_eq!(backend.address, "tcp://127.0.0.1:17084");

    let missing = requestor.proxy_broadcast_frontend("NoSuchBroadcast").await;
    assert!(matches!(missing, Err(Error::InvalidArgument(_))));

    requestor.disconnect().await;
    service.stop().await;
    Ok(())
}
