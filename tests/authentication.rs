//! Handshake service against the in-memory and SQLite authenticators.

use std::sync::Arc;
use std::time::Duration;

use seismq::authentication::{
    perform_handshake, Authenticator, MemoryAuthenticator, SqliteAuthenticator, StatusCode, User,
    UserPrivileges, ZapOptions, ZapService, ZapServiceOptions,
};
use seismq::socket::{Publisher, PublisherOptions};
use seismq::{Context, Error};

fn ipc_endpoint(dir: &tempfile::TempDir, name: &str) -> String {
    format!("ipc://{}/{name}.ipc", dir.path().display())
}

async fn start_service(
    context: &Arc<Context>,
    authenticator: Arc<dyn Authenticator>,
    endpoint: &str,
) -> ZapService {
    let mut service = ZapService::with_options(
        Arc::clone(context),
        authenticator,
        ZapServiceOptions {
            endpoint: endpoint.to_string(),
        },
    );
    service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    service
}

#[tokio::test]
async fn woodhouse_handshake_accepts_and_rejects() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = ipc_endpoint(&dir, "zap-memory");
    let context = Arc::new(Context::current());

    let authenticator = Arc::new(MemoryAuthenticator::new());
    authenticator.add_credential("operator", User::hash_password("s3cret")?);
    let mut service = start_service(&context, authenticator, &endpoint).await;
    assert!(service.is_running());

    // Correct credentials pass.
    let good = ZapOptions::woodhouse_client(&endpoint, "operator", "s3cret");
    let reply = perform_handshake(&endpoint, &good.client_request("client-1")?).await?;
    assert_eq!(reply.status_code, StatusCode::Ok);
    assert_eq!(reply.user_id, "client-1");

    // A wrong password is denied with a 400.
    let bad = ZapOptions::woodhouse_client(&endpoint, "operator", "wrong");
    let denied = perform_handshake(&endpoint, &bad.client_request("client-2")?).await;
    assert!(matches!(denied, Err(Error::AuthDenied(text)) if text.starts_with("400")));

    service.stop().await;
    assert!(!service.is_running());
    service.stop().await; // idempotent
    Ok(())
}

#[tokio::test]
async fn blacklisted_addresses_are_refused() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = ipc_endpoint(&dir, "zap-blacklist");
    let context = Arc::new(Context::current());

    let authenticator = Arc::new(MemoryAuthenticator::new());
    authenticator.add_credential("operator", User::hash_password("s3cret")?);
    authenticator.deny("10.11.*").await?;
    let mut service = start_service(&context, authenticator, &endpoint).await;

    let options = ZapOptions::woodhouse_client(&endpoint, "operator", "s3cret");
    let mut request = options.client_request("client-3")?;
    request.address = "10.11.12.13".to_string();
    let denied = perform_handshake(&endpoint, &request).await;
    assert!(matches!(denied, Err(Error::AuthDenied(_))));

    // The same credentials from elsewhere still pass.
    let mut request = options.client_request("client-4")?;
    request.address = "192.168.0.2".to_string();
    let reply = perform_handshake(&endpoint, &request).await?;
    assert_eq!(reply.status_code, StatusCode::Ok);

    // ALLOW through the running service's control channel lifts the ban.
    service.allow(vec!["10.11.*".to_string()]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut request = options.client_request("client-5")?;
    request.address = "10.11.12.13".to_string();
    let reply = perform_handshake(&endpoint, &request).await?;
    assert_eq!(reply.status_code, StatusCode::Ok);

    // Whitelisting never stands in for credentials: a wrong password from
    // the whitelisted address is still denied.
    let bad = ZapOptions::woodhouse_client(&endpoint, "operator", "wrong");
    let mut request = bad.client_request("client-6")?;
    request.address = "10.11.12.13".to_string();
    let denied = perform_handshake(&endpoint, &request).await;
    assert!(matches!(denied, Err(Error::AuthDenied(text)) if text.starts_with("400")));

    service.stop().await;
    Ok(())
}

#[tokio::test]
async fn sockets_refuse_to_initialize_on_denied_credentials() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = ipc_endpoint(&dir, "zap-socket");
    let context = Arc::new(Context::current());

    let authenticator = Arc::new(MemoryAuthenticator::new());
    authenticator.add_credential("operator", User::hash_password("s3cret")?);
    let mut service = start_service(&context, authenticator, &endpoint).await;

    let mut publisher = Publisher::new(Arc::clone(&context));
    let mut options = PublisherOptions::new("tcp://127.0.0.1:17061");
    options.zap = ZapOptions::woodhouse_client(&endpoint, "operator", "nope");
    let outcome = publisher.initialize(options).await;
    assert!(matches!(outcome, Err(Error::AuthDenied(_))));
    assert!(!publisher.is_initialized());

    service.stop().await;
    Ok(())
}

#[tokio::test]
async fn sqlite_backed_handshake() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = ipc_endpoint(&dir, "zap-sqlite");
    let context = Arc::new(Context::current());

    let mut authenticator = SqliteAuthenticator::new();
    authenticator
        .initialize(&dir.path().join("credentials.sqlite3"), true)
        .await?;
    authenticator
        .add_user(&User {
            name: "station-ops".to_string(),
            email: "ops@observatory.edu".to_string(),
            hashed_password: Some(User::hash_password("orange-juice")?),
            public_key: Some("q".repeat(40)),
            privileges: UserPrivileges::ReadWrite,
            ..User::default()
        })
        .await?;
    let mut service = start_service(&context, Arc::new(authenticator), &endpoint).await;

    let plain = ZapOptions::woodhouse_client(&endpoint, "station-ops", "orange-juice");
    let reply = perform_handshake(&endpoint, &plain.client_request("sta-1")?).await?;
    assert_eq!(reply.status_code, StatusCode::Ok);

    let curve = ZapOptions::stonehouse_client(
        &endpoint,
        seismq::authentication::Keys {
            public_key: "q".repeat(40),
            private_key: None,
        },
    );
    let reply = perform_handshake(&endpoint, &curve.client_request("sta-2")?).await?;
    assert_eq!(reply.status_code, StatusCode::Ok);

    let unknown_key = ZapOptions::stonehouse_client(
        &endpoint,
        seismq::authentication::Keys {
            public_key: "z".repeat(40),
            private_key: None,
        },
    );
    let denied = perform_handshake(&endpoint, &unknown_key.client_request("sta-3")?).await;
    assert!(matches!(denied, Err(Error::AuthDenied(_))));

    service.stop().await;
    Ok(())
}
