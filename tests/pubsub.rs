//! Direct publish/subscribe round trip.

use std::sync::Arc;
use std::time::Duration;

use seismq::messages::{MessageRegistry, Pick, Polarity};
use seismq::socket::{PublisherOptions, SubscriberOptions, Subscriber, XPublisher};
use seismq::Context;

fn example_pick() -> Pick {
    let mut pick = Pick::new();
    pick.set_identifier(4043);
    pick.set_network("UU").unwrap();
    pick.set_station("NOQ").unwrap();
    pick.set_channel("EHZ").unwrap();
    pick.set_location("01");
    pick.set_phase_hint("P");
    pick.set_time(600.0);
    pick.set_polarity(Polarity::Up);
    pick
}

#[test_log::test(tokio::test)]
async fn publisher_to_subscriber_echo() -> anyhow::Result<()> {
    const ADDRESS: &str = "tcp://127.0.0.1:17011";
    let context = Arc::new(Context::current());

    let mut publisher = XPublisher::new(Arc::clone(&context));
    publisher.initialize(PublisherOptions::new(ADDRESS)).await?;

    let mut registry = MessageRegistry::new();
    registry.add::<Pick>();
    let mut options = SubscriberOptions::new(ADDRESS, registry);
    options.receive_timeout = Some(Duration::from_secs(1));
    let mut subscriber = Subscriber::new(Arc::clone(&context));
    subscriber.initialize(options).await?;

    // Let the subscription propagate before the first send.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let sent = example_pick();
    publisher.send(&sent).await?;

    let received = subscriber
        .receive()
        .await?
        .expect("pick should arrive within a second");
    let received = received
        .as_any()
        .downcast_ref::<Pick>()
        .expect("a pick was published");
    assert_eq!(received, &sent);

    // Nothing else was published; the next receive times out.
    let nothing = subscriber.receive().await?;
    assert!(nothing.is_none());

    subscriber.disconnect().await;
    publisher.disconnect().await;
    Ok(())
}
