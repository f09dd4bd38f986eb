//! End-to-end packet cache service: broadcast in, windowed queries out.

use std::sync::Arc;
use std::time::Duration;

use seismq::domain::MaxPackets;
use seismq::messages::{DataPacket, Failure, MessageRegistry, SnclKey};
use seismq::packet_cache::{
    BulkDataRequest, BulkDataResponse, InterpolatedRequest, InterpolatedResponse,
    PacketCacheService, PacketCacheServiceOptions, ReturnCode, SensorRequest, SensorResponse,
};
use seismq::socket::{
    PublisherOptions, Request, RequestOptions, RouterOptions, SubscriberOptions, XPublisher,
};
use seismq::Context;

const BROADCAST: &str = "tcp://127.0.0.1:17051";
const REPLIER: &str = "tcp://127.0.0.1:17052";

fn packet(start_micros: i64) -> DataPacket<f64> {
    let mut p = DataPacket::new();
    p.set_network("UU").unwrap();
    p.set_station("NOQ").unwrap();
    p.set_channel("EHZ").unwrap();
    p.set_location("01");
    p.set_sampling_rate(100.0).unwrap();
    p.set_start_time_micros(start_micros);
    // A 100 ms ramp starting at the packet's start value.
    p.set_samples((0..=10).map(|k| f64::from(k) + (start_micros / 100_000) as f64).collect());
    p
}

fn sncl() -> SnclKey {
    SnclKey::new("UU", "NOQ", "EHZ", "01")
}

fn client_registry() -> MessageRegistry {
    let mut registry = MessageRegistry::new();
    registry.add::<BulkDataResponse<f64>>();
    registry.add::<InterpolatedResponse>();
    registry.add::<SensorResponse>();
    registry.add::<Failure>();
    registry
}

#[tokio::test]
async fn cache_ingests_and_answers_queries() -> anyhow::Result<()> {
    let context = Arc::new(Context::current());

    // The external data broadcast this cache listens to.
    let mut broadcast = XPublisher::new(Arc::clone(&context));
    broadcast
        .initialize(PublisherOptions::new(BROADCAST))
        .await?;

    let mut service: PacketCacheService<f64> = PacketCacheService::new(Arc::clone(&context));
    let subscriber_options = SubscriberOptions::new(BROADCAST, MessageRegistry::new());
    let options = PacketCacheServiceOptions::new(
        MaxPackets::try_new(16).unwrap(),
        subscriber_options,
        RouterOptions::new(REPLIER),
    );
    service.initialize(options).await?;
    service.start().await?;
    assert!(service.is_running());

    tokio::time::sleep(Duration::from_millis(500)).await;

    // Four consecutive 100 ms packets.
    for start in [0, 100_000, 200_000, 300_000] {
        broadcast.send(&packet(start)).await?;
    }

    // Wait for the pump and drainer to file everything.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while service.total_packets() < 4 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "cache ingested only {} of 4 packets",
            service.total_packets()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut client = Request::new(Arc::clone(&context));
    let mut request_options = RequestOptions::new(REPLIER, client_registry());
    request_options.timeout = Some(Duration::from_secs(2));
    client.initialize(request_options).await?;

    // Windowed bulk query over the middle of the data; the window's
    // edges intersect the second and third packets only.
    let bulk = BulkDataRequest {
        identifier: 7,
        sncls: vec![sncl()],
        start_time_micros: 150_000,
        end_time_micros: 250_000,
    };
    let reply = client.request(&bulk).await?.expect("bulk reply");
    let reply = reply
        .as_any()
        .downcast_ref::<BulkDataResponse<f64>>()
        .expect("a bulk response");
    assert_eq!(reply.identifier, 7);
    assert_eq!(reply.responses.len(), 1);
    let starts: Vec<i64> = reply.responses[0]
        .packets
        .iter()
        .map(DataPacket::start_time_micros)
        .collect();
    assert_eq!(starts, vec![100_000, 200_000]);

    // The sensor inventory lists the one channel.
    let sensors = client
        .request(&SensorRequest { identifier: 8 })
        .await?
        .expect("sensor reply");
    let sensors = sensors
        .as_any()
        .downcast_ref::<SensorResponse>()
        .expect("a sensor response");
    assert_eq!(sensors.sncls, vec![sncl()]);

    // An interpolated query across the full window.
    let interpolated = InterpolatedRequest {
        identifier: 9,
        sncl: sncl(),
        start_time_micros: 0,
        end_time_micros: 400_000,
        target_sampling_rate: 200.0,
        gap_tolerance_micros: 30_000,
    };
    let reply = client
        .request(&interpolated)
        .await?
        .expect("interpolated reply");
    let reply = reply
        .as_any()
        .downcast_ref::<InterpolatedResponse>()
        .expect("an interpolated response");
    assert_eq!(reply.return_code, ReturnCode::Success);
    assert_eq!(reply.signal.len(), reply.gap_indicator.len());
    assert!(!reply.signal.is_empty());

    // A request type the cache does not serve becomes a Failure.
    let stray = SensorResponse::default();
    let reply = client.request(&stray).await?.expect("failure reply");
    assert!(reply.as_any().downcast_ref::<Failure>().is_some());

    client.disconnect().await;
    service.stop().await;
    assert!(!service.is_running());
    broadcast.disconnect().await;
    Ok(())
}
