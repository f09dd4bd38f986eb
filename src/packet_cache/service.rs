//! Packet cache service.
//!
//! Three cooperating tasks around one [`CappedCollection`]: a broadcast
//! pump receiving packets from the data broadcast, a drainer moving them
//! from the decoupling queue into the collection, and a router answering
//! windowed queries. Startup wires the responder before the drainer and
//! the drainer before the pump; shutdown reverses that, stopping the pump
//! first so nothing arrives once the drainer is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::domain::MaxPackets;
use crate::error::{Error, Result};
use crate::messages::{DataPacket, Message, MessageRegistry, Sample};
use crate::queue::BoundedQueue;
use crate::socket::{Router, RouterCallback, RouterOptions, Subscriber, SubscriberOptions};

use super::capped_collection::CappedCollection;
use super::messages::{
    BulkDataRequest, BulkDataResponse, DataRequest, DataResponse, InterpolatedRequest,
    InterpolatedResponse, ReturnCode, SensorRequest, SensorResponse,
};
use super::wiggins::WigginsInterpolator;

const PUMP_POLL: Duration = Duration::from_millis(10);
const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Options for [`PacketCacheService`].
#[derive(Debug, Clone)]
pub struct PacketCacheServiceOptions {
    /// Per-channel packet budget.
    pub max_packets: MaxPackets,
    /// Connection to the external data broadcast; the registry is replaced
    /// with the packet format the cache consumes.
    pub subscriber: SubscriberOptions,
    /// Query endpoint; the callback is installed by the service.
    pub router: RouterOptions,
    /// Depth of the pump-to-drainer queue.
    pub queue_capacity: usize,
}

impl PacketCacheServiceOptions {
    pub fn new(
        max_packets: MaxPackets,
        subscriber: SubscriberOptions,
        router: RouterOptions,
    ) -> Self {
        Self {
            max_packets,
            subscriber,
            router,
            queue_capacity: 8192,
        }
    }
}

/// Builds the responder callback over a shared collection.
///
/// Queries run against the sharded map only; no network I/O happens
/// inside the callback.
fn make_callback<T: Sample>(collection: Arc<CappedCollection<T>>) -> RouterCallback {
    Arc::new(move |type_tag, payload| {
        if type_tag == BulkDataRequest::TYPE_TAG {
            let mut request = BulkDataRequest::default();
            request.from_payload(payload)?;
            let responses = request
                .sncls
                .iter()
                .map(|sncl| {
                    let packets = collection.query(
                        sncl,
                        request.start_time_micros,
                        request.end_time_micros,
                    );
                    let return_code = if packets.is_empty() {
                        ReturnCode::NoData
                    } else {
                        ReturnCode::Success
                    };
                    DataResponse {
                        identifier: request.identifier,
                        sncl: sncl.clone(),
                        packets,
                        return_code,
                    }
                })
                .collect();
            Ok(Box::new(BulkDataResponse::<T> {
                identifier: request.identifier,
                responses,
                return_code: ReturnCode::Success,
            }) as Box<dyn Message>)
        } else if type_tag == DataRequest::TYPE_TAG {
            let mut request = DataRequest::default();
            request.from_payload(payload)?;
            let packets = collection.query(
                &request.sncl,
                request.start_time_micros,
                request.end_time_micros,
            );
            let return_code = if packets.is_empty() {
                ReturnCode::NoData
            } else {
                ReturnCode::Success
            };
            Ok(Box::new(DataResponse {
                identifier: request.identifier,
                sncl: request.sncl.clone(),
                packets,
                return_code,
            }) as Box<dyn Message>)
        } else if type_tag == InterpolatedRequest::TYPE_TAG {
            let mut request = InterpolatedRequest::default();
            request.from_payload(payload)?;
            Ok(Box::new(interpolate_window(&collection, &request)) as Box<dyn Message>)
        } else if type_tag == SensorRequest::TYPE_TAG {
            let mut request = SensorRequest::default();
            request.from_payload(payload)?;
            Ok(Box::new(SensorResponse {
                identifier: request.identifier,
                sncls: collection.sncls(),
                return_code: ReturnCode::Success,
            }) as Box<dyn Message>)
        } else {
            Err(Error::UnknownType(type_tag.to_string()))
        }
    })
}

fn interpolate_window<T: Sample>(
    collection: &CappedCollection<T>,
    request: &InterpolatedRequest,
) -> InterpolatedResponse {
    let mut response = InterpolatedResponse {
        identifier: request.identifier,
        sncl: request.sncl.clone(),
        sampling_rate: request.target_sampling_rate,
        ..InterpolatedResponse::default()
    };
    let packets = collection.query(
        &request.sncl,
        request.start_time_micros,
        request.end_time_micros,
    );
    if packets.is_empty() {
        response.return_code = ReturnCode::NoData;
        return response;
    }
    let mut interpolator = WigginsInterpolator::new();
    if let Err(e) = interpolator.set_target_sampling_rate(request.target_sampling_rate) {
        warn!(error = %e, "bad interpolation request");
        response.return_code = ReturnCode::InvalidMessage;
        return response;
    }
    interpolator.set_gap_tolerance_micros(request.gap_tolerance_micros);
    match interpolator.interpolate(&packets) {
        Ok(()) => {
            response.signal = interpolator.signal().to_vec();
            response.gap_indicator = interpolator.gap_indicator().to_vec();
            response.start_time_micros = interpolator.start_time_micros();
            response.end_time_micros = interpolator.end_time_micros();
            response.return_code = ReturnCode::Success;
        }
        Err(e) => {
            warn!(sncl = %request.sncl, error = %e, "interpolation failed");
            response.return_code = ReturnCode::AlgorithmicFailure;
        }
    }
    response
}

/// The composed cache service.
pub struct PacketCacheService<T: Sample> {
    context: Arc<Context>,
    collection: Option<Arc<CappedCollection<T>>>,
    subscriber: Option<Subscriber>,
    router: Router,
    queue: Option<Arc<BoundedQueue<DataPacket<T>>>>,
    running: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    drainer: Option<JoinHandle<()>>,
}

impl<T: Sample> PacketCacheService<T> {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            router: Router::new(Arc::clone(&context)),
            context,
            collection: None,
            subscriber: None,
            queue: None,
            running: Arc::new(AtomicBool::new(false)),
            pump: None,
            drainer: None,
        }
    }

    /// Wires the subscriber, the collection, and the query router.
    pub async fn initialize(&mut self, options: PacketCacheServiceOptions) -> Result<()> {
        self.stop().await;

        let mut registry = MessageRegistry::new();
        registry.add::<DataPacket<T>>();
        let mut subscriber_options = options.subscriber.clone();
        subscriber_options.registry = registry;
        if subscriber_options.receive_timeout.is_none() {
            // The pump must notice a lowered keep-running flag.
            subscriber_options.receive_timeout = Some(PUMP_POLL);
        }
        let mut subscriber = Subscriber::new(Arc::clone(&self.context));
        subscriber.initialize(subscriber_options).await?;

        let collection = Arc::new(CappedCollection::new(options.max_packets));

        let mut router_options = options.router.clone();
        router_options.set_callback(make_callback(Arc::clone(&collection)));
        self.router.initialize(router_options).await?;

        if options.queue_capacity == 0 {
            return Err(Error::InvalidArgument(
                "queue capacity must be positive".to_string(),
            ));
        }
        self.queue = Some(Arc::new(BoundedQueue::new(options.queue_capacity)));
        self.subscriber = Some(subscriber);
        self.collection = Some(collection);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.collection.is_some()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts responder, drainer, and pump, in that order.
    pub async fn start(&mut self) -> Result<()> {
        let subscriber = self
            .subscriber
            .take()
            .ok_or(Error::NotInitialized("packet cache service"))?;
        let collection = self
            .collection
            .clone()
            .ok_or(Error::NotInitialized("packet cache service"))?;
        let queue = self
            .queue
            .clone()
            .ok_or(Error::NotInitialized("packet cache service"))?;

        self.router.start().await?;
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let drain_queue = Arc::clone(&queue);
        self.drainer = Some(self.context.spawn(async move {
            while running.load(Ordering::SeqCst) {
                if let Some(packet) = drain_queue.pop_timeout(PUMP_POLL).await {
                    if let Err(e) = collection.add(packet) {
                        error!(error = %e, "failed to add packet; dropped");
                    }
                }
            }
            debug!("queue-to-collection drainer exited");
        }));

        let running = Arc::clone(&self.running);
        self.pump = Some(self.context.spawn(async move {
            let mut subscriber = subscriber;
            while running.load(Ordering::SeqCst) {
                match subscriber.receive().await {
                    Ok(Some(message)) => {
                        let Some(packet) =
                            message.as_any().downcast_ref::<DataPacket<T>>()
                        else {
                            warn!(type_tag = message.type_tag(), "unexpected broadcast message");
                            continue;
                        };
                        if !queue.push(packet.clone()).await {
                            break;
                        }
                    }
                    Ok(None) => {} // receive timeout; check the flag
                    Err(Error::Decode(detail)) | Err(Error::UnknownType(detail)) => {
                        warn!(detail = %detail, "undecodable broadcast packet skipped");
                    }
                    Err(e) => {
                        error!(error = %e, "broadcast pump failure; exiting");
                        break;
                    }
                }
            }
            debug!("broadcast pump exited");
        }));
        Ok(())
    }

    /// Stops pump, drainer, then responder. Idempotent.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let mut tasks = Vec::new();
        if let Some(pump) = self.pump.take() {
            tasks.push(pump);
        }
        if let Some(drainer) = self.drainer.take() {
            tasks.push(drainer);
        }
        if !tasks.is_empty() && timeout(JOIN_GRACE, join_all(tasks)).await.is_err() {
            warn!("cache tasks did not exit within grace; continuing shutdown");
        }
        self.router.stop().await;
    }

    /// Packets held across all channels.
    #[must_use]
    pub fn total_packets(&self) -> usize {
        self.collection
            .as_ref()
            .map_or(0, |collection| collection.total_packets())
    }

    /// Shared handle onto the live collection.
    #[must_use]
    pub fn collection(&self) -> Option<Arc<CappedCollection<T>>> {
        self.collection.clone()
    }
}
