//! Capped per-channel packet collection.

use dashmap::DashMap;
use tracing::debug;

use crate::domain::MaxPackets;
use crate::error::{Error, Result};
use crate::messages::{DataPacket, Sample, SnclKey};

use super::circular_buffer::CircularBuffer;

/// Map from SNCL identity onto a bounded ring of packets.
///
/// One writer (the broadcast pump) and any number of query readers; the
/// sharded map guarantees an `add` whose completion happens-before a
/// `query` is visible to that query. The collection outlives the pump and
/// responder tasks that touch it and is shared by reference.
#[derive(Debug)]
pub struct CappedCollection<T: Sample> {
    buckets: DashMap<SnclKey, CircularBuffer<T>>,
    max_packets: usize,
}

impl<T: Sample> CappedCollection<T> {
    #[must_use]
    pub fn new(max_packets: MaxPackets) -> Self {
        Self {
            buckets: DashMap::new(),
            max_packets: max_packets.into_inner(),
        }
    }

    /// Per-channel packet budget.
    #[must_use]
    pub fn max_packets(&self) -> usize {
        self.max_packets
    }

    /// Files `packet` under its SNCL, keeping the bucket ordered and
    /// bounded.
    pub fn add(&self, packet: DataPacket<T>) -> Result<()> {
        if !packet.have_identity() {
            return Err(Error::InvalidArgument(
                "packet is missing its SNCL identity".to_string(),
            ));
        }
        if !packet.have_sampling_rate() {
            return Err(Error::InvalidArgument(format!(
                "packet {} has no sampling rate",
                packet.sncl_key()
            )));
        }
        if packet.number_of_samples() == 0 {
            return Err(Error::InvalidArgument(format!(
                "packet {} has no samples",
                packet.sncl_key()
            )));
        }
        let key = packet.sncl_key();
        let mut bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(sncl = %key, "first packet for channel");
                CircularBuffer::new(self.max_packets)
            });
        bucket.add(packet);
        Ok(())
    }

    /// Ordered packets for `key` intersecting `[t0, t1]` inclusively;
    /// unknown channels yield an empty answer.
    #[must_use]
    pub fn query(&self, key: &SnclKey, t0: i64, t1: i64) -> Vec<DataPacket<T>> {
        self.buckets
            .get(key)
            .map(|bucket| bucket.query(t0, t1))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, key: &SnclKey) -> bool {
        self.buckets.contains_key(key)
    }

    /// Packets currently held for one channel.
    #[must_use]
    pub fn size(&self, key: &SnclKey) -> usize {
        self.buckets.get(key).map_or(0, |bucket| bucket.len())
    }

    /// Packets currently held across every channel.
    #[must_use]
    pub fn total_packets(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    /// Known channels, sorted for stable observability output.
    #[must_use]
    pub fn sncls(&self) -> Vec<SnclKey> {
        let mut keys: Vec<SnclKey> = self.buckets.iter().map(|b| b.key().clone()).collect();
        keys.sort_by_key(ToString::to_string);
        keys
    }

    /// Earliest start time held for one channel.
    #[must_use]
    pub fn earliest_start_time(&self, key: &SnclKey) -> Option<i64> {
        self.buckets
            .get(key)
            .and_then(|bucket| bucket.earliest_start_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(sncl: &SnclKey, start: i64) -> DataPacket<f64> {
        let mut p = DataPacket::new();
        p.set_network(sncl.network.clone()).unwrap();
        p.set_station(sncl.station.clone()).unwrap();
        p.set_channel(sncl.channel.clone()).unwrap();
        p.set_location(sncl.location.clone());
        p.set_sampling_rate(100.0).unwrap();
        p.set_start_time_micros(start);
        p.set_samples(vec![1.0, 2.0, 3.0]);
        p
    }

    fn key() -> SnclKey {
        SnclKey::new("UU", "NOQ", "EHZ", "01")
    }

    #[test]
    fn eviction_keeps_the_newest_three() {
        let collection = CappedCollection::new(MaxPackets::try_new(3).unwrap());
        for start in [0, 1, 2, 3] {
            collection.add(packet(&key(), start)).unwrap();
        }
        let hits = collection.query(&key(), 0, 3);
        let starts: Vec<i64> = hits.iter().map(|p| p.start_time_micros()).collect();
        assert_eq!(starts, vec![1, 2, 3]);
        assert_eq!(collection.total_packets(), 3);
        assert_eq!(collection.size(&key()), 3);
    }

    #[test]
    fn unknown_sncl_queries_come_back_empty() {
        let collection: CappedCollection<f64> =
            CappedCollection::new(MaxPackets::try_new(4).unwrap());
        let ghost = SnclKey::new("XX", "GONE", "HHZ", "");
        assert!(collection.query(&ghost, 0, 100).is_empty());
        assert_eq!(collection.size(&ghost), 0);
        assert!(!collection.contains(&ghost));
    }

    #[test]
    fn channels_are_kept_apart() {
        let collection = CappedCollection::new(MaxPackets::try_new(4).unwrap());
        let a = key();
        let b = SnclKey::new("UU", "CTU", "EHZ", "01");
        collection.add(packet(&a, 0)).unwrap();
        collection.add(packet(&b, 0)).unwrap();
        collection.add(packet(&b, 10)).unwrap();
        assert_eq!(collection.size(&a), 1);
        assert_eq!(collection.size(&b), 2);
        assert_eq!(collection.total_packets(), 3);
        assert_eq!(collection.sncls().len(), 2);
    }

    #[test]
    fn invalid_packets_are_rejected() {
        let collection: CappedCollection<f64> =
            CappedCollection::new(MaxPackets::try_new(4).unwrap());
        let bare: DataPacket<f64> = DataPacket::new();
        assert!(collection.add(bare).is_err());
        let mut no_samples = packet(&key(), 0);
        no_samples.set_samples(Vec::new());
        assert!(collection.add(no_samples).is_err());
    }
}
