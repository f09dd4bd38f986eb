//! Bounded, time-ordered ring of packets for one channel.

use std::collections::VecDeque;

use crate::messages::{DataPacket, Sample};

/// Fixed-capacity buffer keeping packets ordered by start time.
///
/// A packet whose start time equals a stored packet's replaces it (the
/// broadcast may retransmit); a full buffer evicts its oldest packet.
#[derive(Debug, Clone)]
pub(crate) struct CircularBuffer<T: Sample> {
    max_packets: usize,
    packets: VecDeque<DataPacket<T>>,
}

impl<T: Sample> CircularBuffer<T> {
    pub(crate) fn new(max_packets: usize) -> Self {
        Self {
            max_packets,
            packets: VecDeque::with_capacity(max_packets.min(1024)),
        }
    }

    /// Inserts `packet` in start-time order.
    pub(crate) fn add(&mut self, packet: DataPacket<T>) {
        let start = packet.start_time_micros();
        match self
            .packets
            .binary_search_by_key(&start, DataPacket::start_time_micros)
        {
            Ok(index) => {
                // Last writer wins on duplicate start times.
                self.packets[index] = packet;
            }
            Err(index) => {
                if self.packets.len() >= self.max_packets {
                    if index == 0 && self.packets.len() == self.max_packets {
                        // The newcomer would itself be the oldest; adding
                        // then evicting would drop it, so skip the churn.
                        return;
                    }
                    self.packets.pop_front();
                    self.packets.insert(index.saturating_sub(1), packet);
                } else {
                    self.packets.insert(index, packet);
                }
            }
        }
    }

    /// Ordered packets whose time span intersects `[t0, t1]`, both ends
    /// inclusive.
    pub(crate) fn query(&self, t0: i64, t1: i64) -> Vec<DataPacket<T>> {
        self.packets
            .iter()
            .filter(|packet| {
                let start = packet.start_time_micros();
                let end = packet.end_time_micros().unwrap_or(start);
                end >= t0 && start <= t1
            })
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.packets.len()
    }

    pub(crate) fn earliest_start_time(&self) -> Option<i64> {
        self.packets.front().map(DataPacket::start_time_micros)
    }

    pub(crate) fn latest_start_time(&self) -> Option<i64> {
        self.packets.back().map(DataPacket::start_time_micros)
    }
}
