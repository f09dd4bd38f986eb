//! Phase-arrival pick message.

use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{decode_cbor, encode_cbor, Message};
use crate::error::{Error, Result};

/// First-motion polarity of a pick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Up,
    Down,
    #[default]
    Unknown,
}

/// An analyst or picker-generated phase arrival on one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    identifier: u64,
    network: String,
    station: String,
    channel: String,
    location: String,
    phase_hint: String,
    /// Arrival time, seconds since the epoch.
    time: f64,
    polarity: Polarity,
}

impl Pick {
    pub const TYPE_TAG: &'static str = "Seismq.Messages.Pick";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_identifier(&mut self, identifier: u64) {
        self.identifier = identifier;
    }

    pub fn set_network(&mut self, network: impl Into<String>) -> Result<()> {
        let network = network.into();
        if network.trim().is_empty() {
            return Err(Error::InvalidArgument("network is empty".to_string()));
        }
        self.network = network;
        Ok(())
    }

    pub fn set_station(&mut self, station: impl Into<String>) -> Result<()> {
        let station = station.into();
        if station.trim().is_empty() {
            return Err(Error::InvalidArgument("station is empty".to_string()));
        }
        self.station = station;
        Ok(())
    }

    pub fn set_channel(&mut self, channel: impl Into<String>) -> Result<()> {
        let channel = channel.into();
        if channel.trim().is_empty() {
            return Err(Error::InvalidArgument("channel is empty".to_string()));
        }
        self.channel = channel;
        Ok(())
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn set_phase_hint(&mut self, phase_hint: impl Into<String>) {
        self.phase_hint = phase_hint.into();
    }

    pub fn set_time(&mut self, seconds_since_epoch: f64) {
        self.time = seconds_since_epoch;
    }

    pub fn set_polarity(&mut self, polarity: Polarity) {
        self.polarity = polarity;
    }

    #[must_use]
    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    #[must_use]
    pub fn station(&self) -> &str {
        &self.station
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn phase_hint(&self) -> &str {
        &self.phase_hint
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }
}

impl Message for Pick {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_round_trips_through_cbor() {
        let mut pick = Pick::new();
        pick.set_identifier(4043);
        pick.set_network("UU").unwrap();
        pick.set_station("NOQ").unwrap();
        pick.set_channel("EHZ").unwrap();
        pick.set_location("01");
        pick.set_phase_hint("P");
        pick.set_time(600.0);
        pick.set_polarity(Polarity::Up);

        let payload = pick.to_payload().unwrap();
        let mut decoded = Pick::new();
        decoded.from_payload(&payload).unwrap();
        assert_eq!(decoded, pick);
    }
}
