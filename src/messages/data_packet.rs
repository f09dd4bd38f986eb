//! Waveform data packet keyed by SNCL identity.

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{decode_cbor, encode_cbor, Message, TraceBuf2};
use crate::error::{Error, Result};

const MICROSECONDS_PER_SECOND: f64 = 1_000_000.0;

/// Sample scalar accepted in data packets.
///
/// The four admitted widths match the Earthworm trace formats; `from_f64`
/// is the narrowing used when converting between declared widths.
pub trait Sample:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Into<f64>
    + fmt::Debug
    + 'static
{
    /// Earthworm datatype code for this width on a little-endian host.
    const TRACEBUF_CODE: &'static str;

    fn from_f64(value: f64) -> Self;
}

impl Sample for i16 {
    const TRACEBUF_CODE: &'static str = "i2";
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as i16
    }
}

impl Sample for i32 {
    const TRACEBUF_CODE: &'static str = "i4";
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as i32
    }
}

impl Sample for f32 {
    const TRACEBUF_CODE: &'static str = "f4";
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Sample for f64 {
    const TRACEBUF_CODE: &'static str = "f8";
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Station-Network-Channel-Location identity of a data stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnclKey {
    pub network: String,
    pub station: String,
    pub channel: String,
    pub location: String,
}

impl SnclKey {
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        channel: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            channel: channel.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for SnclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.channel, self.location
        )
    }
}

/// A contiguous run of uniformly sampled values from one channel.
///
/// The end time is derived, never stored:
/// `end = start + round((n - 1) * 1e6 / rate)` microseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Sample")]
pub struct DataPacket<T: Sample> {
    network: String,
    station: String,
    channel: String,
    location: String,
    /// Hz; zero means unset.
    sampling_rate: f64,
    start_time_micros: i64,
    samples: Vec<T>,
}

impl<T: Sample> DataPacket<T> {
    pub const TYPE_TAG: &'static str = "Seismq.Messages.DataPacket";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    /// Location codes may legitimately be blank (e.g. `--` mapped to empty).
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn set_sampling_rate(&mut self, rate_hz: f64) -> Result<()> {
        if rate_hz <= 0.0 || !rate_hz.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "sampling rate {rate_hz} must be positive"
            )));
        }
        self.sampling_rate = rate_hz;
        Ok(())
    }

    pub fn set_start_time_micros(&mut self, start_time_micros: i64) {
        self.start_time_micros = start_time_micros;
    }

    pub fn set_samples(&mut self, samples: Vec<T>) {
        self.samples = samples;
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

    /// Hz, or zero when unset.
    #[must_use]
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    #[must_use]
    pub fn have_sampling_rate(&self) -> bool {
        self.sampling_rate > 0.0
    }

    #[must_use]
    pub fn start_time_micros(&self) -> i64 {
        self.start_time_micros
    }

    /// Time of the final sample.
    ///
    /// Fails until a positive sampling rate has been set.
    pub fn end_time_micros(&self) -> Result<i64> {
        if !self.have_sampling_rate() {
            return Err(Error::InvalidArgument(
                "sampling rate not set; end time undefined".to_string(),
            ));
        }
        let n = self.samples.len();
        if n < 2 {
            return Ok(self.start_time_micros);
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let span = ((n - 1) as f64 * MICROSECONDS_PER_SECOND / self.sampling_rate).round() as i64;
        Ok(self.start_time_micros + span)
    }

    #[must_use]
    pub fn number_of_samples(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    #[must_use]
    pub fn sncl_key(&self) -> SnclKey {
        SnclKey::new(
            self.network.clone(),
            self.station.clone(),
            self.channel.clone(),
            self.location.clone(),
        )
    }

    /// True when the SNCL identity is fully populated.
    #[must_use]
    pub fn have_identity(&self) -> bool {
        !self.network.is_empty() && !self.station.is_empty() && !self.channel.is_empty()
    }

    /// JSON rendering for debugging.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Decode(format!("json encode: {e}")))
    }
}

impl<T: Sample> TryFrom<&TraceBuf2<T>> for DataPacket<T> {
    type Error = Error;

    fn try_from(frame: &TraceBuf2<T>) -> Result<Self> {
        let mut packet = Self::new();
        packet.set_network(frame.network())?;
        packet.set_station(frame.station())?;
        packet.set_channel(frame.channel())?;
        packet.set_location(frame.location());
        packet.set_sampling_rate(frame.sampling_rate())?;
        #[allow(clippy::cast_possible_truncation)]
        packet.set_start_time_micros((frame.start_time() * MICROSECONDS_PER_SECOND).round() as i64);
        packet.set_samples(frame.samples().to_vec());
        Ok(packet)
    }
}

impl<T: Sample> Message for DataPacket<T> {
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

    fn packet(start: i64, rate: f64, samples: Vec<f64>) -> DataPacket<f64> {
        let mut p = DataPacket::new();
        p.set_network("UU").unwrap();
        p.set_station("NOQ").unwrap();
        p.set_channel("EHZ").unwrap();
        p.set_location("01");
        p.set_sampling_rate(rate).unwrap();
        p.set_start_time_micros(start);
        p.set_samples(samples);
        p
    }

    #[test]
    fn end_time_is_derived_from_rate_and_count() {
        let p = packet(1_000_000, 100.0, (0..11).map(f64::from).collect());
        // 10 intervals of 10 000 us each
        assert_eq!(p.end_time_micros().unwrap(), 1_100_000);
    }

    #[test]
    fn end_time_requires_a_sampling_rate() {
        let mut p: DataPacket<f64> = DataPacket::new();
        p.set_samples(vec![1.0, 2.0]);
        assert!(p.end_time_micros().is_err());
    }

    #[test]
    fn cbor_round_trip_is_identity() {
        let original = packet(42, 200.0, vec![0.5, -1.5, 2.25]);
        let payload = original.to_payload().unwrap();
        let mut decoded: DataPacket<f64> = DataPacket::new();
        decoded.from_payload(&payload).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn empty_identity_fields_are_rejected() {
        let mut p: DataPacket<f64> = DataPacket::new();
        assert!(p.set_network("").is_err());
        assert!(p.set_station(" ").is_err());
        assert!(p.set_channel("").is_err());
        assert!(!p.have_identity());
    }

    #[test]
    fn sncl_key_renders_dotted() {
        let p = packet(0, 100.0, vec![]);
        assert_eq!(p.sncl_key().to_string(), "UU.NOQ.EHZ.01");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cbor_round_trip_holds_for_any_finite_samples(
                start in -1_000_000_000_000i64..1_000_000_000_000i64,
                rate in 1.0f64..1000.0,
                samples in proptest::collection::vec(-1.0e12f64..1.0e12, 0..128),
            ) {
                let p = {
                    let mut p: DataPacket<f64> = DataPacket::new();
                    p.set_network("UU").unwrap();
                    p.set_station("NOQ").unwrap();
                    p.set_channel("EHZ").unwrap();
                    p.set_sampling_rate(rate).unwrap();
                    p.set_start_time_micros(start);
                    p.set_samples(samples);
                    p
                };
                let payload = p.to_payload().unwrap();
                let mut decoded: DataPacket<f64> = DataPacket::new();
                decoded.from_payload(&payload).unwrap();
                prop_assert_eq!(decoded, p);
            }
        }
    }
}
