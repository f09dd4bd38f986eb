//! Request and response formats served by the packet cache.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::messages::{decode_cbor, encode_cbor, DataPacket, Message, Sample, SnclKey};

/// Outcome carried in every cache response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    #[default]
    Success,
    InvalidMessage,
    NoData,
    AlgorithmicFailure,
}

/// Windowed query for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    pub identifier: u64,
    pub sncl: SnclKey,
    pub start_time_micros: i64,
    pub end_time_micros: i64,
}

impl DataRequest {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.DataRequest";
}

impl Message for DataRequest {
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

/// Ordered packets answering a [`DataRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Sample")]
pub struct DataResponse<T: Sample> {
    pub identifier: u64,
    pub sncl: SnclKey,
    pub packets: Vec<DataPacket<T>>,
    pub return_code: ReturnCode,
}

impl<T: Sample> DataResponse<T> {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.DataResponse";
}

impl<T: Sample> Message for DataResponse<T> {
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

/// Windowed query across many channels at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkDataRequest {
    pub identifier: u64,
    pub sncls: Vec<SnclKey>,
    pub start_time_micros: i64,
    pub end_time_micros: i64,
}

impl BulkDataRequest {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.BulkDataRequest";
}

impl Message for BulkDataRequest {
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

/// Concatenated per-channel responses to a [`BulkDataRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Sample")]
pub struct BulkDataResponse<T: Sample> {
    pub identifier: u64,
    pub responses: Vec<DataResponse<T>>,
    pub return_code: ReturnCode,
}

impl<T: Sample> BulkDataResponse<T> {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.BulkDataResponse";
}

impl<T: Sample> Message for BulkDataResponse<T> {
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

/// Query answered with a uniformly resampled, gap-flagged signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedRequest {
    pub identifier: u64,
    pub sncl: SnclKey,
    pub start_time_micros: i64,
    pub end_time_micros: i64,
    pub target_sampling_rate: f64,
    pub gap_tolerance_micros: i64,
}

impl Default for InterpolatedRequest {
    fn default() -> Self {
        Self {
            identifier: 0,
            sncl: SnclKey::default(),
            start_time_micros: 0,
            end_time_micros: 0,
            target_sampling_rate: 100.0,
            gap_tolerance_micros: super::wiggins::DEFAULT_GAP_TOLERANCE_MICROS,
        }
    }
}

impl InterpolatedRequest {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.InterpolatedRequest";
}

impl Message for InterpolatedRequest {
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

/// Uniformly sampled signal with per-sample gap flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedResponse {
    pub identifier: u64,
    pub sncl: SnclKey,
    pub signal: Vec<f64>,
    pub gap_indicator: Vec<bool>,
    pub start_time_micros: i64,
    pub end_time_micros: i64,
    pub sampling_rate: f64,
    pub return_code: ReturnCode,
}

impl InterpolatedResponse {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.InterpolatedResponse";
}

impl Message for InterpolatedResponse {
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

/// Asks which channels the cache currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRequest {
    pub identifier: u64,
}

impl SensorRequest {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.SensorRequest";
}

impl Message for SensorRequest {
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

/// Channels currently cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorResponse {
    pub identifier: u64,
    pub sncls: Vec<SnclKey>,
    pub return_code: ReturnCode,
}

impl SensorResponse {
    pub const TYPE_TAG: &'static str = "Seismq.PacketCache.SensorResponse";
}

impl Message for SensorResponse {
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
    fn bulk_response_round_trips() {
        let mut packet: DataPacket<f64> = DataPacket::new();
        packet.set_network("UU").unwrap();
        packet.set_station("NOQ").unwrap();
        packet.set_channel("EHZ").unwrap();
        packet.set_sampling_rate(100.0).unwrap();
        packet.set_samples(vec![1.0, 2.0]);

        let response = BulkDataResponse {
            identifier: 9,
            responses: vec![DataResponse {
                identifier: 9,
                sncl: packet.sncl_key(),
                packets: vec![packet],
                return_code: ReturnCode::Success,
            }],
            return_code: ReturnCode::Success,
        };
        let payload = response.to_payload().unwrap();
        let mut decoded: BulkDataResponse<f64> = BulkDataResponse::default();
        decoded.from_payload(&payload).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn interpolated_request_defaults_are_sane() {
        let request = InterpolatedRequest::default();
        assert!(request.target_sampling_rate > 0.0);
        assert_eq!(request.gap_tolerance_micros, 30_000);
    }
}
