//! Earthworm TraceBuf2 frame codec.
//!
//! A frame is a fixed 64-byte header followed by packed samples. The
//! `datatype` field declares both the sample width and the byte order:
//! `i`/`f` are little-endian integer/float, `s`/`t` their big-endian
//! counterparts. The decoder honors whatever the frame declares; the
//! encoder always writes the native little-endian codes.

use std::any::Any;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{decode_cbor, encode_cbor, Message, Sample};
use crate::error::{Error, Result};

/// Total size of a maximal frame, header included.
pub const MAX_TRACE_LENGTH: usize = 4096;
/// Fixed header size.
pub const TRACEBUF2_HEADER_LENGTH: usize = 64;

const STATION_LENGTH: usize = 7;
const NETWORK_LENGTH: usize = 9;
const CHANNEL_LENGTH: usize = 4;
const LOCATION_LENGTH: usize = 3;
const VERSION_LENGTH: usize = 2;
const DATATYPE_LENGTH: usize = 3;
const QUALITY_LENGTH: usize = 2;

/// One Earthworm wave frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Sample")]
pub struct TraceBuf2<T: Sample> {
    pin_number: i32,
    /// Seconds since 1970-01-01.
    start_time: f64,
    sampling_rate: f64,
    station: String,
    network: String,
    channel: String,
    location: String,
    version: String,
    quality: String,
    samples: Vec<T>,
}

impl<T: Sample> Default for TraceBuf2<T> {
    fn default() -> Self {
        Self {
            pin_number: 0,
            start_time: 0.0,
            sampling_rate: 0.0,
            station: String::new(),
            network: String::new(),
            channel: String::new(),
            location: String::new(),
            version: "20".to_string(),
            quality: String::new(),
            samples: Vec::new(),
        }
    }
}

fn trimmed_field(buffer: &[u8]) -> String {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).trim().to_string()
}

fn put_field(buffer: &mut [u8], value: &str, what: &str) -> Result<()> {
    if value.len() > buffer.len() {
        return Err(Error::InvalidArgument(format!(
            "{what} '{value}' exceeds {} characters",
            buffer.len()
        )));
    }
    buffer[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

impl<T: Sample> TraceBuf2<T> {
    pub const TYPE_TAG: &'static str = "Seismq.Messages.TraceBuf2";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pin_number(&mut self, pin_number: i32) {
        self.pin_number = pin_number;
    }

    #[must_use]
    pub fn pin_number(&self) -> i32 {
        self.pin_number
    }

    pub fn set_start_time(&mut self, seconds_since_epoch: f64) {
        self.start_time = seconds_since_epoch;
    }

    #[must_use]
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// End time derived from the start, rate, and sample count.
    #[must_use]
    pub fn end_time(&self) -> f64 {
        if self.sampling_rate <= 0.0 || self.samples.len() < 2 {
            return self.start_time;
        }
        #[allow(clippy::cast_precision_loss)]
        let span = (self.samples.len() - 1) as f64 / self.sampling_rate;
        self.start_time + span
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

    #[must_use]
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn set_station(&mut self, station: impl Into<String>) {
        self.station = station.into();
    }

    #[must_use]
    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn set_network(&mut self, network: impl Into<String>) {
        self.network = network.into();
    }

    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn set_channel(&mut self, channel: impl Into<String>) {
        self.channel = channel.into();
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn set_quality(&mut self, quality: impl Into<String>) {
        self.quality = quality.into();
    }

    #[must_use]
    pub fn quality(&self) -> &str {
        &self.quality
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Sets the samples; a frame holds at most what fits in 4096 bytes.
    pub fn set_samples(&mut self, samples: Vec<T>) -> Result<()> {
        let width = sample_width(T::TRACEBUF_CODE)?;
        let max = (MAX_TRACE_LENGTH - TRACEBUF2_HEADER_LENGTH) / width;
        if samples.len() > max {
            return Err(Error::InvalidArgument(format!(
                "{} samples exceed the {max}-sample frame capacity",
                samples.len()
            )));
        }
        self.samples = samples;
        Ok(())
    }

    #[must_use]
    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    #[must_use]
    pub fn number_of_samples(&self) -> usize {
        self.samples.len()
    }

    /// Decodes a frame, honoring the byte order it declares.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < TRACEBUF2_HEADER_LENGTH {
            return Err(Error::Decode(format!(
                "frame of {} bytes is shorter than the {TRACEBUF2_HEADER_LENGTH}-byte header",
                buffer.len()
            )));
        }
        let datatype = trimmed_field(&buffer[57..60]);
        let mut chars = datatype.chars();
        let order = chars.next().unwrap_or('?');
        match order {
            'i' | 'f' => Self::from_bytes_with::<LittleEndian>(buffer, &datatype),
            's' | 't' => Self::from_bytes_with::<BigEndian>(buffer, &datatype),
            _ => Err(Error::Decode(format!("unknown datatype '{datatype}'"))),
        }
    }

    fn from_bytes_with<E: ByteOrder>(buffer: &[u8], datatype: &str) -> Result<Self> {
        let width = sample_width(datatype)?;
        let is_integer = datatype.starts_with('i') || datatype.starts_with('s');

        let pin_number = E::read_i32(&buffer[0..4]);
        let n_samples = E::read_i32(&buffer[4..8]);
        let start_time = E::read_f64(&buffer[8..16]);
        // Bytes 16..24 carry the redundant end time; it is recomputed.
        let sampling_rate = E::read_f64(&buffer[24..32]);
        let station = trimmed_field(&buffer[32..39]);
        let network = trimmed_field(&buffer[39..48]);
        let channel = trimmed_field(&buffer[48..52]);
        let location = trimmed_field(&buffer[52..55]);
        let version = trimmed_field(&buffer[55..57]);
        let quality = trimmed_field(&buffer[60..62]);

        if n_samples < 0 {
            return Err(Error::Decode(format!(
                "negative sample count {n_samples}"
            )));
        }
        let n_samples = n_samples as usize;
        let needed = TRACEBUF2_HEADER_LENGTH + n_samples * width;
        if buffer.len() < needed {
            return Err(Error::Decode(format!(
                "frame of {} bytes cannot hold {n_samples} {width}-byte samples",
                buffer.len()
            )));
        }

        let mut samples = Vec::with_capacity(n_samples);
        let data = &buffer[TRACEBUF2_HEADER_LENGTH..needed];
        for i in 0..n_samples {
            let chunk = &data[i * width..(i + 1) * width];
            let value = match (is_integer, width) {
                (true, 2) => f64::from(E::read_i16(chunk)),
                (true, 4) => f64::from(E::read_i32(chunk)),
                (false, 4) => f64::from(E::read_f32(chunk)),
                (false, 8) => E::read_f64(chunk),
                _ => {
                    return Err(Error::Decode(format!(
                        "unsupported datatype '{datatype}'"
                    )))
                }
            };
            samples.push(T::from_f64(value));
        }

        Ok(Self {
            pin_number,
            start_time,
            sampling_rate,
            station,
            network,
            channel,
            location,
            version,
            quality,
            samples,
        })
    }

    /// Encodes the frame with native little-endian sample packing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with::<LittleEndian>(T::TRACEBUF_CODE)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn to_bytes_with<E: ByteOrder>(&self, datatype: &str) -> Result<Vec<u8>> {
        let width = sample_width(datatype)?;
        let total = TRACEBUF2_HEADER_LENGTH + self.samples.len() * width;
        if total > MAX_TRACE_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "frame of {total} bytes exceeds the {MAX_TRACE_LENGTH}-byte limit"
            )));
        }
        let mut buffer = vec![0u8; total];
        E::write_i32(&mut buffer[0..4], self.pin_number);
        E::write_i32(&mut buffer[4..8], self.samples.len() as i32);
        E::write_f64(&mut buffer[8..16], self.start_time);
        E::write_f64(&mut buffer[16..24], self.end_time());
        E::write_f64(&mut buffer[24..32], self.sampling_rate);
        put_field(&mut buffer[32..39], &self.station, "station")?;
        put_field(&mut buffer[39..48], &self.network, "network")?;
        put_field(&mut buffer[48..52], &self.channel, "channel")?;
        put_field(&mut buffer[52..55], &self.location, "location")?;
        put_field(&mut buffer[55..57], &self.version, "version")?;
        put_field(&mut buffer[57..60], datatype, "datatype")?;
        put_field(&mut buffer[60..62], &self.quality, "quality")?;

        let integer = datatype.starts_with('i') || datatype.starts_with('s');
        let data = &mut buffer[TRACEBUF2_HEADER_LENGTH..];
        for (i, sample) in self.samples.iter().enumerate() {
            let value: f64 = (*sample).into();
            let chunk = &mut data[i * width..(i + 1) * width];
            if integer {
                if width == 2 {
                    E::write_i16(chunk, value as i16);
                } else {
                    E::write_i32(chunk, value as i32);
                }
            } else if width == 4 {
                E::write_f32(chunk, value as f32);
            } else {
                E::write_f64(chunk, value);
            }
        }
        Ok(buffer)
    }
}

fn sample_width(datatype: &str) -> Result<usize> {
    match datatype {
        "i2" | "s2" => Ok(2),
        "i4" | "s4" => Ok(4),
        "f4" | "t4" => Ok(4),
        "f8" | "t8" => Ok(8),
        other => Err(Error::Decode(format!("unknown datatype '{other}'"))),
    }
}

impl<T: Sample> Message for TraceBuf2<T> {
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
