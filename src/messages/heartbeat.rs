//! Module status message carried on the heartbeat broadcast.

use std::any::Any;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{decode_cbor, encode_cbor, Message};
use crate::error::{Error, Result};

/// Liveness of a module as reported on the heartbeat broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleStatus {
    #[default]
    Unknown,
    Alive,
    Disconnected,
    Died,
}

/// Parsed timestamp components, ordered lexicographically.
type TimeStampParts = (i32, u32, u32, u32, u32, u32, u32);

const TIME_STAMP_LENGTH: usize = 23;

fn parse_time_stamp(time_stamp: &str) -> Result<TimeStampParts> {
    if time_stamp.len() < TIME_STAMP_LENGTH {
        return Err(Error::InvalidArgument(format!(
            "time stamp '{time_stamp}' must have at least {TIME_STAMP_LENGTH} characters"
        )));
    }
    // YYYY-MM-DDTHH:MM:SS.mmm
    let field = |range: std::ops::Range<usize>| -> Result<u32> {
        time_stamp
            .get(range.clone())
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("time stamp '{time_stamp}' is not ISO-8601"))
            })
    };
    let year = time_stamp
        .get(0..4)
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| Error::InvalidArgument(format!("time stamp '{time_stamp}' is not ISO-8601")))?;
    let month = field(5..7)?;
    let day = field(8..10)?;
    let hour = field(11..13)?;
    let minute = field(14..16)?;
    let second = field(17..19)?;
    // Rounding of fractional seconds can push the millisecond field to
    // 1000; clamp to 999.
    let millisecond = field(20..23)?.min(999);

    if !(1..=12).contains(&month) {
        return Err(Error::InvalidArgument(format!(
            "month {month} must be in range [1,12]"
        )));
    }
    if !(1..=31).contains(&day) {
        return Err(Error::InvalidArgument(format!(
            "day of month {day} must be in range [1,31]"
        )));
    }
    if hour > 23 {
        return Err(Error::InvalidArgument(format!(
            "hour {hour} must be in range [0,23]"
        )));
    }
    if minute > 59 {
        return Err(Error::InvalidArgument(format!(
            "minute {minute} must be in range [0,59]"
        )));
    }
    if second > 59 {
        return Err(Error::InvalidArgument(format!(
            "second {second} must be in range [0,59]"
        )));
    }
    Ok((year, month, day, hour, minute, second, millisecond))
}

fn now_time_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

fn local_host_name() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Heartbeat status of one module on one host.
///
/// The timestamp is an ISO-8601 string with millisecond precision;
/// ordering is a strict partial order over the parsed components, so two
/// equal timestamps are not-greater in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    module: String,
    host_name: String,
    module_status: ModuleStatus,
    time_stamp: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            module: "unknown".to_string(),
            host_name: local_host_name(),
            module_status: ModuleStatus::Unknown,
            time_stamp: now_time_stamp(),
        }
    }
}

impl Status {
    pub const TYPE_TAG: &'static str = "Seismq.Messages.HeartbeatStatus";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_module(&mut self, module: impl Into<String>) -> Result<()> {
        let module = module.into();
        if module.trim().is_empty() {
            return Err(Error::InvalidArgument("module is empty".to_string()));
        }
        self.module = module;
        Ok(())
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn set_host_name(&mut self, host_name: impl Into<String>) -> Result<()> {
        let host_name = host_name.into();
        if host_name.trim().is_empty() {
            return Err(Error::InvalidArgument("host name is empty".to_string()));
        }
        self.host_name = host_name;
        Ok(())
    }

    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn set_module_status(&mut self, module_status: ModuleStatus) {
        self.module_status = module_status;
    }

    #[must_use]
    pub fn module_status(&self) -> ModuleStatus {
        self.module_status
    }

    /// Sets the timestamp after validating its shape and ranges.
    pub fn set_time_stamp(&mut self, time_stamp: impl Into<String>) -> Result<()> {
        let time_stamp = time_stamp.into();
        parse_time_stamp(&time_stamp)?;
        self.time_stamp = time_stamp;
        Ok(())
    }

    pub fn set_time_stamp_to_now(&mut self) {
        self.time_stamp = now_time_stamp();
    }

    #[must_use]
    pub fn time_stamp(&self) -> &str {
        &self.time_stamp
    }

    /// Strict component-wise comparison of the two timestamps.
    ///
    /// Unparseable timestamps compare not-later.
    #[must_use]
    pub fn is_later_than(&self, other: &Status) -> bool {
        match (
            parse_time_stamp(&self.time_stamp),
            parse_time_stamp(&other.time_stamp),
        ) {
            (Ok(lhs), Ok(rhs)) => lhs > rhs,
            _ => false,
        }
    }
}

impl Message for Status {
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
