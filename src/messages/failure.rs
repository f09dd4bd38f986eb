//! Generic failure reply returned by routers when a callback cannot
//! produce anything better.

use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{decode_cbor, encode_cbor, Message};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    details: String,
}

impl Failure {
    pub const TYPE_TAG: &'static str = "Seismq.Messages.Failure";

    pub fn new(details: impl Into<String>) -> Self {
        Self {
            details: details.into(),
        }
    }

    #[must_use]
    pub fn details(&self) -> &str {
        &self.details
    }
}

impl Message for Failure {
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
