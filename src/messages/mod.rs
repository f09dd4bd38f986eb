//! Typed message envelope and registry.
//!
//! Every transmitted unit is a two-frame envelope: an ASCII dotted
//! `type_tag` followed by an opaque payload, CBOR by default with JSON
//! available for debugging. Receivers look the tag up in a
//! [`MessageRegistry`], manufacture a fresh instance and hand it the
//! payload; deserialization is pure and never partially constructs.

mod data_packet;
mod failure;
mod heartbeat;
mod pick;
mod tracebuf2;

pub use data_packet::{DataPacket, Sample, SnclKey};
pub use failure::Failure;
pub use heartbeat::{ModuleStatus, Status};
pub use pick::{Pick, Polarity};
pub use tracebuf2::{TraceBuf2, MAX_TRACE_LENGTH, TRACEBUF2_HEADER_LENGTH};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};

/// A self-describing wire message.
///
/// Implementations pair a stable dotted `type_tag` with a payload codec.
/// `from_payload` must either fully reconstruct the value or fail with
/// [`Error::Decode`] leaving `self` unchanged in meaning.
pub trait Message: Any + Send + Sync {
    /// Dotted schema identifier, unique per message format.
    fn type_tag(&self) -> &'static str;

    /// Schema version carried for forward compatibility.
    fn version(&self) -> &'static str {
        "1.0.0"
    }

    /// Serializes the message into its payload frame.
    fn to_payload(&self) -> Result<Vec<u8>>;

    /// Reconstructs the message from a payload frame.
    fn from_payload(&mut self, payload: &[u8]) -> Result<()>;

    /// Downcast support for received boxes.
    fn as_any(&self) -> &dyn Any;

    /// Clones the message behind the trait object.
    fn box_clone(&self) -> Box<dyn Message>;
}

impl Clone for Box<dyn Message> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Encodes any serde value as CBOR.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| Error::Decode(format!("cbor encode: {e}")))?;
    Ok(buffer)
}

/// Decodes a CBOR payload into a serde value.
pub fn decode_cbor<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    ciborium::from_reader(payload).map_err(|e| Error::Decode(format!("cbor decode: {e}")))
}

/// Factory producing a fresh, payload-less message instance.
pub type MessageFactory = Arc<dyn Fn() -> Box<dyn Message> + Send + Sync>;

/// Maps `type_tag`s onto factories producing fresh message instances.
///
/// Registries are cheaply cloneable values; socket options copy them at
/// initialize so later mutation of the source has no effect on a live
/// socket.
#[derive(Clone, Default)]
pub struct MessageRegistry {
    factories: HashMap<String, MessageFactory>,
}

impl MessageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `M` under its own type tag, replacing (with a warning) any
    /// previous entry.
    pub fn add<M>(&mut self)
    where
        M: Message + Default + 'static,
    {
        let tag = M::default().type_tag().to_string();
        if self.factories.contains_key(&tag) {
            warn!(type_tag = %tag, "replacing existing message factory");
        }
        self.factories
            .insert(tag, Arc::new(|| Box::new(M::default()) as Box<dyn Message>));
    }

    /// Registers an explicit factory, replacing any previous entry.
    pub fn add_factory(&mut self, factory: MessageFactory) {
        let tag = factory().type_tag().to_string();
        if self.factories.contains_key(&tag) {
            warn!(type_tag = %tag, "replacing existing message factory");
        }
        self.factories.insert(tag, factory);
    }

    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Manufactures a fresh instance for `type_tag`.
    pub fn create(&self, type_tag: &str) -> Result<Box<dyn Message>> {
        self.factories
            .get(type_tag)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownType(type_tag.to_string()))
    }

    /// Manufactures and deserializes in one step.
    pub fn deserialize(&self, type_tag: &str, payload: &[u8]) -> Result<Box<dyn Message>> {
        let mut message = self.create(type_tag)?;
        message.from_payload(payload)?;
        Ok(message)
    }

    /// Registered tags, in no particular order.
    #[must_use]
    pub fn type_tags(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("type_tags", &self.type_tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_a_registered_message() {
        let mut registry = MessageRegistry::new();
        registry.add::<Failure>();
        assert!(registry.contains(Failure::TYPE_TAG));
        assert_eq!(registry.len(), 1);

        let original = Failure::new("bucket unavailable");
        let payload = original.to_payload().unwrap();
        let decoded = registry
            .deserialize(Failure::TYPE_TAG, &payload)
            .unwrap();
        let decoded = decoded.as_any().downcast_ref::<Failure>().unwrap();
        assert_eq!(decoded, &original);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let registry = MessageRegistry::new();
        match registry.create("No.Such.Message") {
            Err(Error::UnknownType(tag)) => assert_eq!(tag, "No.Such.Message"),
            Err(other) => panic!("expected UnknownType, got {other:?}"),
            Ok(_) => panic!("expected UnknownType, got a message"),
        }
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let mut registry = MessageRegistry::new();
        registry.add::<Status>();
        let result = registry.deserialize(Status::TYPE_TAG, b"\xff\xff\xff");
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
