//! Pattern sockets.
//!
//! Eight composable roles over the underlying messaging library:
//! publisher/subscriber and their proxy-facing X variants, plus the
//! request/router/reply/dealer family. Every message on a pattern socket
//! is two user frames (`type_tag`, payload); routers additionally carry
//! whatever identity envelope the transport prepends, and preserve it on
//! replies.
//!
//! Long-running sockets (router, reply, proxies) run steerable poll
//! loops: each iteration drains the control channel (pause / resume /
//! terminate), then waits on the data socket for at most the poll
//! timeout so a lowered `keep_running` flag is noticed promptly.

mod options;
mod publisher;
mod request;
mod reply;
mod router;
mod subscriber;

pub use options::{
    PublisherOptions, ReplyOptions, RequestOptions, RouterCallback, RouterOptions,
    SubscriberOptions,
};
pub use publisher::{Publisher, XPublisher};
pub use request::Request;
pub use reply::Reply;
pub use router::Router;
pub use subscriber::{Subscriber, XSubscriber};

use std::time::Duration;

use bytes::Bytes;
use zeromq::ZmqMessage;

use crate::authentication::{perform_handshake, ZapOptions};
use crate::error::{Error, Result};
use crate::messages::{Message, MessageRegistry};

/// Control verbs accepted by every steerable poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Terminate,
}

/// Default wait on `{data socket, control}` per loop iteration.
pub(crate) const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Grace period when joining a stopped loop task.
pub(crate) const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Post-bind settling sleep masking the slow-joiner problem.
pub(crate) const SLOW_JOINER_SLEEP: Duration = Duration::from_millis(100);

/// Serializes a message into its two wire frames.
pub(crate) fn message_to_frames(message: &dyn Message) -> Result<ZmqMessage> {
    let payload = message.to_payload()?;
    let mut frames = ZmqMessage::from(Bytes::from(message.type_tag().to_string()));
    frames.push_back(Bytes::from(payload));
    Ok(frames)
}

/// Deserializes the trailing `(type_tag, payload)` frames of a message,
/// ignoring any leading identity envelope.
pub(crate) fn frames_to_message(
    registry: &MessageRegistry,
    frames: &ZmqMessage,
) -> Result<Box<dyn Message>> {
    let parts: Vec<&Bytes> = frames.iter().collect();
    if parts.len() < 2 {
        return Err(Error::Decode(format!(
            "message has {} frames; two required",
            parts.len()
        )));
    }
    let type_tag = String::from_utf8_lossy(parts[parts.len() - 2]).into_owned();
    registry.deserialize(&type_tag, parts[parts.len() - 1])
}

/// Runs the client-side authentication handshake when the options demand
/// one; a non-200 reply surfaces as [`Error::AuthDenied`] at initialize.
pub(crate) async fn authenticate_client(zap: &ZapOptions, identity: &str) -> Result<()> {
    if !zap.requires_handshake() {
        return Ok(());
    }
    let endpoint = zap
        .handshake_endpoint
        .as_deref()
        .ok_or_else(|| Error::InvalidArgument("handshake endpoint not set".to_string()))?;
    let request = zap.client_request(identity)?;
    perform_handshake(endpoint, &request).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Failure;

    #[test]
    fn frames_round_trip_through_the_envelope() {
        let mut registry = MessageRegistry::new();
        registry.add::<Failure>();
        let original = Failure::new("went sideways");
        let frames = message_to_frames(&original).unwrap();
        assert_eq!(frames.len(), 2);
        let decoded = frames_to_message(&registry, &frames).unwrap();
        let decoded = decoded.as_any().downcast_ref::<Failure>().unwrap();
        assert_eq!(decoded, &original);
    }

    #[test]
    fn identity_envelopes_are_ignored_on_decode() {
        let mut registry = MessageRegistry::new();
        registry.add::<Failure>();
        let original = Failure::new("routed");
        let inner = message_to_frames(&original).unwrap();
        // Simulate a router-prefixed message: identity + delimiter + frames.
        let mut framed = ZmqMessage::from(Bytes::from_static(b"identity-1"));
        framed.push_back(Bytes::new());
        for frame in inner.iter() {
            framed.push_back(frame.clone());
        }
        let decoded = frames_to_message(&registry, &framed).unwrap();
        assert_eq!(
            decoded.as_any().downcast_ref::<Failure>().unwrap(),
            &original
        );
    }
}
