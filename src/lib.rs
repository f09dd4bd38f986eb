//! # seismq
//!
//! Message-passing substrate for a seismic-observatory control plane.
//! Cooperating processes exchange typed messages over a handful of
//! well-known socket patterns — publish/subscribe through a broker,
//! request/reply through a broker, and direct request/reply — with an
//! authentication handshake gating every connection, a connection
//! registry for discovery, module heartbeats, and a bounded in-memory
//! packet cache answering windowed historical queries.
//!
//! ## Layout
//!
//! - [`messages`]: the typed envelope, the registry, and the concrete
//!   formats (data packets, picks, heartbeats, Earthworm TraceBuf2).
//! - [`socket`]: the pattern sockets and their steerable poll loops.
//! - [`proxy`]: the broadcast and request broker proxies.
//! - [`authentication`]: security levels, the ZAP-style handshake
//!   service, and the pluggable credential policies.
//! - [`packet_cache`]: the capped per-channel collection, the Wiggins
//!   interpolator, and the composed cache service.
//! - [`heartbeat`] and [`modules`]: the heartbeat publisher process and
//!   the process-manager lifecycle scaffold.
//! - [`services`]: the connection-information registry and its client.
//!
//! Everything long-running is a task on the shared [`Context`]; stopping
//! a component sends `TERMINATE` down its control channel and joins the
//! task with a bounded grace period.

pub mod authentication;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod modules;
pub mod observability;
pub mod packet_cache;
pub mod proxy;
pub mod queue;
pub mod services;
pub mod socket;

pub use context::Context;
pub use error::{Error, Result};
pub use messages::{Message, MessageRegistry};
