//! Module-facing services layered on the pattern sockets.

pub mod connection_information;
