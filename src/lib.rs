//! h2probe - HTTP/2 negotiation and framing driver
//!
//! This crate drives a single HTTP/2 connection from the client side over a
//! non-blocking socket: it negotiates HTTP/2 either through the HTTP/1.1
//! `Upgrade: h2c` path or with prior knowledge, exchanges SETTINGS, and
//! encodes/decodes the binary framing layer together with HPACK header blocks.
//! It is meant to verify HTTP/2 endpoints from test harnesses.

pub mod http;
pub mod net;
