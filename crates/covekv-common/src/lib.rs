//! covekv Protocol and Transport
//!
//! This crate provides the wire protocol definitions and framing layer for
//! the covekv client, a client for a distributed, partitioned key-value
//! store.
//!
//! # Overview
//!
//! Every exchange with a store node is a sequence of framed messages over a
//! plain TCP connection. This crate contains the pieces shared by all
//! components of the client:
//!
//! - **Protocol Layer**: message codes, the [`protocol::WireMessage`] frame
//!   type, protobuf payload messages, and error handling
//! - **Transport Layer**: length-prefixed framing over async byte streams
//!
//! # Wire Format
//!
//! ```text
//! [4-byte length as u32 big-endian] [1-byte message code] [protobuf payload]
//! ```
//!
//! The length covers the code byte plus the payload. Frames larger than
//! 64 MB are rejected to prevent memory exhaustion.
//!
//! # Components
//!
//! - [`protocol`] - message codes, frame type, payload messages, errors
//! - [`transport`] - async length-prefixed framing

pub mod protocol;
pub mod transport;

pub use protocol::*;
