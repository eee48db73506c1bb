//! covekv Transport Layer
//!
//! Length-prefixed framing over async byte streams.
//!
//! # Wire Format
//!
//! ```text
//! [4-byte length as u32 big-endian] [1-byte message code] [payload]
//! ```
//!
//! The functions are generic over `AsyncRead`/`AsyncWrite` so the same code
//! runs over TCP sockets in production and in-memory duplex pipes in tests.

pub mod framing;

pub use framing::{read_frame, write_frame, MAX_FRAME_SIZE};
