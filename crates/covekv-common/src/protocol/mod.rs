pub mod error;
pub mod message;
pub mod messages;

pub use error::{CoveError, Result};
pub use message::{codes, expect_code, WireMessage};
