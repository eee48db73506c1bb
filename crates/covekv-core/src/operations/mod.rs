//! Concrete operations built on the generic [`OperationCodec`] contract.
//!
//! [`OperationCodec`]: crate::operation::OperationCodec

pub mod coverage;
pub mod ping;
