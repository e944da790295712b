//! Outbound connections opened by the `CON` opcode.
//!
//! - [`endpoint`]: Decoding an endpoint from six tape cells
//! - [`transport`]: Transport kinds, error types and first-success dialing
//! - [`connection`]: One-byte reads and writes over an established link

pub mod connection;
pub mod endpoint;
pub mod transport;
