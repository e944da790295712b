//! Digit-tape virtual machine library.
//!
//! Provides the source encoder, the interpreter, and the network transports
//! its `CON` opcode dials.

pub mod network;
pub mod utils;
pub mod virtual_machine;

pub use network::connection::Connection;
pub use network::endpoint::Endpoint;
pub use network::transport::{DialOptions, TransportError, TransportKind, dial};
pub use virtual_machine::encoder::{Image, encode, encode_file};
pub use virtual_machine::errors::VMError;
pub use virtual_machine::host::{Host, StdHost, StreamHost};
pub use virtual_machine::vm::config::{EofPolicy, VmConfig};
pub use virtual_machine::vm::{Halt, Step, Vm};
