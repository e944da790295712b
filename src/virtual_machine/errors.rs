use std::io;

/// Errors that can stop the interpreter or the encoder.
///
/// Program-level conditions (unknown opcodes, failed connects, unmatched
/// brackets, exhausted input) are not errors: they are reported inline and
/// execution continues. Only failures of the host's own streams surface here.
#[derive(Debug, thiserror::Error)]
pub enum VMError {
    /// Byte value that does not name an opcode.
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),
    /// Writing to or flushing standard output failed.
    #[error("host output failed: {0}")]
    HostOutput(#[source] io::Error),
    /// Reading a source file failed.
    #[error("io error: {0}")]
    IoError(String),
}
