//! Standard-stream abstraction for the interpreter.
//!
//! The [`Host`] trait is the interface the VM uses when no connection is
//! active: one byte in, one byte out, plus free-form text for the fixed
//! diagnostics. [`StreamHost`] adapts any reader/writer pair; [`StdHost`] is
//! the process's own stdin and stdout.

use crate::utils::io::read_one;
use std::io::{self, BufWriter, Read, Stdin, Stdout, Write};

/// Byte-oriented input/output used by the interpreter.
pub trait Host {
    /// Reads one byte, returning `None` at end of stream.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    /// Writes one byte.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;
    /// Writes diagnostic text.
    fn write_text(&mut self, text: &str) -> io::Result<()>;
    /// Flushes buffered output.
    fn flush(&mut self) -> io::Result<()>;
}

/// [`Host`] over an arbitrary reader and writer.
///
/// Reads do not flush; callers that prompt must call [`Host::flush`] first.
#[derive(Debug)]
pub struct StreamHost<R, W> {
    input: R,
    output: W,
}

/// The process's standard input and output.
pub type StdHost = StreamHost<Stdin, BufWriter<Stdout>>;

impl StdHost {
    /// Connects to the process's stdin and a buffered stdout.
    pub fn stdio() -> Self {
        StreamHost::new(io::stdin(), BufWriter::new(io::stdout()))
    }
}

impl<R: Read, W: Write> StreamHost<R, W> {
    /// Creates a host over `input` and `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Returns the output sink.
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Consumes the host, returning the reader and writer.
    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl<R: Read, W: Write> Host for StreamHost<R, W> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        read_one(|buf| self.input.read(buf))
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}
