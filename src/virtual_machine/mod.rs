//! Digit-encoded tape virtual machine.
//!
//! Source text is encoded into a flat 64 KiB address space that the
//! interpreter then executes in place. Code and data share that space, so a
//! program can rewrite its own instructions.
//!
//! # Architecture
//!
//! - **Encoding**: each whitespace-separated token becomes one cell holding
//!   the sum of its decimal digits, modulo 256
//! - **Cursors**: an instruction pointer starting at 0 and a tape pointer
//!   starting one cell past the program; both wrap at 65536
//! - **Instruction format**: the low nibble of a cell selects the opcode; tape
//!   moves and cell arithmetic read one operand cell
//! - **I/O**: byte reads and writes go to standard streams until `CON` opens a
//!   network connection
//!
//! # Modules
//!
//! - [`encoder`]: Source text to [`encoder::Image`]
//! - [`errors`]: Interpreter and encoder error types
//! - [`host`]: Standard-stream abstraction used by the interpreter
//! - [`isa`]: Opcode definitions and decoding
//! - [`vm`]: Interpreter, memory, configuration and profiling

pub mod encoder;
pub mod errors;
pub mod host;
pub mod isa;
pub mod vm;
