//! Core virtual machine implementation.
//!
//! The VM executes cells of a single 64 KiB [`Memory`] that holds both the
//! program and its data. Two cursors walk it: the instruction pointer, which
//! starts at 0, and the tape pointer, which starts just past the encoded
//! program. Byte I/O goes to the [`Host`] until `CON` establishes a
//! [`Connection`], after which it goes over the network instead.
//!
//! All pointer and cell arithmetic wraps. Program-level mistakes (unknown
//! opcodes, unmatched brackets, failed connects) never stop the machine.

pub mod config;
pub mod memory;
pub mod profile;
#[cfg(test)]
mod tests;

use crate::network::connection::Connection;
use crate::network::endpoint::{ENDPOINT_CELLS, Endpoint};
use crate::network::transport::dial;
use crate::virtual_machine::encoder::Image;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::Host;
use crate::virtual_machine::isa::Opcode;
use crate::{debug, info, warn};
use config::{EofPolicy, VmConfig};
use memory::{Direction, Memory};
use profile::OpcodeProfile;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Written to standard output each time the IP rests on a cell with no opcode.
pub const UNKNOWN_OPCODE_MESSAGE: &str = "\n\nj00 4r3 teh 5ux0r\n\n";

/// Written to standard output when no transport kind reaches a `CON` endpoint.
pub const CONNECT_FAILURE_MESSAGE: &str = "\n\nh0s7 5uXz0r5! c4N'7 c0Nn3<7 l0l0l0l0l l4m3R !!!\n\n";

/// Reason the interpreter stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Halt {
    /// The program executed `END`.
    End,
    /// `RD` hit end of input under [`EofPolicy::Halt`].
    InputExhausted,
    /// [`VmConfig::max_steps`] steps were executed.
    StepLimit,
    /// The stop flag was raised from outside.
    Cancelled,
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Halt::End => "end of program",
            Halt::InputExhausted => "input exhausted",
            Halt::StepLimit => "step limit reached",
            Halt::Cancelled => "cancelled",
        })
    }
}

/// Outcome of a single [`Vm::step`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    Continue,
    Halt(Halt),
}

/// Where the IP goes after an opcode handler returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Flow {
    /// Past the opcode and its operand cells.
    Next,
    /// To an absolute address.
    Jump(u16),
    /// Nowhere: the same cell is fetched again.
    Stay,
    Halt(Halt),
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        opcode = $opcode:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $opcode {
            $(
                Opcode::$variant => {
                    $( let $field = exec_vm!(@read $vm, $kind); )*
                    $vm.$handler($( $field ),*)
                }
            ),*
        }
    }};

    // Effective operand: the cell after the opcode plus one, in 8-bit arithmetic
    (@read $vm:ident, Operand) => {{
        $vm.memory[$vm.ip.wrapping_add(1)].wrapping_add(1)
    }};
}

/// Digit-tape virtual machine.
///
/// Generic over its [`Host`] so tests can script standard input and capture
/// standard output.
pub struct Vm<H: Host> {
    /// Address space shared by code and data.
    memory: Memory,
    /// Instruction pointer.
    ip: u16,
    /// Tape pointer.
    mp: u16,
    /// Active network target, if `CON` succeeded.
    connection: Option<Connection>,
    /// Connections replaced by a later `CON`. They stay open until the VM is dropped.
    superseded: Vec<Connection>,
    host: H,
    config: VmConfig,
    /// Steps executed so far.
    steps: u64,
    profile: OpcodeProfile,
    /// Checked before every step; raising it halts with [`Halt::Cancelled`].
    stop: Arc<AtomicBool>,
}

impl<H: Host> Vm<H> {
    /// Creates a VM over `image` with the default configuration.
    pub fn new(image: Image, host: H) -> Self {
        Self::with_config(image, host, VmConfig::default())
    }

    /// Creates a VM over `image` with `config`.
    pub fn with_config(image: Image, host: H, config: VmConfig) -> Self {
        let mp = image.tape_start();
        Self {
            memory: image.into_memory(),
            ip: 0,
            mp,
            connection: None,
            superseded: Vec::new(),
            host,
            config,
            steps: 0,
            profile: OpcodeProfile::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ip(&self) -> u16 {
        self.ip
    }

    pub fn mp(&self) -> u16 {
        self.mp
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// The active connection, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn profile(&self) -> &OpcodeProfile {
        &self.profile
    }

    /// Returns the flag that cancels [`Vm::run`] when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Replaces the stop flag with one owned by the caller.
    pub fn set_stop_handle(&mut self, stop: Arc<AtomicBool>) {
        self.stop = stop;
    }

    /// Runs until a halt condition and returns it.
    ///
    /// Every halt closes the active connection and flushes the host. Only
    /// [`Halt::End`] writes the trailing newline.
    ///
    /// # Errors
    /// Returns [`VMError::HostOutput`] if standard output cannot be written.
    pub fn run(&mut self) -> Result<Halt, VMError> {
        let halt = loop {
            if self.stop.load(Ordering::Relaxed) {
                break Halt::Cancelled;
            }
            if let Some(limit) = self.config.max_steps
                && self.steps >= limit
            {
                break Halt::StepLimit;
            }
            if let Step::Halt(halt) = self.step()? {
                break halt;
            }
        };
        self.finish(halt)?;
        Ok(halt)
    }

    /// Executes the cell at the IP.
    ///
    /// Does not apply the step limit or the stop flag, and does not perform
    /// the halt cleanup that [`Vm::run`] does.
    pub fn step(&mut self) -> Result<Step, VMError> {
        let cell = self.memory[self.ip];
        let opcode = Opcode::decode(cell);
        self.steps += 1;
        self.profile.record(opcode);

        let (flow, width) = match opcode {
            Some(opcode) => (self.exec(opcode)?, opcode.width()),
            None => (self.op_unknown(cell)?, 0),
        };

        match flow {
            Flow::Next => self.ip = self.ip.wrapping_add(width),
            Flow::Jump(target) => self.ip = target,
            Flow::Stay => {}
            Flow::Halt(halt) => return Ok(Step::Halt(halt)),
        }
        Ok(Step::Continue)
    }

    fn exec(&mut self, opcode: Opcode) -> Result<Flow, VMError> {
        exec_vm! {
            vm = self,
            opcode = opcode,
            {
                Nop => op_nop(),
                // I/O
                Wrt => op_wrt(),
                Rd => op_rd(),
                Con => op_con(),
                // Control flow
                If => op_if(),
                Eif => op_eif(),
                End => op_end(),
                // Tape
                Fwd => op_fwd(n: Operand),
                Bak => op_bak(n: Operand),
                Inc => op_inc(n: Operand),
                Dec => op_dec(n: Operand),
            }
        }
    }

    /// Closes the connection and flushes the host after a halt.
    fn finish(&mut self, halt: Halt) -> Result<(), VMError> {
        if let Some(connection) = self.connection.take() {
            debug!("closing {} connection to {}", connection.kind(), connection.peer());
            connection.close();
        }
        if halt == Halt::End {
            self.host.write_byte(b'\n').map_err(VMError::HostOutput)?;
        }
        self.host.flush().map_err(VMError::HostOutput)
    }

    fn cell(&mut self) -> &mut u8 {
        &mut self.memory[self.mp]
    }

    /// Reads one byte from the active input. `None` is end of stream.
    ///
    /// Standard output is flushed before a blocking stdin read; a failed flush
    /// is a host output error, not end of input.
    fn input(&mut self) -> Result<Option<u8>, VMError> {
        let read = match self.connection.as_mut() {
            Some(connection) => connection.read_byte(),
            None => {
                self.host.flush().map_err(VMError::HostOutput)?;
                self.host.read_byte()
            }
        };
        Ok(read.unwrap_or_else(|e| {
            warn!("read failed, treating as end of input: {e}");
            None
        }))
    }

    fn op_unknown(&mut self, cell: u8) -> Result<Flow, VMError> {
        debug!("no opcode for cell {cell:#04x} at {:#06x}", self.ip);
        self.host
            .write_text(UNKNOWN_OPCODE_MESSAGE)
            .map_err(VMError::HostOutput)?;
        Ok(Flow::Stay)
    }

    fn op_nop(&mut self) -> Result<Flow, VMError> {
        Ok(Flow::Next)
    }

    fn op_wrt(&mut self) -> Result<Flow, VMError> {
        let byte = *self.cell();
        match self.connection.as_mut() {
            Some(connection) => {
                if let Err(e) = connection.write_byte(byte) {
                    warn!("write to {} failed: {e}", connection.peer());
                }
            }
            None => self.host.write_byte(byte).map_err(VMError::HostOutput)?,
        }
        Ok(Flow::Next)
    }

    fn op_rd(&mut self) -> Result<Flow, VMError> {
        match (self.input()?, self.config.on_eof) {
            (Some(byte), _) => *self.cell() = byte,
            (None, EofPolicy::Zero) => *self.cell() = 0,
            (None, EofPolicy::Keep) => {}
            (None, EofPolicy::Halt) => return Ok(Flow::Halt(Halt::InputExhausted)),
        }
        Ok(Flow::Next)
    }

    fn op_con(&mut self) -> Result<Flow, VMError> {
        let cells = self.memory.read_wrapping::<ENDPOINT_CELLS>(self.mp);
        let endpoint = Endpoint::from_cells(cells);

        match dial(&endpoint, &self.config.transports, &self.config.dial_options()) {
            Ok(connection) => {
                info!("connected to {endpoint} over {}", connection.kind());
                if let Some(previous) = self.connection.replace(connection) {
                    debug!("leaving {} connection to {} open", previous.kind(), previous.peer());
                    self.superseded.push(previous);
                }
            }
            Err(e) => {
                debug!("{e}");
                self.host
                    .write_text(CONNECT_FAILURE_MESSAGE)
                    .map_err(VMError::HostOutput)?;
            }
        }
        Ok(Flow::Next)
    }

    fn op_if(&mut self) -> Result<Flow, VMError> {
        if *self.cell() != 0 {
            return Ok(Flow::Next);
        }
        Ok(self.jump_past_match(Direction::Forward))
    }

    fn op_eif(&mut self) -> Result<Flow, VMError> {
        if *self.cell() == 0 {
            return Ok(Flow::Next);
        }
        Ok(self.jump_past_match(Direction::Backward))
    }

    fn jump_past_match(&self, direction: Direction) -> Flow {
        match self.memory.matching_bracket(self.ip, direction) {
            Some(addr) => Flow::Jump(addr.wrapping_add(1)),
            None => {
                warn!("no matching bracket for {:#06x} ({direction:?}), continuing", self.ip);
                Flow::Next
            }
        }
    }

    fn op_end(&mut self) -> Result<Flow, VMError> {
        Ok(Flow::Halt(Halt::End))
    }

    fn op_fwd(&mut self, n: u8) -> Result<Flow, VMError> {
        self.mp = self.mp.wrapping_add(u16::from(n));
        Ok(Flow::Next)
    }

    fn op_bak(&mut self, n: u8) -> Result<Flow, VMError> {
        self.mp = self.mp.wrapping_sub(u16::from(n));
        Ok(Flow::Next)
    }

    fn op_inc(&mut self, n: u8) -> Result<Flow, VMError> {
        let cell = self.cell();
        *cell = cell.wrapping_add(n);
        Ok(Flow::Next)
    }

    fn op_dec(&mut self, n: u8) -> Result<Flow, VMError> {
        let cell = self.cell();
        *cell = cell.wrapping_sub(n);
        Ok(Flow::Next)
    }
}

impl<H: Host> fmt::Debug for Vm<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("ip", &self.ip)
            .field("mp", &self.mp)
            .field("connection", &self.connection)
            .field("superseded", &self.superseded.len())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
