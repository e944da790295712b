use crate::network::transport::{DialOptions, TransportKind};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What `RD` stores when its input reaches end of stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EofPolicy {
    /// Store 0 in the current cell.
    #[default]
    Zero,
    /// Leave the current cell unchanged.
    Keep,
    /// Stop the interpreter with [`Halt::InputExhausted`](super::Halt::InputExhausted).
    Halt,
}

impl EofPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EofPolicy::Zero => "zero",
            EofPolicy::Keep => "keep",
            EofPolicy::Halt => "halt",
        }
    }
}

impl fmt::Display for EofPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EofPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" => Ok(EofPolicy::Zero),
            "keep" => Ok(EofPolicy::Keep),
            "halt" => Ok(EofPolicy::Halt),
            other => Err(format!("unknown end-of-input policy '{other}'")),
        }
    }
}

/// Interpreter settings.
///
/// The defaults reproduce the bare machine: every transport kind in the
/// standard order, no timeouts, no step limit, and `RD` storing 0 at end of
/// input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmConfig {
    /// Transport kinds tried by `CON`, in order.
    pub transports: Vec<TransportKind>,
    /// Upper bound on each connect attempt.
    pub connect_timeout: Option<Duration>,
    /// Read/write timeout on an established connection.
    pub io_timeout: Option<Duration>,
    /// Maximum number of executed steps before halting.
    pub max_steps: Option<u64>,
    /// Behavior of `RD` at end of input.
    pub on_eof: EofPolicy,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            transports: TransportKind::DEFAULT_ORDER.to_vec(),
            connect_timeout: None,
            io_timeout: None,
            max_steps: None,
            on_eof: EofPolicy::default(),
        }
    }
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transports(mut self, transports: impl Into<Vec<TransportKind>>) -> Self {
        self.transports = transports.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_eof_policy(mut self, policy: EofPolicy) -> Self {
        self.on_eof = policy;
        self
    }

    /// Timeouts handed to the transport layer on `CON`.
    pub fn dial_options(&self) -> DialOptions {
        DialOptions {
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
        }
    }
}
