//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode list and invokes a callback macro for code generation, so the
//! interpreter and the ISA checks share one definition.
//!
//! This module generates:
//! - The [`Opcode`] enum with its numeric values
//! - `TryFrom<u8>` for exact decoding
//! - [`Opcode::decode`], which selects an opcode from the low nibble of a cell
//!
//! # Bytecode Format
//!
//! Every token of the source becomes one cell. An opcode cell is followed by
//! its operand cells, if any:
//! - Opcode: 1 cell, low nibble selects the operation
//! - Operand: 1 cell, the effective amount is `cell + 1` (8-bit wrapping)

use crate::virtual_machine::errors::VMError;

/// Invokes a callback macro with the complete opcode definition list.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// NOP ; no effect
            Nop = 0x0, "NOP" => [],
            /// WRT ; write cell[mp] to the active output
            Wrt = 0x1, "WRT" => [],
            /// RD ; read one byte from the active input into cell[mp]
            Rd = 0x2, "RD" => [],
            /// IF ; if cell[mp] == 0, jump past the matching EIF
            If = 0x3, "IF" => [],
            /// EIF ; if cell[mp] != 0, jump back past the matching IF
            Eif = 0x4, "EIF" => [],
            /// FWD n ; mp += n + 1
            Fwd = 0x5, "FWD" => [n: Operand],
            /// BAK n ; mp -= n + 1
            Bak = 0x6, "BAK" => [n: Operand],
            /// INC n ; cell[mp] += n + 1
            Inc = 0x7, "INC" => [n: Operand],
            /// DEC n ; cell[mp] -= n + 1
            Dec = 0x8, "DEC" => [n: Operand],
            /// CON ; redirect I/O to the endpoint described by cell[mp..mp + 6]
            Con = 0x9, "CON" => [],
            /// END ; stop execution
            End = 0xA, "END" => [],
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::InvalidOpcode(value)),
                }
            }
        }

        impl Opcode {
            /// Every opcode in numeric order.
            pub const ALL: &[Opcode] = &[$( Opcode::$name, )*];

            /// Returns the mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Number of operand cells that follow the opcode cell.
            pub const fn operand_count(&self) -> u16 {
                match self {
                    $( Opcode::$name => 0 $( + $crate::define_opcodes!(@width $kind) )*, )*
                }
            }
        }
    };

    (@width Operand) => { 1 };
}

for_each_opcode!(define_opcodes);

impl Opcode {
    /// Selects the opcode named by the low nibble of `cell`.
    ///
    /// Returns `None` for nibbles 11 through 15.
    #[inline]
    pub fn decode(cell: u8) -> Option<Opcode> {
        Opcode::try_from(cell & 0x0F).ok()
    }

    /// Number of cells the instruction pointer advances past on fallthrough.
    #[inline]
    pub const fn width(&self) -> u16 {
        1 + self.operand_count()
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
