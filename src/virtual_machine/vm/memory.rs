use crate::virtual_machine::isa::Opcode;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of cells in the address space.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Scan direction for [`Memory::matching_bracket`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Toward higher addresses, looking for the `EIF` that closes an `IF`.
    Forward,
    /// Toward lower addresses, looking for the `IF` that opens an `EIF`.
    Backward,
}

/// The single address space shared by code and data.
///
/// Indexed by `u16`, so every address is valid and pointer arithmetic done with
/// `wrapping_*` on `u16` gives the 65536-cell wraparound for free. There is no
/// code segment: the interpreter re-reads each cell when it fetches it, so a
/// write through the tape pointer is visible to the next fetch of that address.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Box<[u8; MEMORY_SIZE]>,
}

impl Memory {
    /// Creates a zeroed address space.
    pub fn new() -> Self {
        Self {
            cells: Box::new([0; MEMORY_SIZE]),
        }
    }

    /// Returns the cell at `addr`.
    #[inline]
    pub fn get(&self, addr: u16) -> u8 {
        self.cells[addr as usize]
    }

    /// Overwrites the cell at `addr`.
    #[inline]
    pub fn set(&mut self, addr: u16, value: u8) {
        self.cells[addr as usize] = value;
    }

    /// Reads `N` consecutive cells starting at `addr`, wrapping past the top.
    pub fn read_wrapping<const N: usize>(&self, addr: u16) -> [u8; N] {
        std::array::from_fn(|i| self.get(addr.wrapping_add(i as u16)))
    }

    /// Returns all cells.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells[..]
    }

    /// Finds the bracket that pairs with the `IF`/`EIF` at `from`.
    ///
    /// Walks one address at a time in `direction`, decoding every cell (operand
    /// cells included) and counting nesting depth from 1. Returns the address
    /// where depth reaches 0, or `None` when a full lap of the address space
    /// finds no partner. Nothing is cached: the answer always reflects the
    /// current contents, which may have been rewritten by the program.
    pub fn matching_bracket(&self, from: u16, direction: Direction) -> Option<u16> {
        let mut depth: u32 = 1;
        let mut addr = from;

        for _ in 0..MEMORY_SIZE {
            addr = match direction {
                Direction::Forward => addr.wrapping_add(1),
                Direction::Backward => addr.wrapping_sub(1),
            };
            match (Opcode::decode(self.get(addr)), direction) {
                (Some(Opcode::Eif), Direction::Forward) | (Some(Opcode::If), Direction::Backward) => {
                    depth -= 1;
                }
                (Some(Opcode::If), Direction::Forward) | (Some(Opcode::Eif), Direction::Backward) => {
                    depth += 1;
                }
                _ => {}
            }
            if depth == 0 {
                return Some(addr);
            }
        }
        None
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<u16> for Memory {
    type Output = u8;

    fn index(&self, addr: u16) -> &u8 {
        &self.cells[addr as usize]
    }
}

impl IndexMut<u16> for Memory {
    fn index_mut(&mut self, addr: u16) -> &mut u8 {
        &mut self.cells[addr as usize]
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.cells.iter().filter(|c| **c != 0).count();
        f.debug_struct("Memory")
            .field("size", &MEMORY_SIZE)
            .field("nonzero_cells", &used)
            .finish()
    }
}
