use crate::virtual_machine::isa::Opcode;
use std::fmt::Write;

/// Slots tracked by [`OpcodeProfile`]: one per opcode plus one for unknown cells.
const PROFILE_SLOTS: usize = Opcode::ALL.len() + 1;

/// Execution counts per opcode.
///
/// Backed by a flat array indexed by opcode value; the last slot counts steps
/// that landed on a cell with no opcode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpcodeProfile {
    counts: [u64; PROFILE_SLOTS],
}

impl Default for OpcodeProfile {
    fn default() -> Self {
        Self {
            counts: [0; PROFILE_SLOTS],
        }
    }
}

impl OpcodeProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one execution of `opcode`, or of an unknown cell for `None`.
    #[inline(always)]
    pub fn record(&mut self, opcode: Option<Opcode>) {
        let slot = match opcode {
            Some(op) => op as usize,
            None => PROFILE_SLOTS - 1,
        };
        self.counts[slot] = self.counts[slot].saturating_add(1);
    }

    /// Number of times `opcode` was executed.
    pub fn count(&self, opcode: Opcode) -> u64 {
        self.counts[opcode as usize]
    }

    /// Number of steps spent on cells with no opcode.
    pub fn unknown(&self) -> u64 {
        self.counts[PROFILE_SLOTS - 1]
    }

    /// Total steps recorded.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Iterates over every opcode and its count, in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = (Opcode, u64)> + '_ {
        Opcode::ALL.iter().copied().zip(self.counts)
    }

    /// Renders the non-zero counts as an aligned table with percentages.
    pub fn table(&self) -> String {
        let total = self.total();
        let mut rows: Vec<(&str, u64)> = self
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(op, count)| (op.mnemonic(), count))
            .collect();
        if self.unknown() > 0 {
            rows.push(("unknown", self.unknown()));
        }

        let name_w = 2 + rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max("total".len());
        let count_w = rows
            .iter()
            .map(|(_, count)| format_with_commas(*count).len())
            .max()
            .unwrap_or(0)
            .max(format_with_commas(total).len());
        let dash_w = name_w + 1 + count_w + 2 + "( 100.0%)".len();

        let mut out = String::new();
        let _ = writeln!(out, "Opcode Profile:");
        let _ = writeln!(out, "{}", "-".repeat(dash_w));
        for (name, count) in rows {
            let percent = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{name:<name_w$} {:>count_w$} ({percent:>5.1}%)",
                format_with_commas(count),
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(dash_w));
        let _ = writeln!(
            out,
            "{:<name_w$} {:>count_w$} ({:>5.1}%)",
            "total",
            format_with_commas(total),
            100.0,
        );
        out
    }
}

fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
