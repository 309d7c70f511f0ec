//! Universal Machine register file.
//!
//! Eight general-purpose 32-bit registers, r0 through r7, all zero at
//! startup. Indices come from [`Reg`], which is always in range.

use crate::cpu::decode::{Reg, Word};
use serde::{Serialize, Deserialize};
use std::fmt;

/// The register file.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    cells: [Word; Reg::COUNT],
}

impl Registers {
    /// Create a register file with every register zeroed.
    pub const fn new() -> Self {
        Self { cells: [0; Reg::COUNT] }
    }

    #[inline]
    pub fn get(&self, reg: Reg) -> Word {
        self.cells[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Reg, value: Word) {
        self.cells[reg.index()] = value;
    }

    /// All register values, r0 first.
    pub fn values(&self) -> &[Word; Reg::COUNT] {
        &self.cells
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        self.cells = [0; Reg::COUNT];
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for reg in Reg::all() {
            list.entry(&format_args!("{}", reg), &format_args!("{:#010x}", self.get(reg)));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(i: u8) -> Reg {
        Reg::new(i).unwrap()
    }

    #[test]
    fn test_registers_start_zeroed() {
        let regs = Registers::new();
        assert!(regs.values().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_registers_are_independent() {
        let mut regs = Registers::new();
        regs.set(r(3), 42);
        regs.set(r(7), u32::MAX);

        assert_eq!(regs.get(r(3)), 42);
        assert_eq!(regs.get(r(7)), u32::MAX);
        assert_eq!(regs.get(r(0)), 0);
        assert_eq!(regs.get(r(4)), 0);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new();
        regs.set(r(1), 9);
        regs.reset();
        assert_eq!(regs, Registers::new());
    }

    #[test]
    fn test_debug_lists_every_register() {
        let text = format!("{:?}", Registers::new());
        assert!(text.contains("r0"));
        assert!(text.contains("r7"));
    }
}
