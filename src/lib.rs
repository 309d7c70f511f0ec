//! # Universal Machine Emulator
//!
//! An emulator for the Universal Machine: eight 32-bit registers, a table of
//! dynamically allocated memory segments, and fourteen instructions. Segment
//! 0 holds the running program, which can be replaced at run time.
//!
//! The machine is a plain value ([`Cpu`]) driven one instruction at a time
//! against a byte [`Console`]. Every fault is returned as a [`CpuError`]
//! and stops the machine.

pub mod bitpack;
pub mod cpu;
pub mod asm;
pub mod suite;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{
    BufferConsole, Console, Cpu, CpuError, CpuState, Fault, Instruction, Opcode, Reg, Registers,
    RunStats, SegmentTable, StdConsole, Word,
};
pub use asm::{assemble, disassemble, load_image, parse_image, save_image, AssemblerError, ImageError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
