//! The Universal Machine.
//!
//! This module implements the complete machine:
//! - eight 32-bit general-purpose registers
//! - a table of dynamically mapped memory segments, segment 0 being the program
//! - a 14-instruction set with byte-level input and output

pub mod decode;
pub mod execute;
pub mod io;
pub mod memory;
pub mod registers;

pub use decode::{decode, encode, EncodeError, Instruction, Opcode, Reg, Word};
pub use execute::{Cpu, CpuError, CpuState, Fault, RunStats};
pub use io::{BufferConsole, Console, StdConsole};
pub use memory::{MemoryError, SegmentId, SegmentTable};
pub use registers::Registers;
