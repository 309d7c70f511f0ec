//! Execution engine for the Universal Machine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::decode::{self, Instruction, Word};
use crate::cpu::io::Console;
use crate::cpu::memory::{MemoryError, SegmentTable};
use crate::cpu::Registers;
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Fetching and executing instructions.
    Running,
    /// Executed a `halt`.
    Halted,
    /// Stopped by a fault. Nothing can resume it.
    Faulted,
}

/// The four kinds of fatal fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fault {
    DivideByZero,
    InvalidAccess,
    InvalidOutput,
    InvalidInstruction,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Fault::DivideByZero => "divide by zero",
            Fault::InvalidAccess => "invalid access",
            Fault::InvalidOutput => "invalid output",
            Fault::InvalidInstruction => "invalid instruction",
        };
        f.write_str(name)
    }
}

/// The Universal Machine.
///
/// Registers, memory and program counter together; the caller owns it and
/// drives it with [`Cpu::step`] or [`Cpu::run`].
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// General-purpose registers.
    pub regs: Registers,
    /// Segmented memory; segment 0 is the program.
    pub mem: SegmentTable,
    /// Index in segment 0 of the next instruction.
    pub pc: u32,
    /// Current execution state.
    pub state: CpuState,
    /// Instructions retired so far.
    pub cycles: u64,
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a machine with `program` in segment 0 and pc at its start.
    pub fn new(program: Vec<Word>) -> Self {
        Self {
            regs: Registers::new(),
            mem: SegmentTable::new(program),
            pc: 0,
            state: CpuState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed. A fault stops the machine
    /// for good; every later call returns [`CpuError::NotRunning`].
    pub fn step<C: Console + ?Sized>(&mut self, console: &mut C) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        // Fetch, checking against the current program length, which a
        // previous loadp may have changed
        let pc = self.pc;
        let word = match self.mem.fetch(pc) {
            Some(word) => word,
            None => {
                let len = self.mem.program().len();
                return Err(self.stop(CpuError::PcOutOfRange { pc, len }));
            }
        };

        let instr = decode::decode(word);
        tracing::trace!(pc, ?instr, "fetched {:#010x}", word);

        if let Err(e) = self.execute(instr, console) {
            return Err(self.stop(e));
        }

        self.cycles += 1;
        self.last_instr = Some(instr);
        Ok(instr)
    }

    /// Run until halt or fault.
    ///
    /// Returns the number of instructions executed.
    pub fn run<C: Console + ?Sized>(&mut self, console: &mut C) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(console)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited<C: Console + ?Sized>(
        &mut self,
        console: &mut C,
        max_cycles: u64,
    ) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step(console)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction and move the program counter.
    ///
    /// Every check that can fault runs before the first write, so a failed
    /// instruction leaves registers, memory and pc as they were.
    fn execute<C: Console + ?Sized>(
        &mut self,
        instr: Instruction,
        console: &mut C,
    ) -> Result<(), CpuError> {
        let pc = self.pc;
        let access = |source: MemoryError| CpuError::InvalidAccess { pc, source };

        match instr {
            Instruction::CMove { a, b, c } => {
                if self.regs.get(c) != 0 {
                    self.regs.set(a, self.regs.get(b));
                }
            }

            Instruction::Load { a, b, c } => {
                let value = self
                    .mem
                    .read(self.regs.get(b), self.regs.get(c))
                    .map_err(access)?;
                self.regs.set(a, value);
            }

            Instruction::Store { a, b, c } => {
                self.mem
                    .write(self.regs.get(a), self.regs.get(b), self.regs.get(c))
                    .map_err(access)?;
            }

            Instruction::Add { a, b, c } => {
                self.regs.set(a, self.regs.get(b).wrapping_add(self.regs.get(c)));
            }

            Instruction::Mul { a, b, c } => {
                self.regs.set(a, self.regs.get(b).wrapping_mul(self.regs.get(c)));
            }

            Instruction::Div { a, b, c } => {
                let divisor = self.regs.get(c);
                if divisor == 0 {
                    return Err(CpuError::DivideByZero { pc });
                }
                self.regs.set(a, self.regs.get(b) / divisor);
            }

            Instruction::Nand { a, b, c } => {
                self.regs.set(a, !(self.regs.get(b) & self.regs.get(c)));
            }

            Instruction::Halt => {
                tracing::info!(pc, cycles = self.cycles + 1, "halted");
                self.state = CpuState::Halted;
                return Ok(());
            }

            Instruction::Map { b, c } => {
                let size = self.regs.get(c);
                let id = self.mem.map(size);
                tracing::debug!(id, size, "mapped segment");
                self.regs.set(b, id);
            }

            Instruction::Unmap { c } => {
                let id = self.regs.get(c);
                self.mem.unmap(id).map_err(access)?;
                tracing::debug!(id, "unmapped segment");
            }

            Instruction::Out { c } => {
                let value = self.regs.get(c);
                let byte = u8::try_from(value)
                    .map_err(|_| CpuError::InvalidOutput { pc, value })?;
                console.write_byte(byte)?;
            }

            Instruction::In { c } => {
                let value = match console.read_byte()? {
                    Some(byte) => Word::from(byte),
                    None => Word::MAX,
                };
                self.regs.set(c, value);
            }

            Instruction::LoadProgram { b, c } => {
                let source = self.regs.get(b);
                let target = self.regs.get(c);
                if source != 0 {
                    self.mem.replace_program(source).map_err(access)?;
                    tracing::debug!(
                        source,
                        len = self.mem.program().len(),
                        "loaded program from segment"
                    );
                }
                self.pc = target;
                return Ok(());
            }

            Instruction::LoadImmediate { a, value } => {
                self.regs.set(a, value);
            }

            Instruction::Invalid { opcode } => {
                return Err(CpuError::InvalidOpcode { pc, opcode });
            }
        }

        self.pc = pc.wrapping_add(1);
        Ok(())
    }

    /// Stop the machine on `error` and hand the error back.
    fn stop(&mut self, error: CpuError) -> CpuError {
        self.state = CpuState::Faulted;
        tracing::warn!(pc = self.pc, cycles = self.cycles, %error, "machine stopped");
        error
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the machine is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Summary of the machine after a run.
    pub fn stats(&self) -> RunStats {
        RunStats {
            cycles: self.cycles,
            state: self.state,
            pc: self.pc,
            program_len: self.mem.program().len(),
            live_segments: self.mem.live_count(),
            free_ids: self.mem.free_count(),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("pc", &self.pc)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("mem", &self.mem)
            .finish()
    }
}

/// Counters reported by `--stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub cycles: u64,
    pub state: CpuState,
    pub pc: u32,
    pub program_len: usize,
    pub live_segments: usize,
    pub free_ids: usize,
}

/// Errors that can occur during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("machine not running: {0:?}")]
    NotRunning(CpuState),

    #[error("division by zero at pc {pc}")]
    DivideByZero { pc: u32 },

    #[error("invalid access at pc {pc}: {source}")]
    InvalidAccess {
        pc: u32,
        #[source]
        source: MemoryError,
    },

    #[error("invalid output at pc {pc}: {value} is not a byte")]
    InvalidOutput { pc: u32, value: Word },

    #[error("invalid instruction at pc {pc}: undefined opcode {opcode}")]
    InvalidOpcode { pc: u32, opcode: u8 },

    #[error("invalid instruction: pc {pc} is past the end of a {len}-word program")]
    PcOutOfRange { pc: u32, len: usize },

    #[error("I/O error: {0}")]
    Io(String),
}

impl CpuError {
    /// Which of the four machine faults this is, if any.
    pub fn fault(&self) -> Option<Fault> {
        match self {
            CpuError::DivideByZero { .. } => Some(Fault::DivideByZero),
            CpuError::InvalidAccess { .. } => Some(Fault::InvalidAccess),
            CpuError::InvalidOutput { .. } => Some(Fault::InvalidOutput),
            CpuError::InvalidOpcode { .. } | CpuError::PcOutOfRange { .. } => {
                Some(Fault::InvalidInstruction)
            }
            CpuError::NotRunning(_) | CpuError::Io(_) => None,
        }
    }
}

impl From<std::io::Error> for CpuError {
    fn from(e: std::io::Error) -> Self {
        CpuError::Io(e.to_string())
    }
}
