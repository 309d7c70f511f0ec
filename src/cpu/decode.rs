//! Instruction decoder for the Universal Machine.
//!
//! Every instruction is one 32-bit word. The top four bits select the
//! opcode. All opcodes but one use the three-register layout:
//!
//! ```text
//!  31    28                       8  6 5  3 2  0
//! +--------+-----------------------+----+----+----+
//! | opcode |        unused         |  A |  B |  C |
//! +--------+-----------------------+----+----+----+
//! ```
//!
//! Load-immediate (opcode 13) names one register and carries a 25-bit value:
//!
//! ```text
//!  31    28 27 25 24                             0
//! +--------+-----+--------------------------------+
//! |   13   |  A  |             value              |
//! +--------+-----+--------------------------------+
//! ```

use crate::bitpack;
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// A machine word. Instructions and data share the same representation.
pub type Word = u32;

/// Width of the load-immediate value field.
pub const IMMEDIATE_BITS: u32 = 25;

/// Largest value a load-immediate can carry.
pub const IMMEDIATE_MAX: Word = (1 << IMMEDIATE_BITS) - 1;

const OPCODE_WIDTH: u32 = 4;
const OPCODE_LSB: u32 = 28;
const REG_WIDTH: u32 = 3;
const RA_LSB: u32 = 6;
const RB_LSB: u32 = 3;
const RC_LSB: u32 = 0;
const LV_RA_LSB: u32 = 25;

/// A register index. Always in `0..8`, so register access cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    /// Number of general-purpose registers.
    pub const COUNT: usize = 8;

    /// Make a register index, or `None` if `index` is 8 or more.
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < Self::COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Take the low three bits of `bits` as a register index.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self((bits & 0b111) as u8)
    }

    /// All eight registers, in order.
    pub fn all() -> impl Iterator<Item = Reg> {
        (0..Self::COUNT as u8).map(Reg)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The fourteen defined opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    CMove = 0,
    Load = 1,
    Store = 2,
    Add = 3,
    Mul = 4,
    Div = 5,
    Nand = 6,
    Halt = 7,
    Map = 8,
    Unmap = 9,
    Out = 10,
    In = 11,
    LoadProgram = 12,
    LoadImmediate = 13,
}

impl Opcode {
    /// Every defined opcode, in numeric order.
    pub const ALL: [Opcode; 14] = [
        Opcode::CMove,
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Nand,
        Opcode::Halt,
        Opcode::Map,
        Opcode::Unmap,
        Opcode::Out,
        Opcode::In,
        Opcode::LoadProgram,
        Opcode::LoadImmediate,
    ];

    /// Look up an opcode by its 4-bit value. 14 and 15 are undefined.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Assembly mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::CMove => "cmov",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Add => "add",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Nand => "nand",
            Opcode::Halt => "halt",
            Opcode::Map => "map",
            Opcode::Unmap => "unmap",
            Opcode::Out => "out",
            Opcode::In => "in",
            Opcode::LoadProgram => "loadp",
            Opcode::LoadImmediate => "lv",
        }
    }

    /// Look up an opcode by mnemonic, ignoring case.
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(text))
    }
}

/// Decoded instruction.
///
/// Each variant carries only the operands its opcode reads, so a decoded
/// instruction cannot name a register the operation ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// if C != 0 then A := B
    CMove { a: Reg, b: Reg, c: Reg },
    /// A := segment[B][C]
    Load { a: Reg, b: Reg, c: Reg },
    /// segment[A][B] := C
    Store { a: Reg, b: Reg, c: Reg },
    /// A := B + C (mod 2^32)
    Add { a: Reg, b: Reg, c: Reg },
    /// A := B * C (mod 2^32)
    Mul { a: Reg, b: Reg, c: Reg },
    /// A := B / C, unsigned and truncating
    Div { a: Reg, b: Reg, c: Reg },
    /// A := !(B & C)
    Nand { a: Reg, b: Reg, c: Reg },
    /// Stop the machine.
    Halt,
    /// B := id of a new zeroed segment of C words
    Map { b: Reg, c: Reg },
    /// Release segment C.
    Unmap { c: Reg },
    /// Write the byte in C.
    Out { c: Reg },
    /// C := next input byte, or all ones at end of input
    In { c: Reg },
    /// Copy segment B over segment 0 (unless B is 0), then jump to C.
    LoadProgram { b: Reg, c: Reg },
    /// A := value
    LoadImmediate { a: Reg, value: Word },
    /// Opcode 14 or 15. Decodes fine; executing it faults.
    Invalid { opcode: u8 },
}

impl Instruction {
    /// The opcode, or `None` for an undefined one.
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self {
            Instruction::CMove { .. } => Opcode::CMove,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Store { .. } => Opcode::Store,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Div { .. } => Opcode::Div,
            Instruction::Nand { .. } => Opcode::Nand,
            Instruction::Halt => Opcode::Halt,
            Instruction::Map { .. } => Opcode::Map,
            Instruction::Unmap { .. } => Opcode::Unmap,
            Instruction::Out { .. } => Opcode::Out,
            Instruction::In { .. } => Opcode::In,
            Instruction::LoadProgram { .. } => Opcode::LoadProgram,
            Instruction::LoadImmediate { .. } => Opcode::LoadImmediate,
            Instruction::Invalid { .. } => return None,
        })
    }
}

/// The raw fields of a three-register word, before any interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    pub opcode: u8,
    pub a: Reg,
    pub b: Reg,
    pub c: Reg,
}

impl Fields {
    /// Split a word into opcode and the three register fields.
    pub fn unpack(word: Word) -> Self {
        let word = u64::from(word);
        Self {
            opcode: bitpack::get_u(word, OPCODE_WIDTH, OPCODE_LSB) as u8,
            a: Reg::from_bits(bitpack::get_u(word, REG_WIDTH, RA_LSB) as u32),
            b: Reg::from_bits(bitpack::get_u(word, REG_WIDTH, RB_LSB) as u32),
            c: Reg::from_bits(bitpack::get_u(word, REG_WIDTH, RC_LSB) as u32),
        }
    }
}

/// Decode one word. Never fails: undefined opcodes become
/// [`Instruction::Invalid`] and fault only when executed.
pub fn decode(word: Word) -> Instruction {
    let Fields { opcode, a, b, c } = Fields::unpack(word);

    match Opcode::from_u8(opcode) {
        Some(Opcode::CMove) => Instruction::CMove { a, b, c },
        Some(Opcode::Load) => Instruction::Load { a, b, c },
        Some(Opcode::Store) => Instruction::Store { a, b, c },
        Some(Opcode::Add) => Instruction::Add { a, b, c },
        Some(Opcode::Mul) => Instruction::Mul { a, b, c },
        Some(Opcode::Div) => Instruction::Div { a, b, c },
        Some(Opcode::Nand) => Instruction::Nand { a, b, c },
        Some(Opcode::Halt) => Instruction::Halt,
        Some(Opcode::Map) => Instruction::Map { b, c },
        Some(Opcode::Unmap) => Instruction::Unmap { c },
        Some(Opcode::Out) => Instruction::Out { c },
        Some(Opcode::In) => Instruction::In { c },
        Some(Opcode::LoadProgram) => Instruction::LoadProgram { b, c },
        Some(Opcode::LoadImmediate) => {
            let word = u64::from(word);
            Instruction::LoadImmediate {
                a: Reg::from_bits(bitpack::get_u(word, REG_WIDTH, LV_RA_LSB) as u32),
                value: bitpack::get_u(word, IMMEDIATE_BITS, 0) as Word,
            }
        }
        None => Instruction::Invalid { opcode },
    }
}

/// Build a three-register word.
pub fn three_register(op: Opcode, a: Reg, b: Reg, c: Reg) -> Word {
    pack_three(op as u8, a, b, c)
}

/// Build a load-immediate word.
pub fn load_immediate(a: Reg, value: Word) -> Result<Word, EncodeError> {
    let word = pack(0, OPCODE_WIDTH, OPCODE_LSB, Opcode::LoadImmediate as u64);
    let word = pack(word, REG_WIDTH, LV_RA_LSB, a.index() as u64);
    bitpack::new_u(word, IMMEDIATE_BITS, 0, u64::from(value))
        .map(|w| w as Word)
        .map_err(|_| EncodeError::ImmediateOutOfRange(value))
}

/// Encode an instruction back to its word.
///
/// Operands an opcode ignores are encoded as zero.
pub fn encode(instr: &Instruction) -> Result<Word, EncodeError> {
    let r0 = Reg(0);
    let word = match *instr {
        Instruction::CMove { a, b, c } => three_register(Opcode::CMove, a, b, c),
        Instruction::Load { a, b, c } => three_register(Opcode::Load, a, b, c),
        Instruction::Store { a, b, c } => three_register(Opcode::Store, a, b, c),
        Instruction::Add { a, b, c } => three_register(Opcode::Add, a, b, c),
        Instruction::Mul { a, b, c } => three_register(Opcode::Mul, a, b, c),
        Instruction::Div { a, b, c } => three_register(Opcode::Div, a, b, c),
        Instruction::Nand { a, b, c } => three_register(Opcode::Nand, a, b, c),
        Instruction::Halt => three_register(Opcode::Halt, r0, r0, r0),
        Instruction::Map { b, c } => three_register(Opcode::Map, r0, b, c),
        Instruction::Unmap { c } => three_register(Opcode::Unmap, r0, r0, c),
        Instruction::Out { c } => three_register(Opcode::Out, r0, r0, c),
        Instruction::In { c } => three_register(Opcode::In, r0, r0, c),
        Instruction::LoadProgram { b, c } => three_register(Opcode::LoadProgram, r0, b, c),
        Instruction::LoadImmediate { a, value } => load_immediate(a, value)?,
        Instruction::Invalid { opcode } => {
            if !(14..=15).contains(&opcode) {
                return Err(EncodeError::InvalidOpcode(opcode));
            }
            pack_three(opcode, r0, r0, r0)
        }
    };
    Ok(word)
}

fn pack_three(opcode: u8, a: Reg, b: Reg, c: Reg) -> Word {
    let word = pack(0, OPCODE_WIDTH, OPCODE_LSB, u64::from(opcode & 0xF));
    let word = pack(word, REG_WIDTH, RA_LSB, a.index() as u64);
    let word = pack(word, REG_WIDTH, RB_LSB, b.index() as u64);
    pack(word, REG_WIDTH, RC_LSB, c.index() as u64) as Word
}

/// Pack a field whose value is known to fit.
fn pack(word: u64, width: u32, lsb: u32, value: u64) -> u64 {
    let field = (u64::MAX >> (64 - width)) << lsb;
    (word & !field) | ((value << lsb) & field)
}

/// Errors that can occur while encoding an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("immediate {0} does not fit in 25 bits")]
    ImmediateOutOfRange(Word),

    #[error("opcode {0} is not an undefined opcode")]
    InvalidOpcode(u8),
}
