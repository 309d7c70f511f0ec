//! Disassembler for Universal Machine programs.
//!
//! Converts instruction words back to the assembler's syntax.

use crate::cpu::decode::{decode, Instruction, Word};

/// Disassemble a single word to text.
pub fn disassemble_word(word: Word) -> String {
    format_instruction(&decode(word)).unwrap_or_else(|| format!(".word {:#010x}", word))
}

/// Disassemble a slice of words as a listing with addresses.
pub fn disassemble(words: &[Word]) -> String {
    let mut output = String::new();
    output.push_str("; Universal Machine disassembly\n");
    output.push_str(&format!("; {} words\n\n", words.len()));

    for (addr, word) in words.iter().enumerate() {
        let line = disassemble_word(*word);
        output.push_str(&format!("{:06}: {:<24} ; {:08x}\n", addr, line, word));
    }

    output
}

/// Format a decoded instruction as assembly text, or `None` if undefined.
pub fn format_instruction(instr: &Instruction) -> Option<String> {
    let text = match instr {
        Instruction::CMove { a, b, c }
        | Instruction::Load { a, b, c }
        | Instruction::Store { a, b, c }
        | Instruction::Add { a, b, c }
        | Instruction::Mul { a, b, c }
        | Instruction::Div { a, b, c }
        | Instruction::Nand { a, b, c } => {
            format!("{} {}, {}, {}", mnemonic(instr), a, b, c)
        }
        Instruction::Halt => "halt".to_string(),
        Instruction::Map { b, c } | Instruction::LoadProgram { b, c } => {
            format!("{} {}, {}", mnemonic(instr), b, c)
        }
        Instruction::Unmap { c } | Instruction::Out { c } | Instruction::In { c } => {
            format!("{} {}", mnemonic(instr), c)
        }
        Instruction::LoadImmediate { a, value } => format!("lv {}, {}", a, value),
        Instruction::Invalid { .. } => return None,
    };
    Some(text)
}

fn mnemonic(instr: &Instruction) -> &'static str {
    instr.opcode().map_or("???", |op| op.mnemonic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::cpu::decode::encode;
    use proptest::prelude::*;

    #[test]
    fn test_disassemble_halt() {
        assert_eq!(disassemble_word(0x7000_0000), "halt");
    }

    #[test]
    fn test_disassemble_three_register() {
        assert_eq!(disassemble_word(3 << 28 | 3 << 6 | 1 << 3 | 2), "add r3, r1, r2");
    }

    #[test]
    fn test_disassemble_load_immediate() {
        assert_eq!(disassemble_word(0xD200_0019), "lv r1, 25");
    }

    #[test]
    fn test_disassemble_undefined() {
        assert_eq!(disassemble_word(0xE123_4567), ".word 0xe1234567");
    }

    #[test]
    fn test_listing_has_addresses() {
        let listing = disassemble(&[0xD200_0019, 0x7000_0000]);
        assert!(listing.contains("000000: lv r1, 25"));
        assert!(listing.contains("000001: halt"));
    }

    proptest! {
        #[test]
        fn property_disassembly_reassembles(word in any::<u32>()) {
            let text = disassemble_word(word);
            let words = assemble(&text).unwrap();
            prop_assert_eq!(words.len(), 1);
            prop_assert_eq!(decode(words[0]), decode(word));
            if decode(word).opcode().is_some() {
                prop_assert_eq!(words[0], encode(&decode(word)).unwrap());
            }
        }
    }
}
