//! Simple assembler for Universal Machine programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! start:                  ; Define a label (its address in segment 0)
//!     lv r1, 'H'          ; Load immediate: decimal, 0x hex, 'c' or a label
//!     out r1              ; out/in/unmap name one register (C)
//!     map r2, r3          ; map/loadp name two (B, C)
//!     add r3, r1, r2      ; everything else takes A, B, C
//!     halt
//!     .word 0xF0000000    ; Raw data word (number or label)
//! ```
//!
//! Mnemonics and labels are case-insensitive.

use crate::cpu::decode::{self, Instruction, Opcode, Reg, Word, IMMEDIATE_MAX};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a list of words.
pub fn assemble(source: &str) -> Result<Vec<Word>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// An operand value that may not be known until labels are resolved.
#[derive(Debug, Clone)]
enum Value {
    Number(i64),
    Label(String),
}

/// What to patch once a label's address is known.
#[derive(Debug, Clone, Copy)]
enum Fixup {
    /// The immediate of an `lv` into this register.
    Immediate(Reg),
    /// A whole `.word`.
    Word,
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, u32>,
    /// Unresolved references: (output_index, label, fixup, source_line).
    pending: Vec<(usize, String, Fixup, usize)>,
    /// Output words.
    output: Vec<Word>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<Word>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve references to labels
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some((head, rest)) = line.split_once(':') {
            let label = head.trim();
            if is_identifier(label) {
                self.define_label(label, line_num)?;
                let rest = rest.trim();
                if !rest.is_empty() {
                    return self.process_instruction(rest, line_num);
                }
                return Ok(());
            }
        }

        self.process_instruction(line, line_num)
    }

    fn define_label(&mut self, label: &str, line_num: usize) -> Result<(), AssemblerError> {
        let key = label.to_uppercase();
        if self.symbols.contains_key(&key) {
            return Err(AssemblerError::DuplicateLabel {
                line: line_num,
                label: label.to_string(),
            });
        }
        let addr = self.output.len() as u32;
        self.symbols.insert(key, addr);
        Ok(())
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m, rest.trim()),
            None => (line, ""),
        };
        let operands = split_operands(rest);

        if mnemonic.eq_ignore_ascii_case(".word") {
            let [value] = expect_operands::<1>(&operands, ".word", line_num)?;
            match parse_value(value, line_num)? {
                Value::Number(n) => {
                    let word = word_from_number(n)
                        .ok_or(AssemblerError::ValueOutOfRange { line: line_num, value: n })?;
                    self.emit(word);
                }
                Value::Label(label) => {
                    self.pending.push((self.output.len(), label, Fixup::Word, line_num));
                    self.emit(0);
                }
            }
            return Ok(());
        }

        let op = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AssemblerError::UnknownMnemonic {
            line: line_num,
            mnemonic: mnemonic.to_string(),
        })?;

        if op == Opcode::LoadImmediate {
            let [reg, value] = expect_operands::<2>(&operands, "lv", line_num)?;
            let a = parse_register(reg, line_num)?;
            let value = match parse_value(value, line_num)? {
                Value::Number(n) => immediate_from_number(n, line_num)?,
                Value::Label(label) => {
                    self.pending.push((self.output.len(), label, Fixup::Immediate(a), line_num));
                    0
                }
            };
            let word = decode::load_immediate(a, value)
                .map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value: i64::from(value) })?;
            self.emit(word);
            return Ok(());
        }

        let instr = self.parse_instruction(op, &operands, line_num)?;
        self.emit(decode::encode(&instr).map_err(|e| AssemblerError::SyntaxError {
            line: line_num,
            message: e.to_string(),
        })?);
        Ok(())
    }

    fn parse_instruction(
        &self,
        op: Opcode,
        operands: &[&str],
        line_num: usize,
    ) -> Result<Instruction, AssemblerError> {
        let name = op.mnemonic();
        let regs = |n: usize| -> Result<Vec<Reg>, AssemblerError> {
            if operands.len() != n {
                return Err(operand_count_error(name, n, operands.len(), line_num));
            }
            operands.iter().map(|s| parse_register(s, line_num)).collect()
        };

        let instr = match op {
            Opcode::Halt => {
                regs(0)?;
                Instruction::Halt
            }
            Opcode::Map | Opcode::LoadProgram => {
                let r = regs(2)?;
                let (b, c) = (r[0], r[1]);
                if op == Opcode::Map {
                    Instruction::Map { b, c }
                } else {
                    Instruction::LoadProgram { b, c }
                }
            }
            Opcode::Unmap | Opcode::Out | Opcode::In => {
                let c = regs(1)?[0];
                match op {
                    Opcode::Unmap => Instruction::Unmap { c },
                    Opcode::Out => Instruction::Out { c },
                    _ => Instruction::In { c },
                }
            }
            _ => {
                let r = regs(3)?;
                let (a, b, c) = (r[0], r[1], r[2]);
                match op {
                    Opcode::CMove => Instruction::CMove { a, b, c },
                    Opcode::Load => Instruction::Load { a, b, c },
                    Opcode::Store => Instruction::Store { a, b, c },
                    Opcode::Add => Instruction::Add { a, b, c },
                    Opcode::Mul => Instruction::Mul { a, b, c },
                    Opcode::Div => Instruction::Div { a, b, c },
                    _ => Instruction::Nand { a, b, c },
                }
            }
        };

        Ok(instr)
    }

    fn emit(&mut self, word: Word) {
        self.output.push(word);
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, fixup, line_num) in &self.pending {
            let addr = *self
                .symbols
                .get(&label.to_uppercase())
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone(),
                })?;

            self.output[*out_idx] = match *fixup {
                Fixup::Word => addr,
                Fixup::Immediate(a) => decode::load_immediate(a, addr).map_err(|_| {
                    AssemblerError::ValueOutOfRange {
                        line: *line_num,
                        value: i64::from(addr),
                    }
                })?,
            };
        }
        Ok(())
    }
}

/// Drop a trailing `;` comment, ignoring semicolons inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut in_quote = false;
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quote => escaped = true,
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Split on commas that are not inside quotes.
fn split_operands(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quote = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quote => escaped = true,
            '\'' => in_quote = !in_quote,
            ',' if !in_quote => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn expect_operands<'a, const N: usize>(
    operands: &[&'a str],
    name: &str,
    line_num: usize,
) -> Result<[&'a str; N], AssemblerError> {
    operands
        .try_into()
        .map_err(|_| operand_count_error(name, N, operands.len(), line_num))
}

fn operand_count_error(name: &str, expected: usize, found: usize, line: usize) -> AssemblerError {
    AssemblerError::SyntaxError {
        line,
        message: format!("{} takes {} operand(s), found {}", name, expected, found),
    }
}

fn parse_register(text: &str, line_num: usize) -> Result<Reg, AssemblerError> {
    let index = text
        .strip_prefix('r')
        .or_else(|| text.strip_prefix('R'))
        .and_then(|n| n.parse::<u8>().ok())
        .and_then(Reg::new);

    index.ok_or_else(|| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("expected a register r0-r7, found '{}'", text),
    })
}

fn parse_value(text: &str, line_num: usize) -> Result<Value, AssemblerError> {
    let syntax = |message: String| AssemblerError::SyntaxError { line: line_num, message };

    // Character literal
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        let ch = match inner {
            "\\n" => '\n',
            "\\t" => '\t',
            "\\r" => '\r',
            "\\0" => '\0',
            "\\\\" => '\\',
            "\\'" => '\'',
            _ => {
                let mut chars = inner.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => return Err(syntax(format!("invalid character literal {}", text))),
                }
            }
        };
        return Ok(Value::Number(i64::from(u32::from(ch))));
    }

    // Hex literal
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(Value::Number)
            .map_err(|_| syntax(format!("invalid hex literal {}", text)));
    }

    // Decimal number
    if text.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return text
            .parse::<i64>()
            .map(Value::Number)
            .map_err(|_| syntax(format!("invalid number {}", text)));
    }

    if is_identifier(text) {
        return Ok(Value::Label(text.to_string()));
    }

    Err(syntax(format!("expected a value, found '{}'", text)))
}

fn immediate_from_number(n: i64, line_num: usize) -> Result<Word, AssemblerError> {
    u32::try_from(n)
        .ok()
        .filter(|&v| v <= IMMEDIATE_MAX)
        .ok_or(AssemblerError::ValueOutOfRange { line: line_num, value: n })
}

/// A `.word` accepts anything that fits in 32 bits, signed or unsigned.
fn word_from_number(n: i64) -> Option<Word> {
    if (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&n) {
        Some(n as u32)
    } else {
        None
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label defined twice on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::decode;

    fn r(i: u8) -> Reg {
        Reg::new(i).unwrap()
    }

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; Simple test program
            lv r1, 25
            lv r2, 17
            add r3, r1, r2
            out r3
            halt
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(result[0], 0xD200_0019);
        assert_eq!(decode(result[2]), Instruction::Add { a: r(3), b: r(1), c: r(2) });
        assert_eq!(result[4], 0x7000_0000);
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
        start:
            lv r1, end
            loadp r0, r1
            halt
        end: HALT
            .word start
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(decode(result[0]), Instruction::LoadImmediate { a: r(1), value: 3 });
        assert_eq!(result[4], 0);
    }

    #[test]
    fn test_assemble_data() {
        let source = r#"
            .word 42
            .word -1
            .word 0xF0000000
            .word ';'
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result, vec![42, 0xFFFF_FFFF, 0xF000_0000, 59]);
    }

    #[test]
    fn test_character_literals() {
        let result = assemble("lv r0, 'A' ; letter\nlv r1, '\\n'\nlv r2, ','").unwrap();
        assert_eq!(decode(result[0]), Instruction::LoadImmediate { a: r(0), value: 65 });
        assert_eq!(decode(result[1]), Instruction::LoadImmediate { a: r(1), value: 10 });
        assert_eq!(decode(result[2]), Instruction::LoadImmediate { a: r(2), value: 44 });
    }

    #[test]
    fn test_operand_shapes() {
        let result = assemble("map r2, r3\nunmap r4\nIn r5\nloadp r6, r7").unwrap();
        assert_eq!(decode(result[0]), Instruction::Map { b: r(2), c: r(3) });
        assert_eq!(decode(result[1]), Instruction::Unmap { c: r(4) });
        assert_eq!(decode(result[2]), Instruction::In { c: r(5) });
        assert_eq!(decode(result[3]), Instruction::LoadProgram { b: r(6), c: r(7) });
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        assert_eq!(
            assemble("halt\njump r1"),
            Err(AssemblerError::UnknownMnemonic { line: 2, mnemonic: "jump".into() })
        );
        assert!(matches!(
            assemble("add r1, r2"),
            Err(AssemblerError::SyntaxError { line: 1, .. })
        ));
        assert!(matches!(
            assemble("out r8"),
            Err(AssemblerError::SyntaxError { line: 1, .. })
        ));
        assert_eq!(
            assemble("lv r1, 33554432"),
            Err(AssemblerError::ValueOutOfRange { line: 1, value: 33_554_432 })
        );
        assert_eq!(
            assemble("lv r1, nowhere"),
            Err(AssemblerError::UndefinedLabel { line: 1, label: "nowhere".into() })
        );
        assert_eq!(
            assemble("a: halt\nA: halt"),
            Err(AssemblerError::DuplicateLabel { line: 2, label: "A".into() })
        );
    }
}
