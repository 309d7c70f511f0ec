//! End-to-end tests driving the library the way the CLI does.

use std::io::Cursor;
use um::cpu::encode;
use um::suite;
use um::{
    assemble, load_image, parse_image, save_image, BufferConsole, Cpu, CpuError, CpuState, Fault,
    Instruction, Reg, StdConsole,
};

fn r(i: u8) -> Reg {
    Reg::new(i).unwrap()
}

fn run_source(source: &str, input: &str) -> (Cpu, Vec<u8>, Result<u64, CpuError>) {
    let mut cpu = Cpu::new(assemble(source).unwrap());
    let mut console = BufferConsole::new(input.as_bytes());
    let result = cpu.run(&mut console);
    (cpu, console.take_output(), result)
}

#[test]
fn add_and_print_42() {
    let program = [
        Instruction::LoadImmediate { a: r(1), value: 25 },
        Instruction::LoadImmediate { a: r(2), value: 17 },
        Instruction::Add { a: r(3), b: r(1), c: r(2) },
        Instruction::Out { c: r(3) },
        Instruction::Halt,
    ]
    .iter()
    .map(|i| encode(i).unwrap())
    .collect();

    let mut cpu = Cpu::new(program);
    let mut console = BufferConsole::default();
    assert_eq!(cpu.run(&mut console), Ok(5));
    assert_eq!(console.output(), &[42]);
    assert_eq!(cpu.state, CpuState::Halted);
}

#[test]
fn output_must_be_a_byte() {
    let (_, output, result) = run_source("lv r1, 65\nout r1\nhalt", "");
    assert_eq!(output, b"A");
    assert!(result.is_ok());

    let (cpu, output, result) = run_source("lv r1, 300\nout r1\nhalt", "");
    assert!(output.is_empty());
    assert_eq!(result.unwrap_err().fault(), Some(Fault::InvalidOutput));
    assert_eq!(cpu.state, CpuState::Faulted);
}

#[test]
fn input_after_end_reads_all_ones() {
    let (cpu, _, result) = run_source("in r1\nin r2\nin r3\nhalt", "z");
    assert!(result.is_ok());
    assert_eq!(cpu.regs.get(r(1)), u32::from(b'z'));
    assert_eq!(cpu.regs.get(r(2)), u32::MAX);
    assert_eq!(cpu.regs.get(r(3)), u32::MAX);
}

#[test]
fn load_program_copies_the_source_segment() {
    // Copy a one-word segment holding `halt` into segment 0
    let source = "
        lv r1, 1
        map r2, r1          ; r2 := new segment of one word
        lv r3, 0x1000000
        lv r4, 112
        mul r3, r3, r4      ; r3 := 7 << 28, the halt word
        store r2, r0, r3
        loadp r2, r0
        halt                ; never reached
    ";
    let (cpu, _, result) = run_source(source, "");
    assert!(result.is_ok());
    assert_eq!(cpu.mem.program(), &[0x7000_0000]);
    assert_eq!(cpu.pc, 0);
}

#[test]
fn load_program_then_unmap_source() {
    // Source segment: [unmap r2, halt]. After loadp the new segment 0 unmaps
    // its own source and still halts.
    let source = "
        lv r1, 2
        map r2, r1
        lv r3, 0x1000000
        lv r4, 16
        mul r3, r3, r4      ; r3 := 1 << 28
        lv r4, 7
        mul r4, r4, r3      ; r4 := halt
        lv r6, 1
        store r2, r6, r4    ; source[1] := halt
        lv r4, 9
        mul r4, r4, r3
        lv r6, 2
        add r4, r4, r6      ; r4 := unmap r2
        store r2, r0, r4    ; source[0] := unmap r2
        loadp r2, r0
    ";
    let (cpu, _, result) = run_source(source, "");
    assert_eq!(result.map(|_| cpu.state), Ok(CpuState::Halted));
    assert_eq!(cpu.mem.program(), &[0x9000_0002, 0x7000_0000]);
    assert!(!cpu.mem.is_mapped(1));
    assert_eq!(cpu.mem.free_count(), 1);
}

#[test]
fn faulted_machine_stays_stopped() {
    let mut cpu = Cpu::new(assemble("lv r1, 1\ndiv r2, r1, r0\nhalt").unwrap());
    let mut console = BufferConsole::default();
    let err = cpu.run(&mut console).unwrap_err();
    assert_eq!(err.fault(), Some(Fault::DivideByZero));
    assert_eq!(cpu.regs.get(r(2)), 0);
    assert_eq!(
        cpu.step(&mut console),
        Err(CpuError::NotRunning(CpuState::Faulted))
    );
}

#[test]
fn std_console_reads_and_writes_streams() {
    let mut cpu = Cpu::new(assemble("in r1\nout r1\nin r2\nout r1\nhalt").unwrap());
    let mut console = StdConsole::new(Cursor::new(b"Q".to_vec()), Vec::new());
    cpu.run(&mut console).unwrap();
    let (_, output) = console.into_inner();
    assert_eq!(output, b"QQ");
    assert_eq!(cpu.regs.get(r(2)), u32::MAX);
}

#[test]
fn assembled_image_survives_disk() {
    let words = assemble("lv r1, 'h'\nout r1\nlv r1, 'i'\nout r1\nhalt").unwrap();
    let path = std::env::temp_dir().join(format!("um-it-{}.um", std::process::id()));
    save_image(&path, &words).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let loaded = load_image(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(bytes.len(), words.len() * 4);
    assert_eq!(parse_image(&bytes).unwrap(), words);
    assert_eq!(loaded, words);

    let mut cpu = Cpu::new(loaded);
    let mut console = BufferConsole::default();
    cpu.run(&mut console).unwrap();
    assert_eq!(console.output(), b"hi");
}

#[test]
fn conformance_suite_passes() {
    let cases = suite::cases().unwrap();
    assert!(cases.len() >= 30);
    for fault in [
        Fault::DivideByZero,
        Fault::InvalidAccess,
        Fault::InvalidOutput,
        Fault::InvalidInstruction,
    ] {
        assert!(cases.iter().any(|c| c.expected_fault == Some(fault)));
    }

    let failed: Vec<_> = cases
        .iter()
        .map(suite::run_case)
        .filter(|o| !o.passed)
        .collect();
    assert!(failed.is_empty(), "failed cases: {:?}", failed);
}

#[test]
fn stats_serialize_to_json() {
    let (cpu, _, _) = run_source("map r1, r2\nhalt", "");
    let json: serde_json::Value = serde_json::to_value(cpu.stats()).unwrap();
    assert_eq!(json["cycles"], 2);
    assert_eq!(json["state"], "Halted");
    assert_eq!(json["live_segments"], 2);
}
