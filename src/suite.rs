//! Built-in conformance programs.
//!
//! Each case is a small program with the input it reads and the output (and
//! fault, if any) it must produce. The suite can be run in-process or
//! written to disk as `<name>.um` (the image), `<name>.0` (input) and
//! `<name>.1` (expected output), with a `manifest.json` describing every case.

use crate::asm::{assemble, save_image, AssemblerError, ImageError};
use crate::cpu::{BufferConsole, Cpu, Fault, Word};
use serde::{Serialize, Deserialize};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// One conformance program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    /// Bytes fed to `in`.
    pub input: Vec<u8>,
    /// Bytes `out` must produce, in order.
    pub expected_output: Vec<u8>,
    /// The fault that must end the run, or `None` for a clean halt.
    pub expected_fault: Option<Fault>,
    /// Assembly source of the program.
    #[serde(skip)]
    pub source: String,
    /// The assembled program.
    #[serde(skip)]
    pub program: Vec<Word>,
}

/// What happened when a case ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub name: String,
    pub passed: bool,
    pub output: Vec<u8>,
    pub fault: Option<Fault>,
    /// A failure that is not a machine fault, such as an I/O error.
    pub error: Option<String>,
    pub cycles: u64,
}

/// Case definitions: name, input, expected output, expected fault, source.
const CASES: &[(&str, &[u8], &[u8], Option<Fault>, &str)] = &[
    ("halt", b"", b"", None, "halt"),
    (
        "halt-verbose",
        b"",
        b"",
        None,
        "halt
         lv r1, 'B'
         out r1
         lv r1, 'a'
         out r1
         lv r1, 'd'
         out r1
         lv r1, '!'
         out r1
         lv r1, '\\n'
         out r1",
    ),
    ("output", b"", b"g", None, "lv r3, 'g'\nout r3\nhalt"),
    (
        "add",
        b"",
        b"6",
        None,
        "lv r1, 25
         lv r3, 29
         add r4, r1, r3
         out r4
         halt",
    ),
    (
        "add-42",
        b"",
        b"*",
        None,
        "lv r1, 25
         lv r2, 17
         add r3, r1, r2
         out r3
         halt",
    ),
    (
        "mult",
        b"",
        b"-",
        None,
        "lv r0, 5
         lv r1, 9
         mul r2, r1, r0
         out r2
         halt",
    ),
    (
        "div",
        b"",
        b"(",
        None,
        "lv r0, 800
         lv r1, 20
         div r2, r0, r1
         out r2
         halt",
    ),
    (
        "mult-div",
        b"",
        b"H",
        None,
        "lv r0, 45
         lv r1, 72
         mul r2, r0, r1
         div r3, r2, r0
         out r3
         halt",
    ),
    (
        "allmath",
        b"",
        b"4",
        None,
        "lv r0, 20
         lv r1, 10
         lv r2, 5
         add r3, r0, r2
         mul r4, r1, r3
         add r5, r4, r2
         add r6, r5, r2
         div r7, r6, r2
         out r7
         halt",
    ),
    (
        "bnand",
        b"",
        b"O",
        None,
        "lv r0, 33554431
         lv r1, 33554430
         nand r2, r0, r1
         lv r3, 17980645
         div r4, r2, r3
         lv r5, 3
         div r6, r4, r5
         out r6
         halt",
    ),
    (
        "double-bnand",
        b"",
        b"a",
        None,
        "lv r0, 127
         lv r1, 97
         nand r2, r0, r1
         nand r3, r0, r1
         nand r4, r2, r3
         out r4
         halt",
    ),
    ("map", b"", b"", None, "map r2, r3\nhalt"),
    ("unmap", b"", b"", None, "map r2, r3\nunmap r2\nhalt"),
    ("io", b"4", b"4", None, "in r3\nout r3\nhalt"),
    (
        "io-eof",
        b"8",
        b"8K",
        None,
        "in r3
         out r3
         in r5            ; end of input: r5 := 0xFFFFFFFF
         nand r6, r5, r5
         lv r0, 75
         add r7, r6, r0
         out r7
         halt",
    ),
    (
        "cmov-exec",
        b"",
        b":",
        None,
        "lv r1, 58
         lv r2, 33
         lv r3, 89
         cmov r2, r1, r3
         out r2
         halt",
    ),
    (
        "cmov-no-exec",
        b"",
        b"d",
        None,
        "lv r1, 58
         lv r2, 100
         cmov r2, r1, r3
         out r2
         halt",
    ),
    (
        "lp",
        b"",
        b"L",
        None,
        "lv r1, 2
         map r0, r1          ; r0 := 1
         lv r5, 0x1000000
         lv r6, 16
         mul r5, r5, r6      ; r5 := 1 << 28
         lv r4, 10
         mul r4, r4, r5
         lv r6, 3
         add r4, r4, r6      ; r4 := out r3
         store r0, r7, r4
         lv r4, 7
         mul r4, r4, r5      ; r4 := halt
         lv r6, 1
         store r0, r6, r4
         lv r3, 'L'
         loadp r0, r7",
    ),
    (
        "lp-0seg",
        b"",
        b"Z",
        None,
        "lv r1, 'Z'
         lv r2, done
         loadp r0, r2
         out r1
         done: out r1
         halt",
    ),
    (
        "segload",
        b"",
        b"3",
        None,
        "lv r0, 6
         lv r0, 6
         lv r0, 8
         lv r0, 3
         load r1, r2, r0     ; r1 := the word above
         lv r7, 2430126
         div r1, r1, r7
         lv r7, 359
         div r1, r1, r7
         lv r7, 48
         add r1, r1, r7
         out r1
         halt",
    ),
    (
        "sstore-0",
        b"",
        b"",
        None,
        "lv r3, 3
         lv r3, 3
         lv r3, 3
         lv r3, 3
         lv r4, 5
         store r0, r4, r1    ; overwrite this word with a no-op cmov
         halt",
    ),
    (
        "sstore-empty",
        b"",
        b"",
        Some(Fault::InvalidAccess),
        "map r0, r1          ; zero-length segment
         store r0, r4, r1
         halt",
    ),
    (
        "long",
        b"?",
        b"f3f?",
        None,
        "lv r0, 100
         lv r1, 2
         add r0, r1, r0
         map r7, r0
         out r0
         div r0, r0, r1
         out r0
         mul r0, r0, r1
         out r0
         in r2
         cmov r0, r7, r7
         store r7, r2, r2
         load r5, r7, r2
         out r5
         unmap r7
         lv r7, end
         loadp r6, r7
         out r1              ; skipped
         end: halt",
    ),
    (
        "output-high",
        b"",
        b"\xC8",
        None,
        "lv r1, 200
         out r1
         halt",
    ),
    (
        "io-high",
        b"\xE9\x80",
        b"\x80\xE9",
        None,
        "in r1              ; bytes read back unsigned
         in r2
         out r2
         out r1
         halt",
    ),
    (
        "divide-by-zero",
        b"",
        b"",
        Some(Fault::DivideByZero),
        "lv r1, 7
         div r2, r1, r0
         halt",
    ),
    (
        "output-range",
        b"",
        b"A",
        Some(Fault::InvalidOutput),
        "lv r1, 65
         out r1
         lv r1, 300
         out r1
         halt",
    ),
    (
        "unmap-program",
        b"",
        b"",
        Some(Fault::InvalidAccess),
        "unmap r0\nhalt",
    ),
    (
        "unmap-twice",
        b"",
        b"",
        Some(Fault::InvalidAccess),
        "map r1, r0
         unmap r1
         unmap r1
         halt",
    ),
    (
        "load-unmapped",
        b"",
        b"",
        Some(Fault::InvalidAccess),
        "lv r1, 9
         load r2, r1, r0
         halt",
    ),
    (
        "bad-opcode",
        b"",
        b"",
        Some(Fault::InvalidInstruction),
        ".word 0xE0000000",
    ),
    (
        "fall-off-end",
        b"",
        b"!",
        Some(Fault::InvalidInstruction),
        "lv r1, '!'\nout r1",
    ),
];

/// Number of map/unmap rounds in the `unmap-many` case.
const UNMAP_ROUNDS: usize = 5000;

/// Assemble every case.
pub fn cases() -> Result<Vec<TestCase>, AssemblerError> {
    let mut all = Vec::with_capacity(CASES.len() + 1);

    for &(name, input, expected_output, expected_fault, source) in CASES {
        all.push(build_case(name, input, expected_output, expected_fault, source.to_string())?);
    }

    // Repeated allocation: ids must keep being recycled
    let mut source = String::from("map r4, r5\n");
    for _ in 0..UNMAP_ROUNDS {
        source.push_str("lv r7, 12\nmap r6, r7\nunmap r6\n");
    }
    source.push_str("unmap r4\nhalt\n");
    all.push(build_case("unmap-many", b"", b"", None, source)?);

    Ok(all)
}

fn build_case(
    name: &str,
    input: &[u8],
    expected_output: &[u8],
    expected_fault: Option<Fault>,
    source: String,
) -> Result<TestCase, AssemblerError> {
    let program = assemble(&source)?;
    Ok(TestCase {
        name: name.to_string(),
        input: input.to_vec(),
        expected_output: expected_output.to_vec(),
        expected_fault,
        source,
        program,
    })
}

/// Run a case in-process against an in-memory console.
pub fn run_case(case: &TestCase) -> CaseOutcome {
    let mut cpu = Cpu::new(case.program.clone());
    let mut console = BufferConsole::new(case.input.clone());

    let (fault, error) = match cpu.run(&mut console) {
        Ok(_) => (None, None),
        Err(e) => match e.fault() {
            Some(fault) => (Some(fault), None),
            None => (None, Some(e.to_string())),
        },
    };

    let output = console.take_output();
    let passed = error.is_none()
        && fault == case.expected_fault
        && output == case.expected_output;

    tracing::debug!(case = %case.name, passed, cycles = cpu.cycles, "ran case");

    CaseOutcome {
        name: case.name.clone(),
        passed,
        output,
        fault,
        error,
        cycles: cpu.cycles,
    }
}

/// Write one case as `<name>.um`, `<name>.0` and `<name>.1` under `dir`.
///
/// Empty input or output files are not written, and stale ones are removed.
pub fn write_case(dir: &Path, case: &TestCase) -> Result<(), SuiteError> {
    save_image(dir.join(format!("{}.um", case.name)), &case.program)?;
    write_or_remove(&dir.join(format!("{}.0", case.name)), &case.input)?;
    write_or_remove(&dir.join(format!("{}.1", case.name)), &case.expected_output)?;
    Ok(())
}

/// Write every case and a `manifest.json` under `dir`, creating it if needed.
pub fn write_suite(dir: &Path, cases: &[TestCase]) -> Result<(), SuiteError> {
    std::fs::create_dir_all(dir).map_err(|e| SuiteError::IoError(e.to_string()))?;

    for case in cases {
        write_case(dir, case)?;
    }

    let manifest = serde_json::to_string_pretty(cases)
        .map_err(|e| SuiteError::ManifestError(e.to_string()))?;
    std::fs::write(dir.join("manifest.json"), manifest)
        .map_err(|e| SuiteError::IoError(e.to_string()))?;

    tracing::info!(dir = %dir.display(), cases = cases.len(), "wrote conformance suite");
    Ok(())
}

/// Read a manifest written by [`write_suite`].
///
/// Programs are not part of the manifest; the returned cases have empty
/// `source` and `program`.
pub fn read_manifest(dir: &Path) -> Result<Vec<TestCase>, SuiteError> {
    let text = std::fs::read_to_string(dir.join("manifest.json"))
        .map_err(|e| SuiteError::IoError(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| SuiteError::ManifestError(e.to_string()))
}

/// One line per case plus a total, for the `self-test` command.
pub fn report(outcomes: &[CaseOutcome]) -> String {
    let mut text = String::new();
    for outcome in outcomes {
        let mark = if outcome.passed { "ok  " } else { "FAIL" };
        let _ = write!(text, "{} {:<16} {:>8} cycles", mark, outcome.name, outcome.cycles);
        if let Some(fault) = outcome.fault {
            let _ = write!(text, "  ({})", fault);
        }
        if let Some(error) = &outcome.error {
            let _ = write!(text, "  error: {}", error);
        }
        text.push('\n');
    }
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let _ = write!(text, "{} passed, {} failed", passed, outcomes.len() - passed);
    text
}

fn write_or_remove(path: &Path, contents: &[u8]) -> Result<(), SuiteError> {
    if contents.is_empty() {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SuiteError::IoError(e.to_string())),
        }
    } else {
        std::fs::write(path, contents).map_err(|e| SuiteError::IoError(e.to_string()))
    }
}

/// Errors that can occur while building or writing the suite.
#[derive(Debug, Clone, Error)]
pub enum SuiteError {
    #[error("assembly error: {0}")]
    AssemblyError(#[from] AssemblerError),

    #[error("image error: {0}")]
    ImageError(#[from] ImageError),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("manifest error: {0}")]
    ManifestError(String),
}
