//! WebAssembly bindings for the Universal Machine.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.
//! Input is queued with `push_input`; output collects until `take_output`.

use wasm_bindgen::prelude::*;
use crate::{BufferConsole, Cpu, Word};
use crate::asm::{assemble, disassemble_word, parse_image};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    console: BufferConsole,
    program: Vec<Word>,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create an empty machine.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::default(),
            console: BufferConsole::default(),
            program: Vec::new(),
        }
    }

    /// Load a program from assembly source code.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let words = assemble(source).map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.load(words))
    }

    /// Load a program from the bytes of a `.um` image.
    #[wasm_bindgen]
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<usize, JsError> {
        let words = parse_image(bytes).map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.load(words))
    }

    /// Queue bytes for `in` to read.
    #[wasm_bindgen]
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.console.push_input(bytes);
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let pc = self.cpu.pc;
        let word = self.cpu.mem.fetch(pc);
        self.cpu
            .step(&mut self.console)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(word.map(disassemble_word).unwrap_or_default())
    }

    /// Run until halt, fault or max cycles. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        self.cpu
            .run_limited(&mut self.console, u64::from(max_cycles))
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.cpu.cycles)
    }

    /// Reset the machine to the loaded program, discarding input and output.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu = Cpu::new(self.program.clone());
        self.console = BufferConsole::default();
    }

    /// Output written since the last call.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> Vec<u8> {
        self.console.take_output()
    }

    /// Check if the machine is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if the machine is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u32 {
        self.cpu.pc
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    /// Get the eight registers.
    #[wasm_bindgen]
    pub fn registers(&self) -> Vec<u32> {
        self.cpu.regs.values().to_vec()
    }

    /// Get a copy of a mapped segment, or nothing if `id` is unmapped.
    #[wasm_bindgen]
    pub fn segment(&self, id: u32) -> Option<Vec<u32>> {
        self.cpu.mem.segment(id).map(<[Word]>::to_vec)
    }

    /// Get registers, pc and state as a JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&serde_json::json!({
            "registers": self.cpu.regs.values(),
            "pc": self.cpu.pc,
            "state": self.cpu.state,
            "cycles": self.cpu.cycles,
        }))
        .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Get the run summary as a JSON string.
    #[wasm_bindgen]
    pub fn stats_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu.stats()).map_err(|e| JsError::new(&e.to_string()))
    }
}

impl WasmCpu {
    fn load(&mut self, words: Vec<Word>) -> usize {
        let len = words.len();
        self.program = words;
        self.reset();
        len
    }
}

impl Default for WasmCpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the image bytes.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<Vec<u8>, JsError> {
    let words = assemble(source).map_err(|e| JsError::new(&e.to_string()))?;
    Ok(words.iter().flat_map(|w| w.to_be_bytes()).collect())
}

/// Disassemble a single word.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u32) -> String {
    disassemble_word(word)
}
