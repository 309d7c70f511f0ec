//! Debugger application state and logic.

use crate::asm::disassemble_word;
use crate::cpu::{BufferConsole, Cpu, CpuError, Word};
use std::collections::HashSet;

/// Instructions executed per frame while running continuously.
const TICK_BATCH: usize = 10_000;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub cpu: Cpu,
    /// Original program, for reset.
    pub program: Vec<Word>,
    /// Original input, for reset.
    pub input: Vec<u8>,
    /// Input still to be read and output written so far.
    pub console: BufferConsole,
    /// Breakpoints (by pc).
    pub breakpoints: HashSet<u32>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// The error that stopped the machine, if any.
    pub fault: Option<CpuError>,
    /// Segment view scroll offset.
    pub mem_scroll: usize,
    /// Step over a breakpoint at the current pc when resuming.
    resume: bool,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program and its input.
    pub fn new(program: Vec<Word>, input: Vec<u8>) -> Self {
        Self {
            cpu: Cpu::new(program.clone()),
            console: BufferConsole::new(input.clone()),
            program,
            input,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            fault: None,
            mem_scroll: 0,
            resume: false,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("Machine stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.pc;
        match self.cpu.step(&mut self.console) {
            Ok(_) if self.cpu.is_halted() => {
                self.status = format!("Halted after {} cycles", self.cpu.cycles);
                self.running = false;
            }
            Ok(instr) => {
                let text = crate::cpu::encode(&instr)
                    .map(disassemble_word)
                    .unwrap_or_else(|_| format!("{:?}", instr));
                self.status = format!("pc={:06}: {}", pc, text);
            }
            Err(e) => {
                self.status = format!("Fault: {}", e);
                self.fault = Some(e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or fault.
    pub fn run(&mut self) {
        self.running = true;
        self.resume = true;
        self.status = "Running...".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..TICK_BATCH {
            if !self.running {
                return;
            }

            if !self.cpu.is_running() {
                self.running = false;
                return;
            }

            let pc = self.cpu.pc;
            if !self.resume && self.breakpoints.contains(&pc) {
                self.running = false;
                self.status = format!("Breakpoint at pc={}", pc);
                return;
            }
            self.resume = false;

            self.step();
        }
    }

    /// Toggle breakpoint at current pc.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at pc={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at pc={}", pc);
        }
    }

    /// Reset the machine and its input to the initial state.
    pub fn reset(&mut self) {
        self.cpu = Cpu::new(self.program.clone());
        self.console = BufferConsole::new(self.input.clone());
        self.fault = None;
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Get disassembly of segment 0 around the current pc.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u32, String, bool)> {
        let pc = self.cpu.pc;
        let program = self.cpu.mem.program();
        let start = pc.saturating_sub(lines as u32 / 2);

        (start..start.saturating_add(lines as u32))
            .filter_map(|addr| {
                let word = *program.get(addr as usize)?;
                Some((addr, disassemble_word(word), addr == pc))
            })
            .collect()
    }

    /// Program output so far, as text.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(self.console.output()).into_owned()
    }
}

/// Run the debugger with a program and the bytes `in` should read.
pub fn run_debugger(program: Vec<Word>, input: Vec<u8>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal; the guard restores it on every way out of here
    enable_raw_mode()?;
    let _restore = OnDrop::new(|| {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    });
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(program, input);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.mem_scroll = app.mem_scroll.saturating_sub(1),
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.cpu.mem.live_count() {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Runs a closure when dropped, including on an early `?` return.
struct OnDrop<F: FnMut()> {
    action: F,
}

impl<F: FnMut()> OnDrop<F> {
    fn new(action: F) -> Self {
        Self { action }
    }
}

impl<F: FnMut()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        (self.action)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::cpu::Fault;

    fn app(source: &str, input: &str) -> DebuggerApp {
        DebuggerApp::new(assemble(source).unwrap(), input.as_bytes().to_vec())
    }

    #[test]
    fn test_step_and_halt() {
        let mut app = app("lv r1, 'A'\nout r1\nhalt", "");
        app.step();
        assert_eq!(app.cpu.pc, 1);
        app.step();
        assert_eq!(app.output_text(), "A");
        app.step();
        assert!(app.cpu.is_halted());
        assert!(app.status.starts_with("Halted"));
    }

    #[test]
    fn test_run_stops_at_breakpoint_then_resumes() {
        let mut app = app("lv r1, 1\nlv r2, 2\nlv r3, 3\nhalt", "");
        app.cpu.pc = 2;
        app.toggle_breakpoint();
        app.cpu.pc = 0;

        app.run();
        app.tick();
        assert!(!app.running);
        assert_eq!(app.cpu.pc, 2);

        app.run();
        app.tick();
        assert!(app.cpu.is_halted());
    }

    #[test]
    fn test_fault_is_recorded() {
        let mut app = app("div r1, r2, r3", "");
        app.step();
        assert_eq!(app.fault.as_ref().and_then(CpuError::fault), Some(Fault::DivideByZero));
        assert!(app.status.starts_with("Fault"));
    }

    #[test]
    fn test_reset_restores_input() {
        let mut app = app("in r1\nout r1\nhalt", "x");
        app.run();
        app.tick();
        assert_eq!(app.output_text(), "x");

        app.reset();
        assert_eq!(app.output_text(), "");
        assert_eq!(app.console.remaining_input(), 1);
        assert!(app.cpu.is_running());
    }

    #[test]
    fn test_guard_runs_on_early_error_return() {
        use std::cell::Cell;

        let restored = Cell::new(false);
        let draw = || -> std::io::Result<()> { Err(std::io::Error::other("draw failed")) };
        let session = || -> std::io::Result<()> {
            let _restore = OnDrop::new(|| restored.set(true));
            draw()?;
            Ok(())
        };

        assert!(session().is_err());
        assert!(restored.get());
    }

    #[test]
    fn test_disassembly_marks_pc() {
        let mut app = app("lv r1, 1\nhalt", "");
        app.step();
        let lines = app.get_disassembly(4);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], (1, "halt".to_string(), true));
    }
}
