//! TUI debugger for the Universal Machine.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and pc view
//! - Segment table view
//! - Program output pane
//! - Step/run/breakpoint controls over a disassembly of segment 0

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
