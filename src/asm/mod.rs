//! Assembler, disassembler and image files for Universal Machine programs.
//!
//! This module provides:
//! - A simple two-pass assembler (text → instruction words)
//! - A disassembler (instruction words → readable text)
//! - Loading and saving of big-endian `.um` program images

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_word};
pub use image::{load_image, parse_image, save_image, write_image, ImageError};
