//! Byte I/O for the `in` and `out` instructions.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};

/// Where the machine reads and writes bytes.
pub trait Console {
    /// Block until a byte is available. `None` means end of input.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Write one byte.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Push out anything buffered.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A console over any reader and writer, such as stdin and stdout.
///
/// Pending output is flushed before every read, so a program's prompt is
/// visible before it waits for an answer.
pub struct StdConsole<R, W: Write> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> StdConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl<R: Read, W: Write> Console for StdConsole<R, W> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.output.flush()?;
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// An in-memory console: input is a queue, output collects into a vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferConsole {
    /// Create a console whose input holds `input`.
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        let input: Vec<u8> = input.into();
        Self {
            input: VecDeque::from(input),
            output: Vec::new(),
        }
    }

    /// Queue more input after whatever is left.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Take the output written so far, leaving the buffer empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Bytes of input not yet read.
    pub fn remaining_input(&self) -> usize {
        self.input.len()
    }
}

impl Console for BufferConsole {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console_reads_then_reports_end() {
        let mut console = BufferConsole::new(b"hi".to_vec());
        assert_eq!(console.read_byte().unwrap(), Some(b'h'));
        assert_eq!(console.read_byte().unwrap(), Some(b'i'));
        assert_eq!(console.read_byte().unwrap(), None);
        assert_eq!(console.read_byte().unwrap(), None);
    }

    #[test]
    fn test_buffer_console_collects_output() {
        let mut console = BufferConsole::default();
        console.write_byte(b'o').unwrap();
        console.write_byte(b'k').unwrap();
        assert_eq!(console.output(), b"ok");
        assert_eq!(console.take_output(), b"ok".to_vec());
        assert!(console.output().is_empty());
    }

    #[test]
    fn test_std_console_over_slices() {
        let mut console = StdConsole::new(&b"x"[..], Vec::new());
        assert_eq!(console.read_byte().unwrap(), Some(b'x'));
        assert_eq!(console.read_byte().unwrap(), None);
        console.write_byte(b'y').unwrap();
        let (_, out) = console.into_inner();
        assert_eq!(out, b"y");
    }
}
