use std::collections::VecDeque;
use std::io::{self, BufWriter, ErrorKind, Read, Stdin, Stdout, Write};

/// Byte-oriented input and output used by the I/O primitives.
pub trait Console {
    /// Reads one byte, or `None` at end of input.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    fn write_str(&mut self, text: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Standard input and a buffered standard output.
///
/// Output is flushed before every read so prompts appear before the program blocks.
pub struct StdConsole {
    stdin: Stdin,
    stdout: BufWriter<Stdout>,
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: BufWriter::new(io::stdout()),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.stdout.flush()?;
        let mut byte = [0u8; 1];
        loop {
            match self.stdin.lock().read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.stdout.write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

/// In-memory console: input is fixed up front, output is collected.
#[derive(Debug, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: String,
}

impl BufferConsole {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.bytes().collect(),
            output: String::new(),
        }
    }

    /// Everything written so far.
    pub fn output(&self) -> &str {
        &self.output
    }
}

impl Console for BufferConsole {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.output.push_str(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_console_reads_then_reports_end() {
        let mut console = BufferConsole::new("ab");
        assert_eq!(console.read_byte().unwrap(), Some(b'a'));
        assert_eq!(console.read_byte().unwrap(), Some(b'b'));
        assert_eq!(console.read_byte().unwrap(), None);
        assert_eq!(console.read_byte().unwrap(), None);
    }

    #[test]
    fn buffer_console_collects_output() {
        let mut console = BufferConsole::default();
        console.write_str("x = ").unwrap();
        console.write_str("42\n").unwrap();
        assert_eq!(console.output(), "x = 42\n");
    }
}
