const DEFAULT_BUFFER_CAPACITY: usize = 4096;
use std::io::{self, Stdout, Write};

/// Buffered writer that batches terminal commands and emits them in one write.
#[derive(Debug)]
pub struct TerminalRenderer<W: Write = Stdout> {
    buffer: Vec<u8>,
    out: W,
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn with_writer(out: W) -> Self {
        TerminalRenderer {
            buffer: Vec::with_capacity(DEFAULT_BUFFER_CAPACITY),
            out,
        }
    }

    /// Bytes queued since the last flush.
    #[cfg(test)]
    fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Write everything queued to the terminal and clear the buffer.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.out.write_all(&self.buffer)?;
        self.out.flush()?;
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> Write for TerminalRenderer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        TerminalRenderer::flush(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_reaches_writer_before_flush() -> io::Result<()> {
        let mut renderer = TerminalRenderer::with_writer(Vec::new());
        write!(renderer, "abc")?;
        assert_eq!(renderer.pending(), b"abc");
        assert!(renderer.out.is_empty());
        renderer.flush()?;
        assert_eq!(renderer.out, b"abc");
        assert!(renderer.pending().is_empty());
        Ok(())
    }
}
