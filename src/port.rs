//! Byte-at-a-time character I/O
//!
//! The runtime only ever pulls one input byte at a time and pushes output a
//! byte (or a short run) at a time. Anything that can do that is a
//! [`Console`]; two backends ship with the crate.
use std::io::{self, BufRead, Write};

pub trait Console {
    /// Next input byte, blocking if necessary. `None` means end of input.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        bytes.iter().try_for_each(|&byte| self.write_byte(byte))
    }

    /// Write to the diagnostic channel.
    fn report_error(&mut self, message: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).write_byte(byte)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    fn report_error(&mut self, message: &[u8]) -> io::Result<()> {
        (**self).report_error(message)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Hosted console over buffered streams: input, output, and errors.
pub struct StdConsole<R, W, E> {
    input: R,
    output: W,
    errors: E,
}

impl<R: BufRead, W: Write, E: Write> StdConsole<R, W, E> {
    pub fn new(input: R, output: W, errors: E) -> Self {
        Self {
            input,
            output,
            errors,
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn errors(&self) -> &E {
        &self.errors
    }

    pub fn into_parts(self) -> (R, W, E) {
        (self.input, self.output, self.errors)
    }
}

impl<R: BufRead, W: Write, E: Write> Console for StdConsole<R, W, E> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = loop {
            match self.input.fill_buf() {
                Ok(buf) => break buf.first().copied(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if byte.is_some() {
            self.input.consume(1);
        }
        Ok(byte)
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.write_all(bytes)
    }

    fn report_error(&mut self, message: &[u8]) -> io::Result<()> {
        // keep program output and diagnostics in order on a shared terminal
        self.output.flush()?;
        self.errors.write_all(message)?;
        self.errors.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// Input terminator of the text buffer console.
pub const END_OF_TRANSMISSION: u8 = 0x04;

/// Fixed-size console sink that overwrites its oldest bytes when full.
pub struct RingBuffer<const N: usize> {
    bytes: [u8; N],
    /// total bytes ever written
    written: usize,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self {
            bytes: [0; N],
            written: 0,
        }
    }
}

impl<const N: usize> RingBuffer<N> {
    pub fn push(&mut self, byte: u8) {
        self.bytes[self.written % N] = byte;
        self.written += 1;
    }

    /// Retained bytes, oldest first.
    pub fn contents(&self) -> Vec<u8> {
        if self.written <= N {
            return self.bytes[..self.written].to_vec();
        }
        let start = self.written % N;
        let mut out = self.bytes[start..].to_vec();
        out.extend_from_slice(&self.bytes[..start]);
        out
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

/// Console of a machine without an operating system: input is a text buffer
/// terminated by [`END_OF_TRANSMISSION`], output goes to a ring buffer.
pub struct TextBufferConsole<'a> {
    text: &'a [u8],
    position: usize,
    pub ring: RingBuffer<0x100>,
}

impl<'a> TextBufferConsole<'a> {
    pub fn new(text: &'a [u8]) -> Self {
        Self {
            text,
            position: 0,
            ring: RingBuffer::default(),
        }
    }
}

impl Console for TextBufferConsole<'_> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match self.text.get(self.position) {
            None | Some(&END_OF_TRANSMISSION) => Ok(None),
            Some(&byte) => {
                self.position += 1;
                Ok(Some(byte))
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.ring.push(byte);
        Ok(())
    }

    fn report_error(&mut self, message: &[u8]) -> io::Result<()> {
        self.write_bytes(b"PANIC!\n")?;
        self.write_bytes(message)
    }
}
