//! Line ending normalization for text mode signatures.

use std::io::{self, Write};

/// Writer adapter that rewrites `\n`, `\r` and `\r\n` line endings as `\r\n`.
///
/// State is kept across `write` calls, so a `\r\n` split between two writes
/// is still emitted once.
pub struct CrlfWriter<W: Write> {
    inner: W,
    prev_was_cr: bool,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            prev_was_cr: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, b) in buf.iter().enumerate() {
            match b {
                b'\n' if self.prev_was_cr => {
                    // the \r already produced a full line break
                    self.inner.write_all(&buf[start..i])?;
                    start = i + 1;
                    self.prev_was_cr = false;
                }
                b'\n' => {
                    self.inner.write_all(&buf[start..i])?;
                    self.inner.write_all(b"\r\n")?;
                    start = i + 1;
                }
                b'\r' => {
                    self.inner.write_all(&buf[start..i])?;
                    self.inner.write_all(b"\r\n")?;
                    start = i + 1;
                    self.prev_was_cr = true;
                }
                _ => self.prev_was_cr = false,
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
