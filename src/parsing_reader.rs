//! Exact-size reads over [`BufRead`] sources.
//!
//! Every helper either returns exactly the requested amount of data or fails
//! with [`io::ErrorKind::UnexpectedEof`].

use std::io::{self, BufRead};

use bytes::{BufMut, BytesMut};

fn eof(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what)
}

pub trait BufReadParsing: BufRead + Sized {
    fn read_u8(&mut self) -> io::Result<u8> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    fn read_be_u16(&mut self) -> io::Result<u16> {
        self.read_array::<2>().map(u16::from_be_bytes)
    }

    fn read_be_u32(&mut self) -> io::Result<u32> {
        self.read_array::<4>().map(u32::from_be_bytes)
    }

    /// Returns `true` if at least one more byte can be read.
    fn has_remaining(&mut self) -> io::Result<bool> {
        Ok(!self.fill_buf()?.is_empty())
    }

    fn read_array<const C: usize>(&mut self) -> io::Result<[u8; C]> {
        let mut arr = [0u8; C];
        let mut read = 0;

        while read < C {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                return Err(eof("short read"));
            }
            let n = (C - read).min(buf.len());
            arr[read..read + n].copy_from_slice(&buf[..n]);
            read += n;
            self.consume(n);
        }

        Ok(arr)
    }

    /// Reads exactly `size` bytes.
    ///
    /// Allocation grows with the data actually read, so a bogus length on a
    /// short stream cannot force a large allocation.
    fn take_bytes(&mut self, size: usize) -> io::Result<BytesMut> {
        let mut out = BytesMut::with_capacity(size.min(1024));

        while out.len() < size {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                return Err(eof("short read"));
            }
            let n = (size - out.len()).min(buf.len());
            out.extend_from_slice(&buf[..n]);
            self.consume(n);
        }

        Ok(out)
    }

    /// Reads everything until EOF.
    fn rest(&mut self) -> io::Result<BytesMut> {
        let mut writer = BytesMut::new().writer();
        io::copy(self, &mut writer)?;
        Ok(writer.into_inner())
    }

    /// Consumes everything until EOF, returning how many bytes were skipped.
    fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Reads exactly `C` bytes and fails unless they equal `tag`.
    fn read_tag<const C: usize>(&mut self, tag: &[u8; C]) -> io::Result<()> {
        let found = self.read_array::<C>()?;
        if &found != tag {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected {}, found {}", hex::encode(tag), hex::encode(found)),
            ));
        }
        Ok(())
    }
}

impl<B: BufRead> BufReadParsing for B {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn exact_reads() {
        let mut src = &[1u8, 0, 2, 0, 0, 0, 3, 9, 9][..];
        assert_eq!(src.read_u8().unwrap(), 1);
        assert_eq!(src.read_be_u16().unwrap(), 2);
        assert_eq!(src.read_be_u32().unwrap(), 3);
        assert!(src.has_remaining().unwrap());
        assert_eq!(&src.take_bytes(2).unwrap()[..], &[9, 9]);
        assert!(!src.has_remaining().unwrap());
    }

    #[test]
    fn short_reads_are_eof() {
        let mut src = &[1u8, 2, 3][..];
        let err = src.read_be_u32().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut src = &[1u8, 2, 3][..];
        let err = src.take_bytes(4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn tag_mismatch() {
        let mut src = &b"SSHSIH"[..];
        let err = src.read_tag(b"SSHSIG").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
