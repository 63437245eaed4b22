//! Parsing functions to parse in-memory data using [`Buf`].

use bytes::{Buf, Bytes};

use crate::errors::Result;

fn too_short(needed: usize, remaining: usize) -> crate::errors::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("needed {needed}, remaining {remaining}"),
    )
    .into()
}

pub trait BufParsing: Buf + Sized {
    fn read_u8(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        Ok(self.get_u8())
    }

    fn read_be_u16(&mut self) -> Result<u16> {
        self.ensure_remaining(2)?;
        Ok(self.get_u16())
    }

    fn read_be_u32(&mut self) -> Result<u32> {
        self.ensure_remaining(4)?;
        Ok(self.get_u32())
    }

    fn read_array<const C: usize>(&mut self) -> Result<[u8; C]> {
        self.ensure_remaining(C)?;
        let mut arr = [0u8; C];
        self.copy_to_slice(&mut arr);
        Ok(arr)
    }

    fn read_take(&mut self, size: usize) -> Result<Bytes> {
        self.ensure_remaining(size)?;
        Ok(self.copy_to_bytes(size))
    }

    /// Reads an SSH wire `string`: a u32 length followed by that many bytes.
    fn read_ssh_string(&mut self) -> Result<Bytes> {
        let len = self.read_be_u32()?;
        self.read_take(len.try_into()?)
    }

    fn rest(&mut self) -> Bytes {
        let len = self.remaining();
        self.copy_to_bytes(len)
    }

    fn ensure_remaining(&self, size: usize) -> Result<()> {
        if self.remaining() < size {
            return Err(too_short(size, self.remaining()));
        }
        Ok(())
    }
}

impl<B: Buf> BufParsing for B {}
