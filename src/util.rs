use std::io::{self, BufRead, Read};

use bytes::BytesMut;

/// Reads into `buffer` until it is full or the source is exhausted.
///
/// Returns the number of bytes read.
pub(crate) fn fill_buffer<R: Read>(source: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut offset = 0;
    while offset < buffer.len() {
        match source.read(&mut buffer[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(offset)
}

/// Appends to `buffer` until it holds `len` bytes or the source is exhausted.
///
/// Returns the number of bytes appended.
pub(crate) fn fill_buffer_bytes<R: BufRead>(
    source: &mut R,
    buffer: &mut BytesMut,
    len: usize,
) -> io::Result<usize> {
    let mut read = 0;
    while buffer.len() < len {
        let buf = source.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let n = buf.len().min(len - buffer.len());
        buffer.extend_from_slice(&buf[..n]);
        source.consume(n);
        read += n;
    }
    Ok(read)
}
