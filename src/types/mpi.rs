use std::io::{self, BufRead};

use bytes::{Buf, Bytes};
use num_bigint::BigUint;

use crate::errors::{ensure, malformed_err, Result};
use crate::parsing::BufParsing;
use crate::parsing_reader::BufReadParsing;

/// Number of bits we accept when reading MPIs.
/// The value is the same as gnupgs.
pub const MAX_MPI_BITS: u16 = 16384;

/// An OpenPGP multiprecision integer.
///
/// The inner value is big-endian with leading zeros stripped, ready to be
/// serialized as-is.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.2>
#[derive(Default, Clone, PartialEq, Eq, Hash, derive_more::Debug)]
pub struct Mpi(#[debug("{}", hex::encode(_0))] Bytes);

impl Mpi {
    /// Reads a length-prefixed MPI from a stream.
    pub fn try_from_reader<R: BufRead>(mut r: R) -> Result<Self> {
        let len_bits = r.read_be_u16()?;
        let len = Self::byte_len(len_bits)?;
        let raw = r.take_bytes(len)?.freeze();
        Ok(Self::from_stripped(raw))
    }

    /// Reads a length-prefixed MPI from an in-memory buffer.
    pub fn from_buf<B: Buf>(mut b: B) -> Result<Self> {
        let len_bits = b.read_be_u16()?;
        let len = Self::byte_len(len_bits)?;
        let raw = b.read_take(len)?;
        Ok(Self::from_stripped(raw))
    }

    /// Wraps raw big-endian bytes, stripping leading zeros.
    ///
    /// `raw` is not length-prefixed.
    pub fn from_slice(raw: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(strip_leading_zeros(raw)))
    }

    fn from_stripped(raw: Bytes) -> Self {
        let stripped = strip_leading_zeros(&raw);
        Self(raw.slice_ref(stripped))
    }

    fn byte_len(len_bits: u16) -> Result<usize> {
        if len_bits > MAX_MPI_BITS {
            malformed_err!("mpi of {} bits exceeds limit of {}", len_bits, MAX_MPI_BITS);
        }
        Ok(usize::from(len_bits.div_ceil(8)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of significant bits.
    pub fn bit_size(&self) -> usize {
        bit_size(&self.0)
    }

    /// Writes the wire encoding: a two byte bit count followed by the value.
    pub fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        let bits = u16::try_from(self.bit_size())?;
        w.write_all(&bits.to_be_bytes())?;
        w.write_all(&self.0)?;
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + 2);
        // bit_size fits u16 for anything read through `from_buf`
        let bits = self.bit_size().min(usize::from(u16::MAX)) as u16;
        out.extend_from_slice(&bits.to_be_bytes());
        out.extend_from_slice(&self.0);
        out
    }

    /// Left pads the value with zeros to exactly `width` bytes.
    pub fn padded(&self, width: usize) -> Result<Vec<u8>> {
        left_pad(&self.0, width)
    }

    /// Left pads the value with zeros to a multiple of `align` bytes.
    pub fn aligned(&self, align: usize) -> Vec<u8> {
        align_to(&self.0, align)
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl AsRef<[u8]> for Mpi {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Mpi {
    fn from(raw: &[u8]) -> Self {
        Self::from_slice(raw)
    }
}

impl From<BigUint> for Mpi {
    fn from(n: BigUint) -> Self {
        Self::from_slice(&n.to_bytes_be())
    }
}

impl From<&BigUint> for Mpi {
    fn from(n: &BigUint) -> Self {
        Self::from_slice(&n.to_bytes_be())
    }
}

#[inline]
fn bit_size(val: &[u8]) -> usize {
    match val.first() {
        None => 0,
        Some(first) => val.len() * 8 - first.leading_zeros() as usize,
    }
}

#[inline]
pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    bytes
        .iter()
        .position(|b| *b != 0)
        .map_or(&[], |offset| &bytes[offset..])
}

/// Left pads `val` with zeros to `width` bytes, after stripping any leading zeros.
pub(crate) fn left_pad(val: &[u8], width: usize) -> Result<Vec<u8>> {
    let val = strip_leading_zeros(val);
    ensure!(
        val.len() <= width,
        "value of {} bytes does not fit into {} bytes",
        val.len(),
        width
    );
    let mut out = vec![0u8; width - val.len()];
    out.extend_from_slice(val);
    Ok(out)
}

/// Strips a sign byte and left pads to a multiple of `align` bytes.
pub(crate) fn align_to(val: &[u8], align: usize) -> Vec<u8> {
    let val = strip_leading_zeros(val);
    let width = val.len().div_ceil(align.max(1)) * align.max(1);
    let mut out = vec![0u8; width - val.len()];
    out.extend_from_slice(val);
    out
}
