use crate::errors::{Error, Result};

/// Two octet checksum: sum of all octets mod 65536.
#[inline]
pub fn calculate_simple(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |acc, v| acc.wrapping_add(u16::from(*v)))
}

/// Checks `data` against a big endian two octet checksum.
#[inline]
pub fn simple(actual: [u8; 2], data: &[u8]) -> Result<()> {
    let expected = calculate_simple(data);
    if u16::from_be_bytes(actual) != expected {
        return Err(Error::ChecksumMismatch {
            message: format!(
                "simple checksum {:04x} != {:04x}",
                u16::from_be_bytes(actual),
                expected
            ),
        });
    }

    Ok(())
}
