use std::io::{self, BufRead};

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::parsing_reader::BufReadParsing;

/// The length of a packet body, as announced by its header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketLength {
    Fixed(u32),
    /// Runs until the end of the underlying source.
    Indeterminate,
    /// A partial body chunk. Never streamed, rejected when framing.
    Partial(u32),
}

impl PacketLength {
    /// Reads a new format length.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2.2>
    pub fn try_from_reader<R: BufRead>(mut r: R) -> io::Result<Self> {
        let first = r.read_u8()?;
        let len = match first {
            0..=191 => PacketLength::Fixed(first.into()),
            192..=223 => {
                let second = r.read_u8()?;
                PacketLength::Fixed(((u32::from(first) - 192) << 8) + u32::from(second) + 192)
            }
            224..=254 => PacketLength::Partial(1 << (first & 0x1F)),
            255 => PacketLength::Fixed(r.read_be_u32()?),
        };
        Ok(len)
    }

    /// Number of bytes the new format encoding of `len` needs.
    pub fn fixed_encoding_len(len: u32) -> usize {
        if len < 192 {
            1
        } else if len < 8384 {
            2
        } else {
            5
        }
    }

    /// Writes the new format encoding of a fixed length.
    pub fn write_fixed<W: io::Write>(len: u32, w: &mut W) -> io::Result<()> {
        if len < 192 {
            w.write_all(&[len as u8])
        } else if len < 8384 {
            let l = len - 192;
            w.write_all(&[((l >> 8) + 192) as u8, (l & 0xFF) as u8])
        } else {
            w.write_all(&[255])?;
            w.write_all(&len.to_be_bytes())
        }
    }

    pub fn maybe_len(&self) -> Option<u32> {
        match self {
            Self::Fixed(len) | Self::Partial(len) => Some(*len),
            Self::Indeterminate => None,
        }
    }
}

/// Packet tags.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.3>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum Tag {
    PublicKeyEncryptedSessionKey = 1,
    Signature = 2,
    SymKeyEncryptedSessionKey = 3,
    OnePassSignature = 4,
    SecretKey = 5,
    PublicKey = 6,
    SecretSubkey = 7,
    CompressedData = 8,
    SymEncryptedData = 9,
    Marker = 10,
    LiteralData = 11,
    Trust = 12,
    UserId = 13,
    PublicSubkey = 14,
    UserAttribute = 17,
    SymEncryptedProtectedData = 18,
    ModDetectionCode = 19,
    /// The OCB encrypted data packet, as emitted by GnuPG.
    ///
    /// Ref: <https://www.ietf.org/archive/id/draft-koch-librepgp-03.html#name-ocb-encrypted-data-packet-t>
    GnupgAead = 20,

    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "21u8..64"))] u8),
}

impl Tag {
    /// The new format header byte for this tag.
    pub fn encode(self) -> u8 {
        0b1100_0000 | u8::from(self)
    }

    /// Tags whose body is itself a packet stream, possibly encrypted or compressed.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Tag::CompressedData
                | Tag::SymEncryptedData
                | Tag::SymEncryptedProtectedData
                | Tag::GnupgAead
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn new_format_lengths() {
        assert_eq!(
            PacketLength::try_from_reader(&[100u8][..]).unwrap(),
            PacketLength::Fixed(100)
        );
        assert_eq!(
            PacketLength::try_from_reader(&[0xC5u8, 0xFB][..]).unwrap(),
            PacketLength::Fixed(1723)
        );
        assert_eq!(
            PacketLength::try_from_reader(&[0xFFu8, 0x00, 0x01, 0x86, 0xA0][..]).unwrap(),
            PacketLength::Fixed(100_000)
        );
        assert_eq!(
            PacketLength::try_from_reader(&[0xE1u8][..]).unwrap(),
            PacketLength::Partial(2)
        );
    }

    #[test]
    fn truncated_length() {
        let err = PacketLength::try_from_reader(&[0xFFu8, 0x00][..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    proptest! {
        #[test]
        fn fixed_length_roundtrip(len: u32) {
            let mut buf = Vec::new();
            PacketLength::write_fixed(len, &mut buf)?;
            prop_assert_eq!(buf.len(), PacketLength::fixed_encoding_len(len));
            prop_assert_eq!(PacketLength::try_from_reader(&buf[..])?, PacketLength::Fixed(len));
        }

        #[test]
        fn tag_roundtrip(tag: Tag) {
            prop_assert_eq!(Tag::from(tag.encode() & 0x3F), tag);
        }
    }
}
