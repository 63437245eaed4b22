//! Minimal BER/DER tag-length-value reader.
//!
//! Only definite lengths are supported, which covers everything found in
//! SubjectPublicKeyInfo and PKCS#1 public keys.

use std::io::{self, BufRead, Read};

use log::debug;

use crate::{
    errors::{malformed_err, unsupported_err, Error, Result},
    parsing_reader::BufReadParsing,
};

const CLASS_CONTEXT: u8 = 0x80;
const CONSTRUCTED: u8 = 0x20;
const EXTENDED_TAG: u8 = 0x1F;

/// Universal tag number of a SEQUENCE.
const SEQUENCE: u32 = 0x10;

/// The decoded type of a DER value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerType {
    Boolean,
    Integer,
    BitString,
    OctetString,
    Null,
    ObjectIdentifier,
    Utf8String,
    Sequence,
    Set,
    /// Context specific or private class, with its tag number.
    ContextSpecific(u32),
    /// Any other tag number.
    Other(u32),
}

impl DerType {
    fn from_tag(class_bits: u8, number: u32) -> Self {
        if class_bits & CLASS_CONTEXT != 0 {
            return Self::ContextSpecific(number);
        }
        if class_bits != 0 {
            // application class
            return Self::Other(number);
        }
        match number {
            0x01 => Self::Boolean,
            0x02 => Self::Integer,
            0x03 => Self::BitString,
            0x04 => Self::OctetString,
            0x05 => Self::Null,
            0x06 => Self::ObjectIdentifier,
            0x0C => Self::Utf8String,
            SEQUENCE => Self::Sequence,
            0x11 => Self::Set,
            n => Self::Other(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Idle,
    Streaming { remaining: usize },
}

/// Reads consecutive DER values from a source.
///
/// After [`DerReader::next_value`] the reader itself yields the value body,
/// and refuses to move on until that body was read to its end. Constructed
/// values are descended into by wrapping the reader in a new `DerReader`.
#[derive(Debug)]
pub struct DerReader<R: BufRead> {
    source: R,
    state: BodyState,
}

impl<R: BufRead> DerReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            state: BodyState::Idle,
        }
    }

    /// Checks whether `buf` could be the start of a DER encoded SEQUENCE.
    ///
    /// Only looks at the given bytes, so it is safe to run on a peeked copy.
    pub fn could_start_sequence(buf: &[u8]) -> bool {
        match buf {
            [tag, len, ..] if *tag == (CONSTRUCTED | SEQUENCE as u8) => {
                *len < 0x80 || (0x81..=0x84).contains(len)
            }
            _ => false,
        }
    }

    /// Bytes left in the current value body.
    pub fn remaining(&self) -> usize {
        match self.state {
            BodyState::Idle => 0,
            BodyState::Streaming { remaining } => remaining,
        }
    }

    /// Reads the next tag and length.
    ///
    /// Returns `None` at the end of the source. Fails with
    /// [`Error::Reentrancy`] if the previous value was not fully read.
    pub fn next_value(&mut self) -> Result<Option<DerType>> {
        if self.remaining() > 0 {
            return Err(Error::Reentrancy);
        }
        self.state = BodyState::Idle;

        if !self.source.has_remaining()? {
            return Ok(None);
        }

        let first = self.source.read_u8()?;
        let number = if first & EXTENDED_TAG == EXTENDED_TAG {
            self.read_extended_tag()?
        } else {
            u32::from(first & EXTENDED_TAG)
        };
        let typ = DerType::from_tag(first & 0xC0, number);

        let len = self.read_len()?;
        debug!("der value {:?}, {} bytes", typ, len);
        self.state = BodyState::Streaming { remaining: len };

        Ok(Some(typ))
    }

    /// Reads the current value body into memory.
    pub fn read_body(&mut self) -> Result<Vec<u8>> {
        let len = self.remaining();
        let body = self.take_bytes(len)?;
        Ok(body.to_vec())
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn read_extended_tag(&mut self) -> Result<u32> {
        let mut number: u32 = 0;
        loop {
            let b = self.source.read_u8()?;
            if number > (u32::MAX >> 7) {
                malformed_err!("der tag number too large");
            }
            number = (number << 7) | u32::from(b & 0x7F);
            if b & 0x80 == 0 {
                return Ok(number);
            }
        }
    }

    fn read_len(&mut self) -> Result<usize> {
        let first = self.source.read_u8()?;
        match first {
            0..=0x7F => Ok(first.into()),
            0x80 => unsupported_err!("indefinite der length"),
            0x81..=0x84 => {
                let mut len: usize = 0;
                for _ in 0..(first & 0x7F) {
                    len = (len << 8) | usize::from(self.source.read_u8()?);
                }
                Ok(len)
            }
            _ => malformed_err!("invalid der length {:#04x}", first),
        }
    }
}

impl<R: BufRead> BufRead for DerReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(&[][..]);
        }
        let buf = self.source.fill_buf()?;
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "der value truncated",
            ));
        }
        let len = buf.len().min(remaining);
        Ok(&buf[..len])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.remaining());
        self.source.consume(amt);
        if let BodyState::Streaming { ref mut remaining } = self.state {
            *remaining -= amt;
        }
    }
}

impl<R: BufRead> Read for DerReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use hex_literal::hex;

    use super::*;

    #[test]
    fn nested_values() {
        // SEQUENCE { INTEGER 5, [0] { NULL } }
        let raw = hex!("3007 020105 A0020500");
        let mut outer = DerReader::new(&raw[..]);
        assert_eq!(outer.next_value().unwrap(), Some(DerType::Sequence));
        assert_eq!(outer.remaining(), 7);

        {
            let mut inner = DerReader::new(&mut outer);
            assert_eq!(inner.next_value().unwrap(), Some(DerType::Integer));
            assert_eq!(inner.read_body().unwrap(), vec![5]);
            assert_eq!(inner.next_value().unwrap(), Some(DerType::ContextSpecific(0)));
            let mut ctx = DerReader::new(&mut inner);
            assert_eq!(ctx.next_value().unwrap(), Some(DerType::Null));
            assert_eq!(ctx.next_value().unwrap(), None);
            assert_eq!(inner.next_value().unwrap(), None);
        }

        assert_eq!(outer.next_value().unwrap(), None);
    }

    #[test]
    fn single_flight() {
        let raw = hex!("0402AABB 0500");
        let mut r = DerReader::new(&raw[..]);
        assert_eq!(r.next_value().unwrap(), Some(DerType::OctetString));
        let mut first = [0u8; 1];
        r.read_exact(&mut first).unwrap();
        assert!(matches!(r.next_value(), Err(Error::Reentrancy)));

        r.read_exact(&mut first).unwrap();
        assert_eq!(first, [0xBB]);
        assert_eq!(r.next_value().unwrap(), Some(DerType::Null));
    }

    #[test]
    fn long_form_length() {
        let mut raw = hex!("048200C8").to_vec();
        raw.extend_from_slice(&[7u8; 200]);
        let mut r = DerReader::new(&raw[..]);
        assert_eq!(r.next_value().unwrap(), Some(DerType::OctetString));
        assert_eq!(r.read_body().unwrap().len(), 200);
    }

    #[test]
    fn extended_tag() {
        // context specific, tag number 0x81 in base 128
        let raw = hex!("9F810100");
        let mut r = DerReader::new(&raw[..]);
        assert_eq!(r.next_value().unwrap(), Some(DerType::ContextSpecific(0x81)));
    }

    #[test]
    fn invalid_lengths() {
        assert!(matches!(
            DerReader::new(&hex!("3080")[..]).next_value(),
            Err(Error::Unsupported { .. })
        ));
        assert!(matches!(
            DerReader::new(&hex!("3085")[..]).next_value(),
            Err(Error::MalformedPacket { .. })
        ));

        let mut r = DerReader::new(&hex!("0405AABB")[..]);
        r.next_value().unwrap();
        match r.read_body() {
            Err(Error::IO { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sequence_predicate() {
        assert!(DerReader::<&[u8]>::could_start_sequence(&hex!("3082010A")));
        assert!(DerReader::<&[u8]>::could_start_sequence(&hex!("3007")));
        assert!(!DerReader::<&[u8]>::could_start_sequence(&hex!("3080")));
        assert!(!DerReader::<&[u8]>::could_start_sequence(&hex!("30")));
        assert!(!DerReader::<&[u8]>::could_start_sequence(b"SSHSIG"));
        assert!(!DerReader::<&[u8]>::could_start_sequence(&hex!("C22C04")));
    }
}
