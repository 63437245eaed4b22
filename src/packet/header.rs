use std::io::{self, BufRead};

use log::debug;

use crate::{
    errors::{malformed_err, unsupported_err, Result},
    parsing_reader::BufReadParsing,
    types::{PacketLength, Tag},
};

/// The outer wrapping a packet stream was found in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Regular binary OpenPGP packets.
    OpenPgp,
    /// A detached `SSHSIG` signature.
    SshSignature,
    /// A raw SSH wire format public key blob.
    SshPublicKey,
    /// A DER encoded structure, such as a SubjectPublicKeyInfo.
    Der,
}

/// Old (RFC 1991) or new style OpenPGP packet header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeaderFormat {
    Old,
    New,
}

/// Represents a packet header.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub envelope: Envelope,
    /// `None` for headers synthesized for non OpenPGP envelopes.
    pub format: Option<HeaderFormat>,
    pub tag: Tag,
    pub length: PacketLength,
}

impl PacketHeader {
    /// Parse a single OpenPGP packet header.
    pub fn try_from_reader<R: BufRead>(mut i: R) -> Result<Self> {
        let header = i.read_u8()?;

        if header & 0b1000_0000 == 0 {
            malformed_err!("invalid packet header byte {:#010b}", header);
        }

        let (format, tag, length) = if header & 0b0100_0000 != 0 {
            let tag = Tag::from(header & 0b0011_1111);
            let length = PacketLength::try_from_reader(&mut i)?;
            if let PacketLength::Partial(len) = length {
                unsupported_err!("partial body length {} for {:?}", len, tag);
            }
            (HeaderFormat::New, tag, length)
        } else {
            let tag = Tag::from((header >> 2) & 0b1111);
            let length = match header & 0b11 {
                // One-Octet Lengths
                0 => PacketLength::Fixed(i.read_u8()?.into()),
                // Two-Octet Lengths
                1 => PacketLength::Fixed(i.read_be_u16()?.into()),
                // Four-Octet Lengths
                2 => PacketLength::Fixed(i.read_be_u32()?),
                _ => PacketLength::Indeterminate,
            };
            (HeaderFormat::Old, tag, length)
        };

        debug!("packet header {:?} {:?} ({:?})", tag, length, format);

        Ok(Self {
            envelope: Envelope::OpenPgp,
            format: Some(format),
            tag,
            length,
        })
    }

    /// A header standing in for a whole non OpenPGP input.
    pub(crate) fn for_envelope(envelope: Envelope) -> Self {
        let tag = match envelope {
            Envelope::OpenPgp | Envelope::SshSignature => Tag::Signature,
            Envelope::SshPublicKey => Tag::PublicKey,
            // reserved
            Envelope::Der => Tag::Other(0),
        };
        Self {
            envelope,
            format: None,
            tag,
            length: PacketLength::Indeterminate,
        }
    }

    /// Writes the header in the given format.
    pub fn to_writer<W: io::Write>(&self, format: HeaderFormat, w: &mut W) -> Result<()> {
        let tag = u8::from(self.tag);
        match format {
            HeaderFormat::New => {
                let PacketLength::Fixed(len) = self.length else {
                    unsupported_err!("new format header with {:?}", self.length);
                };
                w.write_all(&[self.tag.encode()])?;
                PacketLength::write_fixed(len, w)?;
            }
            HeaderFormat::Old => {
                if tag > 0b1111 {
                    unsupported_err!("tag {:?} in an old format header", self.tag);
                }
                let header = 0b1000_0000 | (tag << 2);
                match self.length {
                    PacketLength::Fixed(len) if len < 256 => {
                        w.write_all(&[header, len as u8])?;
                    }
                    PacketLength::Fixed(len) if len < 65536 => {
                        w.write_all(&[header | 1])?;
                        w.write_all(&(len as u16).to_be_bytes())?;
                    }
                    PacketLength::Fixed(len) => {
                        w.write_all(&[header | 2])?;
                        w.write_all(&len.to_be_bytes())?;
                    }
                    PacketLength::Indeterminate => w.write_all(&[header | 3])?,
                    PacketLength::Partial(_) => {
                        unsupported_err!("partial lengths in an old format header")
                    }
                }
            }
        }
        Ok(())
    }
}
