use std::io::{self, BufRead, Read};

use buffer_redux::BufReader;
use log::debug;

use crate::{
    der::DerReader,
    errors::{Error, Result},
    packet::{Envelope, PacketHeader},
    parsing_reader::BufReadParsing,
    types::{fingerprint::SSH_MARKER, PacketLength, Tag},
};

/// Bytes looked at to detect the envelope.
const PEEK_LEN: usize = 6;

const SSHSIG_MAGIC: &[u8; 6] = b"SSHSIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Idle,
    /// A body is being read. `None` runs until the end of the source.
    Streaming { remaining: Option<u64> },
    Done,
}

/// Splits a byte source into packets.
///
/// After [`PacketParser::next_header`] returned a header, the parser itself
/// reads the body of that packet, and stops at its end. The next header can
/// only be requested once the body was read completely.
///
/// The envelope is detected on the first call: SSH signatures, SSH key blobs
/// and DER structures are returned as a single packet spanning the whole
/// input.
#[derive(derive_more::Debug)]
pub struct PacketParser<R: BufRead> {
    #[debug(skip)]
    source: BufReader<R>,
    envelope: Option<Envelope>,
    state: BodyState,
}

/// A borrowed view on the packet currently being read.
#[derive(Debug)]
pub struct Packet<'a, R: BufRead> {
    header: PacketHeader,
    parser: &'a mut PacketParser<R>,
}

impl<R: BufRead> Packet<'_, R> {
    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn tag(&self) -> Tag {
        self.header.tag
    }
}

impl<R: BufRead> BufRead for Packet<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.parser.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.parser.consume(amt)
    }
}

impl<R: BufRead> Read for Packet<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.parser.read(buf)
    }
}

impl<R: BufRead> PacketParser<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: BufReader::new(source),
            envelope: None,
            state: BodyState::Idle,
        }
    }

    /// The detected envelope, once the first header was read.
    pub fn envelope(&self) -> Option<Envelope> {
        self.envelope
    }

    /// The underlying source. Reading from it directly skips the buffer.
    pub fn get_mut(&mut self) -> &mut R {
        self.source.get_mut()
    }

    /// Bytes left in the current body, `None` if it runs to the end of the source.
    pub fn remaining(&self) -> Option<u64> {
        match self.state {
            BodyState::Streaming { remaining } => remaining,
            BodyState::Idle | BodyState::Done => Some(0),
        }
    }

    /// Reads the next packet header.
    ///
    /// Returns `None` once the source is exhausted. Fails with
    /// [`Error::Reentrancy`] if the previous body was not read to its end.
    pub fn next_header(&mut self) -> Result<Option<PacketHeader>> {
        let envelope = match self.envelope {
            Some(envelope) => envelope,
            None => {
                let envelope = self.detect_envelope()?;
                self.envelope = Some(envelope);
                if envelope != Envelope::OpenPgp {
                    self.state = BodyState::Streaming { remaining: None };
                    return Ok(Some(PacketHeader::for_envelope(envelope)));
                }
                envelope
            }
        };

        match self.state {
            BodyState::Done => return Ok(None),
            BodyState::Idle => {}
            BodyState::Streaming { remaining: Some(0) } => {}
            BodyState::Streaming { .. } if envelope != Envelope::OpenPgp => {
                let skipped = self.source.drain()?;
                debug!("drained {} bytes after {:?}", skipped, envelope);
                self.state = BodyState::Done;
                return Ok(None);
            }
            BodyState::Streaming { remaining: Some(_) } => return Err(Error::Reentrancy),
            BodyState::Streaming { remaining: None } => {
                if self.source.has_remaining()? {
                    return Err(Error::Reentrancy);
                }
            }
        }

        if !self.source.has_remaining()? {
            self.state = BodyState::Done;
            return Ok(None);
        }

        let header = PacketHeader::try_from_reader(&mut self.source)?;
        let remaining = match header.length {
            PacketLength::Fixed(len) => Some(u64::from(len)),
            _ => None,
        };
        self.state = BodyState::Streaming { remaining };

        Ok(Some(header))
    }

    /// Reads the next header and returns a view on its packet.
    pub fn next_packet(&mut self) -> Result<Option<Packet<'_, R>>> {
        match self.next_header()? {
            Some(header) => Ok(Some(Packet {
                header,
                parser: self,
            })),
            None => Ok(None),
        }
    }

    fn detect_envelope(&mut self) -> Result<Envelope> {
        while self.source.buf_len() < PEEK_LEN {
            if self.source.read_into_buf()? == 0 {
                break;
            }
        }

        let peek = self.source.buffer();
        let envelope = if peek.starts_with(SSHSIG_MAGIC) {
            Envelope::SshSignature
        } else if peek.starts_with(&SSH_MARKER) {
            Envelope::SshPublicKey
        } else if DerReader::<&[u8]>::could_start_sequence(peek) {
            Envelope::Der
        } else {
            Envelope::OpenPgp
        };

        debug!("detected {:?} envelope", envelope);
        Ok(envelope)
    }
}

impl<R: BufRead> BufRead for PacketParser<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let remaining = match self.state {
            BodyState::Idle | BodyState::Done | BodyState::Streaming { remaining: Some(0) } => {
                return Ok(&[][..]);
            }
            BodyState::Streaming { remaining } => remaining,
        };

        let buf = self.source.fill_buf()?;
        match remaining {
            None => Ok(buf),
            Some(_) if buf.is_empty() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "packet body truncated",
            )),
            Some(remaining) => {
                let len = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
                Ok(&buf[..len])
            }
        }
    }

    fn consume(&mut self, amt: usize) {
        if let BodyState::Streaming { remaining } = &mut self.state {
            let amt = match remaining {
                Some(remaining) => {
                    let amt = (amt as u64).min(*remaining);
                    *remaining -= amt;
                    amt as usize
                }
                None => amt,
            };
            self.source.consume(amt);
        }
    }
}

impl<R: BufRead> Read for PacketParser<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}
