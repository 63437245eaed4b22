use std::{
    collections::BTreeMap,
    hash::Hasher,
    io::{self, BufRead, Read},
    str,
};

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig},
        DecodePaddingMode, Engine as _,
    },
};
use bytes::{Buf, BytesMut};
use crc24::Crc24Hasher;
use log::debug;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_until1, take_while_m_n},
    character::complete::space0,
    combinator::{eof, map_res, rest, value},
    sequence::{delimited, separated_pair, terminated},
    IResult, Parser,
};

use super::{BlockType, ChecksumPolicy, ParserOptions, MAX_LINE_LEN};
use crate::errors::{bail, malformed_err, Error, Result};

/// Armor Headers.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Base64 as found in the wild: padding is optional.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Begin,
    End,
}

fn armor_dashes(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while_m_n(4, 5, |c| c == b'-').parse(i)
}

/// Parses `-----BEGIN X-----` and the RFC 4716 `---- BEGIN X ----` lines.
fn armor_marker(i: &[u8]) -> IResult<&[u8], (Marker, &str)> {
    let (i, _) = terminated(armor_dashes, space0).parse(i)?;
    let (i, marker) = alt((
        value(Marker::Begin, tag("BEGIN ")),
        value(Marker::End, tag("END ")),
    ))
    .parse(i)?;
    let (i, label) = map_res(take_until("----"), str::from_utf8).parse(i)?;
    let (i, _) = delimited(space0, armor_dashes, space0).parse(i)?;
    let (i, _) = eof(i)?;

    Ok((i, (marker, label.trim_end())))
}

/// Parses a single `key: value` header line.
fn key_value_pair(i: &[u8]) -> IResult<&[u8], (&str, &str)> {
    let (i, (key, value)) = separated_pair(
        map_res(take_until1(":"), str::from_utf8),
        tag(":"),
        map_res(rest, str::from_utf8),
    )
    .parse(i)?;

    Ok((i, (key.trim(), value.trim())))
}

/// Reads one line without its line ending and trailing whitespace.
///
/// Returns `false` at the end of the source.
fn read_line<R: BufRead>(source: &mut R, line: &mut Vec<u8>) -> Result<bool> {
    line.clear();
    let mut seen_any = false;

    loop {
        let buf = source.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        seen_any = true;

        let (chunk, done) = match buf.iter().position(|b| *b == b'\n') {
            Some(pos) => (&buf[..pos], Some(pos + 1)),
            None => (buf, None),
        };
        if line.len() + chunk.len() > MAX_LINE_LEN {
            malformed_err!("armor line exceeds {} bytes", MAX_LINE_LEN);
        }
        line.extend_from_slice(chunk);

        match done {
            Some(consumed) => {
                source.consume(consumed);
                break;
            }
            None => {
                let len = chunk.len();
                source.consume(len);
            }
        }
    }

    while line.last().is_some_and(|b| b.is_ascii_whitespace()) {
        line.pop();
    }

    Ok(seen_any)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Looking for the BEGIN line.
    Init,
    Headers,
    Body,
    /// The body ended with this checksum line.
    Crc(Vec<u8>),
    /// Expecting the END line, possibly already read.
    Trailer(Option<Vec<u8>>),
    Eof,
    Error,
}

/// Streaming based ascii armor parsing.
///
/// Yields the decoded body through [`Read`] and [`BufRead`]. Type and headers
/// are available once the body started, or after [`Dearmor::read_header`].
#[derive(derive_more::Debug)]
pub struct Dearmor<R: BufRead> {
    /// The ascii armor parsed block type.
    pub typ: Option<BlockType>,
    /// The headers found in the armored file.
    pub headers: Headers,
    /// Crc checksum from the armor footer, if there was one.
    pub checksum: Option<u32>,
    source: R,
    state: State,
    options: ParserOptions,
    #[debug("Crc24Hasher")]
    crc: Crc24Hasher,
    #[debug("{}", hex::encode(buffer))]
    buffer: BytesMut,
    /// Base64 characters not yet forming a full quantum.
    carry: Vec<u8>,
    line: Vec<u8>,
    seen_body: bool,
    /// Set while skipping a continued RFC 4716 header.
    continued_header: bool,
}

impl<R: BufRead> Dearmor<R> {
    pub fn new(input: R) -> Self {
        Self::with_options(input, ParserOptions::default())
    }

    pub fn with_options(input: R, options: ParserOptions) -> Self {
        Dearmor {
            typ: None,
            headers: BTreeMap::new(),
            checksum: None,
            source: input,
            state: State::Init,
            options,
            crc: Crc24Hasher::new(),
            buffer: BytesMut::new(),
            carry: Vec::new(),
            line: Vec::new(),
            seen_body: false,
            continued_header: false,
        }
    }

    /// Reads up to the start of the body and returns the block type.
    pub fn read_header(&mut self) -> Result<BlockType> {
        while matches!(self.state, State::Init | State::Headers) {
            self.step()?;
        }
        match self.typ {
            Some(typ) => Ok(typ),
            None => Err(Error::InvalidArmorWrappers),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Eof
    }

    /// Returns the source, positioned after the END line once done.
    pub fn into_inner(self) -> R {
        self.source
    }

    fn step(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Error) {
            State::Init => loop {
                if !read_line(&mut self.source, &mut self.line)? {
                    debug!("no armor block found");
                    return Err(Error::InvalidArmorWrappers);
                }
                if let Ok((_, (Marker::Begin, label))) = armor_marker(&self.line) {
                    let Some(typ) = BlockType::from_label(label) else {
                        malformed_err!("unknown armor type {:?}", label);
                    };
                    debug!("armor block {}", typ);
                    self.typ = Some(typ);
                    self.state = if label.starts_with("SSH") {
                        State::Body
                    } else {
                        State::Headers
                    };
                    return Ok(());
                }
            },
            State::Headers => {
                if !read_line(&mut self.source, &mut self.line)? {
                    return Err(Error::InvalidArmorWrappers);
                }
                if self.line.is_empty() {
                    self.state = State::Body;
                    return Ok(());
                }
                if let Ok((_, (key, value))) = key_value_pair(&self.line) {
                    self.headers
                        .entry(key.to_string())
                        .or_default()
                        .push(value.to_string());
                    self.state = State::Headers;
                    return Ok(());
                }

                // body without a separating blank line
                let line = std::mem::take(&mut self.line);
                self.body_line(line)
            }
            State::Body => {
                if !read_line(&mut self.source, &mut self.line)? {
                    debug!("armor body without END line");
                    return Err(Error::InvalidArmorWrappers);
                }
                let line = std::mem::take(&mut self.line);
                self.body_line(line)
            }
            State::Crc(line) => {
                let raw = ENGINE.decode(&line[1..])?;
                let expected = match raw.as_slice() {
                    [a, b, c] => u32::from_be_bytes([0, *a, *b, *c]),
                    _ => malformed_err!("invalid armor checksum of {} bytes", raw.len()),
                };
                self.checksum = Some(expected);

                let actual = self.crc.finish() as u32;
                if actual != expected {
                    return Err(Error::ChecksumMismatch {
                        message: format!("crc24 {actual:06x} != {expected:06x}"),
                    });
                }
                self.state = State::Trailer(None);
                Ok(())
            }
            State::Trailer(line) => {
                let line = match line {
                    Some(line) => line,
                    None => loop {
                        if !read_line(&mut self.source, &mut self.line)? {
                            return Err(Error::InvalidArmorWrappers);
                        }
                        if !self.line.is_empty() {
                            break std::mem::take(&mut self.line);
                        }
                    },
                };

                match armor_marker(&line) {
                    Ok((_, (Marker::End, label))) if BlockType::from_label(label) == self.typ => {}
                    _ => return Err(Error::InvalidArmorWrappers),
                }

                let is_ssh = self.typ.is_some_and(BlockType::is_ssh);
                if self.checksum.is_none()
                    && !is_ssh
                    && self.options.checksum == ChecksumPolicy::Required
                {
                    return Err(Error::ChecksumMismatch {
                        message: "missing crc24".to_string(),
                    });
                }

                debug!("armor block done");
                self.state = State::Eof;
                Ok(())
            }
            State::Eof => {
                self.state = State::Eof;
                Ok(())
            }
            State::Error => bail!("Dearmor errored"),
        }
    }

    fn body_line(&mut self, line: Vec<u8>) -> Result<()> {
        self.state = State::Body;

        if self.continued_header {
            self.continued_header = line.ends_with(b"\\");
            return Ok(());
        }
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with(b"=") {
            self.finish_body()?;
            self.state = State::Crc(line);
            return Ok(());
        }
        if line.starts_with(b"-") {
            self.finish_body()?;
            self.state = State::Trailer(Some(line));
            return Ok(());
        }
        if !self.seen_body {
            // RFC 4716 headers, base64 has no colons
            if let Ok((_, (key, value))) = key_value_pair(&line) {
                self.headers
                    .entry(key.to_string())
                    .or_default()
                    .push(value.trim_end_matches('\\').to_string());
                self.continued_header = line.ends_with(b"\\");
                return Ok(());
            }
        }

        self.seen_body = true;
        self.carry
            .extend(line.iter().filter(|b| !b.is_ascii_whitespace()));
        let full = self.carry.len() / 4 * 4;
        if full > 0 {
            self.decode(full)?;
        }

        Ok(())
    }

    fn decode(&mut self, len: usize) -> Result<()> {
        let decoded = ENGINE.decode(&self.carry[..len])?;
        self.carry.drain(..len);
        self.crc.write(&decoded);
        self.buffer.extend_from_slice(&decoded);
        Ok(())
    }

    fn finish_body(&mut self) -> Result<()> {
        if !self.carry.is_empty() {
            self.decode(self.carry.len())?;
        }
        Ok(())
    }
}

impl<R: BufRead> BufRead for Dearmor<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.buffer.is_empty() {
            match self.state {
                State::Eof => break,
                State::Error => return Err(io::Error::other("Dearmor errored")),
                _ => self.step()?,
            }
        }
        Ok(&self.buffer[..])
    }

    fn consume(&mut self, amt: usize) {
        self.buffer.advance(amt);
    }
}

impl<R: BufRead> Read for Dearmor<R> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        let buf = self.fill_buf()?;
        let len = buf.len().min(into.len());
        into[..len].copy_from_slice(&buf[..len]);
        self.consume(len);
        Ok(len)
    }
}
