use std::io::BufRead;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::{errors::Result, parsing_reader::BufReadParsing};

#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',
    Mime = b'm',

    #[num_enum(catch_all)]
    Other(u8),
}

/// The header of a literal data packet. The data itself follows it.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.9>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct LiteralDataHeader {
    pub mode: DataMode,
    #[debug("{}", String::from_utf8_lossy(file_name))]
    pub file_name: Bytes,
    /// `None` when the sender left the date zeroed.
    pub created: Option<DateTime<Utc>>,
}

impl LiteralDataHeader {
    /// Reads the header, leaving `i` at the start of the data.
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let mode = DataMode::from(i.read_u8()?);
        let name_len = i.read_u8()?;
        let file_name = i.take_bytes(name_len.into())?.freeze();
        let created = match i.read_be_u32()? {
            0 => None,
            secs => Utc.timestamp_opt(i64::from(secs), 0).single(),
        };

        Ok(Self {
            mode,
            file_name,
            created,
        })
    }

    /// The file name, if one was given and it is valid UTF-8.
    pub fn file_name(&self) -> Option<String> {
        if self.file_name.is_empty() {
            return None;
        }
        std::str::from_utf8(&self.file_name).ok().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use hex_literal::hex;

    use super::*;

    #[test]
    fn header_then_data() {
        let raw = hex!("62 08 68656C6C6F2E7478 5FEE6600 4849");
        let mut cur = &raw[..];
        let header = LiteralDataHeader::try_from_reader(&mut cur).unwrap();
        assert_eq!(header.mode, DataMode::Binary);
        assert_eq!(header.file_name().as_deref(), Some("hello.tx"));
        assert_eq!(header.created.unwrap().timestamp(), 1_609_459_200);
        assert_eq!(cur, b"HI");
    }

    #[test]
    fn anonymous() {
        let raw = hex!("74 00 00000000");
        let header = LiteralDataHeader::try_from_reader(&raw[..]).unwrap();
        assert_eq!(header.mode, DataMode::Text);
        assert_eq!(header.file_name(), None);
        assert_eq!(header.created, None);
    }
}
