use std::io::BufRead;

use bytes::Bytes;

use crate::{errors::Result, parsing_reader::BufReadParsing};

/// User ID packet.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.11>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct UserId {
    #[debug("{}", String::from_utf8_lossy(id))]
    id: Bytes,
}

impl UserId {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        Ok(Self {
            id: i.rest()?.freeze(),
        })
    }

    /// The id as text, with invalid UTF-8 replaced.
    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    /// The mail address, taken from between `<` and `>`.
    pub fn mail(&self) -> Option<String> {
        mail_address(&self.as_str())
    }
}

/// Extracts `addr` from `Name <addr>`.
pub(crate) fn mail_address(id: &str) -> Option<String> {
    let start = id.find('<')?;
    let end = start + id[start..].find('>')?;
    let mail = id[start + 1..end].trim();
    (!mail.is_empty()).then(|| mail.to_string())
}
