use std::{collections::BTreeMap, hash::Hasher, io::Write};

use base64::engine::{general_purpose, Engine as _};
use crc24::Crc24Hasher;

use crate::{armor::BlockType, errors::Result};

/// Input bytes per armored line, giving 64 base64 columns.
const LINE_INPUT_LEN: usize = 48;

/// Writes `data` as an armored block.
///
/// SSH block types use the SSH framing and never carry headers or a
/// checksum.
pub fn write(
    data: &[u8],
    typ: BlockType,
    writer: &mut impl Write,
    headers: Option<&BTreeMap<String, String>>,
    include_checksum: bool,
) -> Result<()> {
    let dashes = if typ == BlockType::Ssh2PublicKey {
        "----"
    } else {
        "-----"
    };
    let space = if typ == BlockType::Ssh2PublicKey { " " } else { "" };

    // write armor header
    writeln!(writer, "{dashes}{space}BEGIN {typ}{space}{dashes}")?;

    if !typ.is_ssh() {
        if let Some(headers) = headers {
            for (key, value) in headers.iter() {
                writeln!(writer, "{key}: {value}")?;
            }
        }
        writer.write_all(b"\n")?;
    }

    // write body
    for chunk in data.chunks(LINE_INPUT_LEN) {
        writer.write_all(general_purpose::STANDARD.encode(chunk).as_bytes())?;
        writer.write_all(b"\n")?;
    }

    // write crc
    if include_checksum && !typ.is_ssh() {
        let mut crc_hasher = Crc24Hasher::new();
        crc_hasher.write(data);
        let crc = crc_hasher.finish() as u32;
        let crc_buf = [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8];

        writer.write_all(b"=")?;
        writer.write_all(general_purpose::STANDARD.encode(crc_buf).as_bytes())?;
        writer.write_all(b"\n")?;
    }

    // write footer
    writeln!(writer, "{dashes}{space}END {typ}{space}{dashes}")?;

    Ok(())
}
