//! # Armor module
//!
//! ASCII Armor as specified in RFC 4880, plus the framing SSH uses for
//! signatures and RFC 4716 public keys.

use std::{fmt, io::BufRead};

use buffer_redux::BufReader;

mod reader;
mod writer;

pub use self::reader::*;
pub use self::writer::*;

/// Longest line accepted by the armor reader, in bytes.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Length of the `-----BEGIN ` prefix.
const BEGIN_LEN: usize = 11;

/// Checks whether `buf` starts with a BEGIN line, in either the armor or the
/// SSH framing. Leading whitespace is skipped.
pub fn is_armored(buf: &[u8]) -> bool {
    let buf = buf.trim_ascii_start();
    buf.starts_with(b"-----BEGIN ") || buf.starts_with(b"---- BEGIN ")
}

/// Buffers the start of `source` and checks it with [`is_armored`].
///
/// A single `fill_buf` may return fewer bytes than a BEGIN line, so this
/// keeps reading until enough non-whitespace bytes are buffered or the
/// source ends. Nothing is consumed.
pub fn detect<R: BufRead>(source: R) -> std::io::Result<(bool, BufReader<R>)> {
    let mut reader = BufReader::new(source);
    while reader.buffer().trim_ascii_start().len() < BEGIN_LEN {
        if reader.read_into_buf()? == 0 {
            break;
        }
    }

    let armored = is_armored(reader.buffer());
    Ok((armored, reader))
}

/// Armor block types.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum BlockType {
    /// PGP public key
    PublicKey,
    /// PGP private key
    PrivateKey,
    Message,
    Signature,
    // gnupgp extension
    File,
    /// PEM encoded PKCS#1 public key
    PublicKeyPKCS1(PKCS1Type),
    /// PEM encoded SubjectPublicKeyInfo
    PublicKeyPKCS8,
    /// `SSHSIG` detached signature
    SshSignature,
    /// RFC 4716 public key
    Ssh2PublicKey,
}

impl BlockType {
    /// Looks up the block type for an armor label.
    pub fn from_label(label: &str) -> Option<Self> {
        let typ = match label {
            "PGP PUBLIC KEY BLOCK" => Self::PublicKey,
            "PGP PRIVATE KEY BLOCK" => Self::PrivateKey,
            "PGP MESSAGE" => Self::Message,
            "PGP SIGNATURE" => Self::Signature,
            "PGP ARMORED FILE" => Self::File,
            "RSA PUBLIC KEY" => Self::PublicKeyPKCS1(PKCS1Type::RSA),
            "DSA PUBLIC KEY" => Self::PublicKeyPKCS1(PKCS1Type::DSA),
            "EC PUBLIC KEY" => Self::PublicKeyPKCS1(PKCS1Type::EC),
            "PUBLIC KEY" => Self::PublicKeyPKCS8,
            "SSH SIGNATURE" => Self::SshSignature,
            "SSH2 PUBLIC KEY" => Self::Ssh2PublicKey,
            _ => return None,
        };
        Some(typ)
    }

    /// SSH framing has no armor headers and no checksum.
    pub fn is_ssh(self) -> bool {
        matches!(self, Self::SshSignature | Self::Ssh2PublicKey)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::PublicKey => f.write_str("PGP PUBLIC KEY BLOCK"),
            BlockType::PrivateKey => f.write_str("PGP PRIVATE KEY BLOCK"),
            BlockType::Message => f.write_str("PGP MESSAGE"),
            BlockType::Signature => f.write_str("PGP SIGNATURE"),
            BlockType::File => f.write_str("PGP ARMORED FILE"),
            BlockType::PublicKeyPKCS1(typ) => write!(f, "{typ} PUBLIC KEY"),
            BlockType::PublicKeyPKCS8 => f.write_str("PUBLIC KEY"),
            BlockType::SshSignature => f.write_str("SSH SIGNATURE"),
            BlockType::Ssh2PublicKey => f.write_str("SSH2 PUBLIC KEY"),
        }
    }
}

/// OpenSSL PKCS#1 PEM armor types
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PKCS1Type {
    RSA,
    DSA,
    EC,
}

impl fmt::Display for PKCS1Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PKCS1Type::RSA => write!(f, "RSA"),
            PKCS1Type::DSA => write!(f, "DSA"),
            PKCS1Type::EC => write!(f, "EC"),
        }
    }
}

/// How to treat the CRC24 line of an armored block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// A missing checksum is an error.
    Required,
    /// Only verified when present.
    #[default]
    Optional,
}

/// Options for [`Dearmor`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    pub checksum: ChecksumPolicy,
}

impl ParserOptions {
    pub fn with_checksum(mut self, checksum: ChecksumPolicy) -> Self {
        self.checksum = checksum;
        self
    }
}
