use crate::errors::{bail, Result};

/// A key fingerprint.
///
/// The raw digest is kept without its format marker; [`Fingerprint::to_vec`]
/// produces the marked form (`04`/`05` for OpenPGP, `00 00 00` for SSH and
/// DER keys).
#[derive(Clone, Eq, PartialEq, Hash, derive_more::Debug)]
pub enum Fingerprint {
    #[debug("V4({})", hex::encode(_0))]
    V4([u8; 20]),
    #[debug("V5({})", hex::encode(_0))]
    V5([u8; 32]),
    /// SHA-256 over an SSH wire format key blob or a DER SubjectPublicKeyInfo.
    #[debug("Ssh({})", hex::encode(_0))]
    Ssh([u8; 32]),
}

pub(crate) const SSH_MARKER: [u8; 3] = [0, 0, 0];

impl Fingerprint {
    /// Parses a marked fingerprint, as produced by [`Fingerprint::to_vec`] or
    /// found in an issuer fingerprint subpacket.
    pub fn from_marked(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [4, rest @ ..] if rest.len() == 20 => Ok(Self::V4(rest.try_into()?)),
            [5, rest @ ..] if rest.len() == 32 => Ok(Self::V5(rest.try_into()?)),
            [0, 0, 0, rest @ ..] if rest.len() == 32 => Ok(Self::Ssh(rest.try_into()?)),
            _ => bail!("invalid fingerprint {}", hex::encode(bytes)),
        }
    }

    /// The digest without the format marker.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::V4(fp) => &fp[..],
            Self::V5(fp) | Self::Ssh(fp) => &fp[..],
        }
    }

    /// The fingerprint prefixed with its format marker.
    pub fn to_vec(&self) -> Vec<u8> {
        let marker: &[u8] = match self {
            Self::V4(_) => &[4],
            Self::V5(_) => &[5],
            Self::Ssh(_) => &SSH_MARKER,
        };
        let mut out = marker.to_vec();
        out.extend_from_slice(self.as_bytes());
        out
    }

    /// The OpenPGP key id: the low 64 bits for v4, the high 64 bits for v5.
    pub fn key_id(&self) -> KeyId {
        let fp = self.as_bytes();
        let mut id = [0u8; 8];
        match self {
            Self::V5(_) => id.copy_from_slice(&fp[..8]),
            Self::V4(_) | Self::Ssh(_) => id.copy_from_slice(&fp[fp.len() - 8..]),
        }
        KeyId(id)
    }

    /// Checks a possibly truncated fingerprint or key id against this one.
    ///
    /// `needle` may carry the format marker, and is compared against the tail
    /// of the digest. Values shorter than [`MIN_MATCH_LEN`] never match.
    pub fn matches(&self, needle: &[u8]) -> bool {
        if needle.len() < MIN_MATCH_LEN {
            return false;
        }
        let own = self.as_bytes();
        let marked = self.to_vec();

        if needle.len() <= marked.len() && marked.ends_with(needle) {
            return true;
        }

        // v5 key ids are the leading bytes of the fingerprint
        matches!(self, Self::V5(_)) && needle.len() == 8 && own.starts_with(needle)
    }
}

/// Shortest fingerprint suffix accepted by [`Fingerprint::matches`].
pub const MIN_MATCH_LEN: usize = 4;

/// An eight byte key id.
#[derive(Clone, Copy, Eq, PartialEq, Hash, derive_more::Debug)]
#[debug("KeyId({})", hex::encode(_0))]
pub struct KeyId([u8; 8]);

impl KeyId {
    pub const fn new(id: [u8; 8]) -> Self {
        Self(id)
    }

    pub fn from_slice(input: &[u8]) -> Result<Self> {
        Ok(Self(input.try_into()?))
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

impl AsRef<[u8]> for KeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 8]> for KeyId {
    fn from(id: [u8; 8]) -> Self {
        Self(id)
    }
}
