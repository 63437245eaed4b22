use std::io::BufRead;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::{
    crypto::{hash::HashAlgorithm, public_key::PublicKeyAlgorithm},
    errors::{format_err, unsupported_err, Result},
    parsing_reader::BufReadParsing,
    types::{Fingerprint, PublicParams, SecretParams, Tag},
};

#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum KeyVersion {
    V4 = 4,
    V5 = 5,

    #[num_enum(catch_all)]
    Other(u8),
}

/// A public or secret (sub)key packet.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.2>
#[derive(Clone, derive_more::Debug)]
pub struct KeyPacket {
    pub tag: Tag,
    pub version: KeyVersion,
    pub created: DateTime<Utc>,
    pub algorithm: PublicKeyAlgorithm,
    pub public_params: PublicParams,
    pub fingerprint: Fingerprint,
    /// The public part exactly as found in the packet.
    #[debug("{}", hex::encode(public_blob))]
    pub public_blob: Bytes,
    /// Present for secret key packets.
    pub secret_params: Option<SecretParams>,
}

impl KeyPacket {
    /// Parses the body of a key packet with the given tag.
    pub fn try_from_reader<B: BufRead>(tag: Tag, mut i: B) -> Result<Self> {
        let has_secret = matches!(tag, Tag::SecretKey | Tag::SecretSubkey);
        let body = i.rest()?.freeze();
        let mut cur = &body[..];

        let version = KeyVersion::from(cur.read_u8()?);
        if !matches!(version, KeyVersion::V4 | KeyVersion::V5) {
            unsupported_err!("key packet version {:?}", version);
        }
        let created = cur.read_be_u32()?;
        let algorithm = PublicKeyAlgorithm::from(cur.read_u8()?);

        let public_params = match version {
            KeyVersion::V5 => {
                let len = cur.read_be_u32()?;
                let material = cur.take_bytes(len.try_into()?)?;
                PublicParams::try_from_reader(algorithm, &material[..])?
            }
            _ if has_secret && !algorithm_has_known_layout(algorithm) => {
                unsupported_err!("secret key material for {:?}", algorithm)
            }
            _ => PublicParams::try_from_reader(algorithm, &mut cur)?,
        };

        let public_len = body.len() - cur.len();
        let public_blob = body.slice(..public_len);
        let fingerprint = fingerprint(version, &public_blob)?;

        let secret_params = if has_secret {
            let secret = match version {
                KeyVersion::V5 => {
                    debug!("v5 secret key material is not used");
                    SecretParams::Plain
                }
                _ => SecretParams::try_from_reader(&public_params, &mut cur)?,
            };
            Some(secret)
        } else {
            None
        };

        debug!(
            "key packet {:?} {:?} {}, fingerprint {:?}",
            tag,
            version,
            public_params.name(),
            fingerprint
        );

        Ok(Self {
            tag,
            version,
            created: Utc
                .timestamp_opt(i64::from(created), 0)
                .single()
                .ok_or_else(|| format_err!("invalid key creation time {}", created))?,
            algorithm,
            public_params,
            fingerprint,
            public_blob,
            secret_params,
        })
    }

    pub fn has_secret(&self) -> bool {
        self.secret_params.is_some()
    }

    pub fn is_subkey(&self) -> bool {
        matches!(self.tag, Tag::PublicSubkey | Tag::SecretSubkey)
    }
}

/// Without a known layout the public part can not be told apart from the
/// secret part that follows it.
fn algorithm_has_known_layout(alg: PublicKeyAlgorithm) -> bool {
    !matches!(alg, PublicKeyAlgorithm::Unknown(_))
}

/// Computes the fingerprint over the public part of a key packet.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-12.2>
pub(crate) fn fingerprint(version: KeyVersion, public_blob: &[u8]) -> Result<Fingerprint> {
    let mut prefixed = BytesMut::with_capacity(public_blob.len() + 5);
    match version {
        KeyVersion::V4 => {
            prefixed.put_u8(0x99);
            prefixed.put_u16(u16::try_from(public_blob.len())?);
            prefixed.put_slice(public_blob);
            let digest = HashAlgorithm::Sha1.digest(&prefixed)?;
            Ok(Fingerprint::V4(digest.as_slice().try_into()?))
        }
        KeyVersion::V5 => {
            prefixed.put_u8(0x9A);
            prefixed.put_u32(u32::try_from(public_blob.len())?);
            prefixed.put_slice(public_blob);
            let digest = HashAlgorithm::Sha256.digest(&prefixed)?;
            Ok(Fingerprint::V5(digest.as_slice().try_into()?))
        }
        KeyVersion::Other(v) => unsupported_err!("fingerprint of a v{} key", v),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::errors::Error;

    /// Body of a v4 Ed25519 public key packet.
    const ED25519_V4: &[u8] = &hex!(
        "04 5C5A4E83 16"
        "09 2B06010401DA470F01"
        "0107 40 3F098994BDD916ED4053197934E4A87C80733A1280D62F8010992E43EE3B2406"
    );

    #[test]
    fn v4_ed25519_fingerprint() {
        let key = KeyPacket::try_from_reader(Tag::PublicKey, ED25519_V4).unwrap();
        assert_eq!(key.version, KeyVersion::V4);
        assert_eq!(key.algorithm, PublicKeyAlgorithm::EdDSA);
        assert!(matches!(key.public_params, PublicParams::Ed25519 { .. }));
        assert_eq!(&key.public_blob[..], ED25519_V4);
        assert!(!key.has_secret());

        let mut prefixed = vec![0x99, 0, ED25519_V4.len() as u8];
        prefixed.extend_from_slice(ED25519_V4);
        let expected = HashAlgorithm::Sha1.digest(&prefixed).unwrap();
        assert_eq!(key.fingerprint.as_bytes(), &expected[..]);
    }

    #[test]
    fn v5_key_material_is_length_prefixed() {
        let mut raw = hex!("05 5C5A4E83 16 0000002D").to_vec();
        raw.extend_from_slice(&ED25519_V4[6..]);
        assert_eq!(raw.len(), 10 + 0x2D);

        let key = KeyPacket::try_from_reader(Tag::PublicSubkey, &raw[..]).unwrap();
        assert!(key.is_subkey());
        assert!(matches!(key.fingerprint, Fingerprint::V5(_)));

        let mut prefixed = vec![0x9A];
        prefixed.extend_from_slice(&(raw.len() as u32).to_be_bytes());
        prefixed.extend_from_slice(&raw);
        assert_eq!(
            key.fingerprint.as_bytes(),
            &HashAlgorithm::Sha256.digest(&prefixed).unwrap()[..]
        );
    }

    #[test]
    fn secret_key_sets_secret() {
        let mut raw = ED25519_V4.to_vec();
        // encrypted material is carried but not parsed
        raw.extend_from_slice(&hex!("FE 07 03 02 AABBCC"));
        let key = KeyPacket::try_from_reader(Tag::SecretKey, &raw[..]).unwrap();
        assert!(key.has_secret());
        assert_eq!(&key.public_blob[..], ED25519_V4);
        assert!(!key.secret_params.unwrap().is_usable());
    }

    #[test]
    fn other_versions_are_unsupported() {
        let raw = hex!("03 5C5A4E83 0000 01");
        assert!(matches!(
            KeyPacket::try_from_reader(Tag::PublicKey, &raw[..]),
            Err(Error::Unsupported { .. })
        ));
    }
}
