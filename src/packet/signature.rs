use std::io::BufRead;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use digest::DynDigest;
use log::{debug, warn};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::{
    crypto::{hash::HashAlgorithm, public_key::PublicKeyAlgorithm},
    errors::{ensure_eq, malformed_err, unsupported_err, Result},
    packet::SshSignatureInfo,
    parsing::BufParsing,
    parsing_reader::BufReadParsing,
    types::{mpi, Fingerprint, KeyId, Mpi},
};

/// Length of the v5 signature salt.
const SALT_LEN: usize = 16;

/// Length of the hashed part of a v3 signature.
const V3_HASHED_LEN: u8 = 5;

#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SignatureVersion {
    V3 = 3,
    V4 = 4,
    V5 = 5,
    /// A detached `SSHSIG` signature, which has no OpenPGP version.
    Ssh = 0x53,

    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "6u8..0x50"))] u8),
}

/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.1>
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document, hashed with `<CR><LF>` line endings.
    Text = 0x01,
    /// Signature over its own subpackets only.
    Standalone = 0x02,
    CertGeneric = 0x10,
    CertPersona = 0x11,
    CertCasual = 0x12,
    CertPositive = 0x13,
    SubkeyBinding = 0x18,
    KeyBinding = 0x19,
    Key = 0x1F,
    KeyRevocation = 0x20,
    SubkeyRevocation = 0x28,
    CertRevocation = 0x30,
    Timestamp = 0x40,
    ThirdParty = 0x50,

    #[num_enum(catch_all)]
    Other(u8),
}

/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3.1>
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
enum SubpacketType {
    SignatureCreationTime = 2,
    Issuer = 16,
    IssuerFingerprint = 33,

    #[num_enum(catch_all)]
    Other(u8),
}

/// Collects the bytes a signature covers after the signed data itself.
#[derive(Default, derive_more::Debug)]
pub struct SignedBlobBuilder {
    #[debug("{}", hex::encode(buf))]
    buf: BytesMut,
}

impl SignedBlobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    pub fn push_u8(&mut self, b: u8) -> &mut Self {
        self.buf.put_u8(b);
        self
    }

    /// Pushes an SSH wire format `string`.
    pub fn push_ssh_string(&mut self, data: &[u8]) -> Result<&mut Self> {
        self.buf.put_u32(u32::try_from(data.len())?);
        self.buf.put_slice(data);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends the OpenPGP trailer, `version || 0xFF || length`, and freezes the blob.
    ///
    /// The length counts everything pushed so far, as a u32 for v4 and a u64
    /// for v5 signatures.
    pub fn finish_with_trailer(mut self, version: SignatureVersion) -> Result<Bytes> {
        let len = self.buf.len();
        match version {
            SignatureVersion::V4 => {
                self.buf.put_slice(&[4, 0xFF]);
                self.buf.put_u32(u32::try_from(len)?);
            }
            SignatureVersion::V5 => {
                self.buf.put_slice(&[5, 0xFF]);
                self.buf.put_u64(u64::try_from(len)?);
            }
            _ => unsupported_err!("signature trailer for {:?}", version),
        }
        Ok(self.buf.freeze())
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// A parsed signature, OpenPGP or SSH.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SignatureRecord {
    pub version: SignatureVersion,
    pub typ: SignatureType,
    pub pub_alg: PublicKeyAlgorithm,
    /// The hash over the signed data. For SSH signatures the hash of the message.
    pub hash_alg: HashAlgorithm,
    pub created: Option<DateTime<Utc>>,
    pub issuer: Option<KeyId>,
    pub issuer_fingerprint: Option<Fingerprint>,
    /// The bytes hashed after the signed data.
    #[debug("{}", hex::encode(signed_blob))]
    pub signed_blob: Bytes,
    #[debug("{}", hex::encode(hash_prefix))]
    pub hash_prefix: [u8; 2],
    #[debug("{:?}", salt.map(hex::encode))]
    pub salt: Option<[u8; SALT_LEN]>,
    #[debug("{:?}", values.iter().map(hex::encode).collect::<Vec<_>>())]
    pub values: Vec<Bytes>,
    pub ssh: Option<SshSignatureInfo>,
}

impl SignatureRecord {
    /// Parses the body of an OpenPGP signature packet.
    ///
    /// Consumes `i` to its end.
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = SignatureVersion::from(i.read_u8()?);
        let mut sig = match version {
            SignatureVersion::V3 => Self::read_v3_header(&mut i)?,
            SignatureVersion::V4 | SignatureVersion::V5 => Self::read_v4_header(version, &mut i)?,
            _ => unsupported_err!("signature version {:?}", version),
        };

        let mut values = Vec::new();
        while i.has_remaining()? {
            let mpi = Mpi::try_from_reader(&mut i)?;
            if mpi.is_empty() {
                break;
            }
            values.push(mpi);
        }
        let skipped = i.drain()?;
        if skipped > 0 {
            debug!("ignoring {} bytes after the signature values", skipped);
        }

        sig.values = pack_values(sig.pub_alg, values)?;
        debug!("parsed signature {:?}", sig);

        Ok(sig)
    }

    fn read_v3_header<B: BufRead>(i: &mut B) -> Result<Self> {
        ensure_eq!(i.read_u8()?, V3_HASHED_LEN, "v3 hashed length");
        let hashed: [u8; 5] = i.read_array()?;
        let typ = SignatureType::from(hashed[0]);
        let created = u32::from_be_bytes([hashed[1], hashed[2], hashed[3], hashed[4]]);
        let issuer = KeyId::new(i.read_array()?);
        let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
        let hash_alg = HashAlgorithm::from(i.read_u8()?);
        let hash_prefix = i.read_array()?;

        Ok(Self {
            version: SignatureVersion::V3,
            typ,
            pub_alg,
            hash_alg,
            created: timestamp(created),
            issuer: Some(issuer),
            issuer_fingerprint: None,
            signed_blob: Bytes::copy_from_slice(&hashed),
            hash_prefix,
            salt: None,
            values: Vec::new(),
            ssh: None,
        })
    }

    fn read_v4_header<B: BufRead>(version: SignatureVersion, i: &mut B) -> Result<Self> {
        let header: [u8; 3] = i.read_array()?;
        let typ = SignatureType::from(header[0]);
        let pub_alg = PublicKeyAlgorithm::from(header[1]);
        let hash_alg = HashAlgorithm::from(header[2]);

        let hashed_len = i.read_be_u16()?;
        let hashed = i.take_bytes(hashed_len.into())?.freeze();

        let mut blob = SignedBlobBuilder::new();
        blob.push_u8(version.into())
            .push(&header)
            .push(&hashed_len.to_be_bytes())
            .push(&hashed);

        let mut sig = Self {
            version,
            typ,
            pub_alg,
            hash_alg,
            created: None,
            issuer: None,
            issuer_fingerprint: None,
            signed_blob: Bytes::new(),
            hash_prefix: [0; 2],
            salt: None,
            values: Vec::new(),
            ssh: None,
        };
        sig.read_subpackets(hashed, true)?;

        let unhashed_len = i.read_be_u16()?;
        let unhashed = i.take_bytes(unhashed_len.into())?.freeze();
        sig.read_subpackets(unhashed, false)?;

        sig.hash_prefix = i.read_array()?;
        if version == SignatureVersion::V5 {
            sig.salt = Some(i.read_array()?);
        }
        sig.signed_blob = blob.finish_with_trailer(version)?;

        Ok(sig)
    }

    /// Walks a subpacket area, picking up the fields we care about.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3.1>
    fn read_subpackets(&mut self, mut area: Bytes, hashed: bool) -> Result<()> {
        while !area.is_empty() {
            let len = match area.read_u8()? {
                first @ 0..=191 => usize::from(first),
                first @ 192..=254 => {
                    let second = area.read_u8()?;
                    ((usize::from(first) - 192) << 8) + usize::from(second) + 192
                }
                255 => area.read_be_u32()?.try_into()?,
            };
            if len == 0 {
                malformed_err!("empty subpacket");
            }
            let mut body = area.read_take(len)?;
            // the top bit flags critical subpackets
            let typ = SubpacketType::from(body.read_u8()? & 0x7F);

            match typ {
                SubpacketType::SignatureCreationTime if hashed => {
                    self.created = timestamp(body.read_be_u32()?);
                }
                SubpacketType::Issuer => {
                    self.issuer = Some(KeyId::new(body.read_array()?));
                }
                SubpacketType::IssuerFingerprint => match Fingerprint::from_marked(&body) {
                    Ok(fp) => self.issuer_fingerprint = Some(fp),
                    Err(err) => warn!("ignoring issuer fingerprint: {}", err),
                },
                typ => debug!("skipping subpacket {:?} (hashed: {})", typ, hashed),
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        self.typ == SignatureType::Text
    }

    /// The value to look up the signing key by: the issuer fingerprint if
    /// present, else the issuer key id.
    pub fn issuer_needle(&self) -> Option<Vec<u8>> {
        match (&self.issuer_fingerprint, &self.issuer) {
            (Some(fp), _) => Some(fp.to_vec()),
            (None, Some(id)) if !id.is_wildcard() => Some(id.as_ref().to_vec()),
            _ => None,
        }
    }

    /// Starts the digest over the signed data, preloaded with the salt, if any.
    pub fn new_hasher(&self) -> Result<Box<dyn DynDigest + Send>> {
        let mut hasher = self.hash_alg.new_hasher()?;
        if let Some(salt) = &self.salt {
            hasher.update(salt);
        }
        Ok(hasher)
    }

    /// Completes a digest started with [`SignatureRecord::new_hasher`], once
    /// all signed data went in.
    pub fn finish_hasher(&self, mut hasher: Box<dyn DynDigest + Send>) -> Vec<u8> {
        hasher.update(&self.signed_blob);
        hasher.finalize().to_vec()
    }

    /// Checks the leading 16 bits of `digest` against the hash prefix.
    pub fn matches_prefix(&self, digest: &[u8]) -> bool {
        digest.len() >= 2 && digest[..2] == self.hash_prefix
    }
}

fn timestamp(secs: u32) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(i64::from(secs), 0).single()
}

/// Brings the signature values into the shape verification expects.
fn pack_values(pub_alg: PublicKeyAlgorithm, values: Vec<Mpi>) -> Result<Vec<Bytes>> {
    let packed = match (pub_alg, &values[..]) {
        (PublicKeyAlgorithm::EdDSA, [r, s]) if r.len() <= 32 && s.len() <= 32 => {
            let mut rs = mpi::left_pad(r.as_bytes(), 32)?;
            rs.extend_from_slice(&mpi::left_pad(s.as_bytes(), 32)?);
            vec![rs.into()]
        }
        (PublicKeyAlgorithm::DSA, [r, s]) => {
            let width = r.aligned(4).len().max(s.aligned(4).len());
            let mut rs = r.padded(width)?;
            rs.extend_from_slice(&s.padded(width)?);
            vec![rs.into()]
        }
        _ => values
            .into_iter()
            .map(|v| Bytes::copy_from_slice(v.as_bytes()))
            .collect(),
    };
    Ok(packed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::errors::Error;

    /// v4 binary signature by an RSA key, SHA-256, created 2021-01-01,
    /// issuer fingerprint in the hashed area and issuer key id in the
    /// unhashed area.
    const V4_RSA: &[u8] = &hex!(
        "04 00 01 08"
        "001D"
        "05 02 5FEE6600"
        "16 21 04 0102030405060708090A0B0C0D0E0F1011121314"
        "000A"
        "09 10 0D0E0F1011121314"
        "ABCD"
        "0010 C0DE"
    );

    #[test]
    fn v4_signature() {
        let sig = SignatureRecord::try_from_reader(V4_RSA).unwrap();
        assert_eq!(sig.version, SignatureVersion::V4);
        assert_eq!(sig.typ, SignatureType::Binary);
        assert_eq!(sig.pub_alg, PublicKeyAlgorithm::RSA);
        assert_eq!(sig.hash_alg, HashAlgorithm::Sha256);
        assert_eq!(sig.created.unwrap().timestamp(), 1_609_459_200);
        assert_eq!(sig.issuer, Some(KeyId::new(hex!("0D0E0F1011121314"))));
        assert_eq!(
            sig.issuer_fingerprint,
            Some(Fingerprint::V4(hex!("0102030405060708090A0B0C0D0E0F1011121314")))
        );
        assert_eq!(sig.hash_prefix, hex!("ABCD"));
        assert_eq!(sig.values, vec![Bytes::from_static(&hex!("C0DE"))]);

        // header, hashed area and trailer; never the unhashed area
        let mut expected = V4_RSA[..6 + 0x1D].to_vec();
        expected.extend_from_slice(&hex!("04FF 00000023"));
        assert_eq!(&sig.signed_blob[..], &expected[..]);
        assert_eq!(
            sig.issuer_needle().unwrap(),
            hex!("04 0102030405060708090A0B0C0D0E0F1011121314").to_vec()
        );
    }

    #[test]
    fn critical_bit_is_masked() {
        let raw = hex!("04 01 11 02 0006 05 82 5FEE6600 0000 0000 0000");
        let sig = SignatureRecord::try_from_reader(&raw[..]).unwrap();
        assert!(sig.is_text());
        assert_eq!(sig.created.unwrap().timestamp(), 1_609_459_200);
        assert!(sig.values.is_empty());
        assert_eq!(sig.issuer_needle(), None);
    }

    #[test]
    fn v3_signature() {
        let raw = hex!("03 05 00 5FEE6600 0102030405060708 11 02 BEEF 0003 05 0003 06");
        let sig = SignatureRecord::try_from_reader(&raw[..]).unwrap();
        assert_eq!(sig.version, SignatureVersion::V3);
        assert_eq!(&sig.signed_blob[..], &hex!("00 5FEE6600")[..]);
        assert_eq!(sig.issuer_needle().unwrap(), hex!("0102030405060708").to_vec());
        // dsa values are padded and concatenated
        assert_eq!(sig.values, vec![Bytes::from_static(&hex!("00000005 00000006"))]);

        let raw = hex!("03 04 00 5FEE6600");
        assert!(SignatureRecord::try_from_reader(&raw[..]).is_err());
    }

    #[test]
    fn v5_salt_and_trailer() {
        let mut raw = hex!("05 00 16 0A 0000 0000 1234").to_vec();
        raw.extend_from_slice(&[7u8; 16]);
        raw.extend_from_slice(&hex!("0008 01 0007 02"));

        let sig = SignatureRecord::try_from_reader(&raw[..]).unwrap();
        assert_eq!(sig.salt, Some([7u8; 16]));
        assert_eq!(
            &sig.signed_blob[..],
            &hex!("05 00 16 0A 0000 05FF 0000000000000006")[..]
        );
        // eddsa halves are left padded into one value
        let value = &sig.values[0];
        assert_eq!(value.len(), 64);
        assert_eq!(value[31], 1);
        assert_eq!(value[63], 2);
    }

    #[test]
    fn unsupported_version() {
        assert!(matches!(
            SignatureRecord::try_from_reader(&hex!("06 00")[..]),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn truncated_subpackets() {
        let raw = hex!("04 00 01 08 0005 09 10 0102");
        match SignatureRecord::try_from_reader(&raw[..]) {
            Err(Error::IO { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prefix_and_digest() {
        let sig = SignatureRecord::try_from_reader(V4_RSA).unwrap();
        let mut hasher = sig.new_hasher().unwrap();
        hasher.update(b"hello");
        let digest = sig.finish_hasher(hasher);

        let mut data = b"hello".to_vec();
        data.extend_from_slice(&sig.signed_blob);
        assert_eq!(digest, HashAlgorithm::Sha256.digest(&data).unwrap());
        assert!(!sig.matches_prefix(&[0xAB]));
    }
}
