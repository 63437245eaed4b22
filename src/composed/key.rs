use std::io::Read;

use base64::engine::{general_purpose, Engine as _};
use const_oid::ObjectIdentifier;
use log::{debug, warn};

use crate::{
    armor::{self, BlockType, Dearmor},
    crypto::{ecc_curve::EccCurve, ecdsa},
    der::{DerReader, DerType},
    errors::{ensure, malformed_err, unsupported_err, Error, Result},
    packet::{
        mail_address, ssh, Envelope, KeyPacket, PacketHeader, PacketParser, UserId,
    },
    parsing_reader::BufReadParsing,
    types::{Fingerprint, KeyId, Mpi, PublicParams, SecretParams, Tag},
};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const DSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10040.4.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// DSA SubjectPublicKeyInfo keeps `y` as an INTEGER inside the BIT STRING.
const WRAPPED_INTEGER_PREFIXES: [&[u8]; 2] = [&[0x00, 0x02, 0x81, 0x81], &[0x00, 0x02, 0x81, 0x80]];

const MAX_DER_DEPTH: usize = 8;

/// A public key, with its subkeys.
///
/// Whatever format it came from, a key is identified by its [`Fingerprint`]
/// and used through its [`PublicParams`].
#[derive(Clone, derive_more::Debug)]
pub struct Key {
    pub fingerprint: Fingerprint,
    pub params: PublicParams,
    pub user_id: Option<String>,
    pub mail: Option<String>,
    /// Set for keys parsed from secret key packets, usable or not.
    pub has_secret: bool,
    pub secret_params: Option<SecretParams>,
    pub subkeys: Vec<Key>,
}

impl From<KeyPacket> for Key {
    fn from(packet: KeyPacket) -> Self {
        Self {
            fingerprint: packet.fingerprint,
            params: packet.public_params,
            user_id: None,
            mail: None,
            has_secret: packet.secret_params.is_some(),
            secret_params: packet.secret_params,
            subkeys: Vec::new(),
        }
    }
}

impl Key {
    /// A key without user id, secret material or subkeys.
    pub fn new(fingerprint: Fingerprint, params: PublicParams) -> Self {
        Self {
            fingerprint,
            params,
            user_id: None,
            mail: None,
            has_secret: false,
            secret_params: None,
            subkeys: Vec::new(),
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    /// Finds the key, this one or one of its subkeys, that `needle` identifies.
    ///
    /// `needle` is a fingerprint or a suffix of at least four bytes of one,
    /// such as a key id. The first match wins, checking this key before its
    /// subkeys.
    pub fn match_fingerprint(&self, needle: &[u8]) -> Option<&Key> {
        if self.fingerprint.matches(needle) {
            return Some(self);
        }
        self.subkeys
            .iter()
            .find_map(|subkey| subkey.match_fingerprint(needle))
    }

    /// Whether the key holds secret material that can decrypt.
    pub fn can_decrypt(&self) -> bool {
        self.secret_params
            .as_ref()
            .is_some_and(SecretParams::is_usable)
    }

    fn set_user_id(&mut self, id: String) {
        self.mail = mail_address(&id);
        self.user_id = Some(id);
    }
}

/// Parses a public key.
///
/// Accepted are
/// - armored blocks: OpenPGP keys, RFC 4716 SSH keys and PEM encoded PKCS#1
///   or SubjectPublicKeyInfo keys,
/// - single `algorithm base64 [comment]` lines as found in `authorized_keys`,
/// - binary OpenPGP keys, SSH key blobs and DER encoded keys.
///
/// OpenPGP input yields the first primary key, with its first user id and
/// all its subkeys.
pub fn parse_key(input: &[u8]) -> Result<Key> {
    parse(input).map_err(Error::untunnel)
}

fn parse(input: &[u8]) -> Result<Key> {
    if armor::is_armored(input) {
        return from_armor(input);
    }
    if let Some(key) = from_ssh_line(input)? {
        return Ok(key);
    }
    from_binary(input)
}

fn from_armor(input: &[u8]) -> Result<Key> {
    let mut dearmor = Dearmor::new(input);
    let typ = dearmor.read_header()?;
    let mut body = Vec::new();
    dearmor.read_to_end(&mut body).map_err(Error::from_io)?;

    match typ {
        BlockType::PublicKey | BlockType::PrivateKey => from_binary(&body),
        BlockType::Ssh2PublicKey => {
            let comment = dearmor
                .headers
                .get("Comment")
                .and_then(|values| values.first())
                .map(|c| c.trim().trim_matches('"').to_string());
            from_ssh_blob(&body, comment)
        }
        BlockType::PublicKeyPKCS1(_) | BlockType::PublicKeyPKCS8 => from_der(&body),
        typ => unsupported_err!("armored {} is not a key", typ),
    }
}

fn is_ssh_key_name(name: &str) -> bool {
    name.starts_with("ssh-") || name.starts_with("ecdsa-sha2-")
}

/// Parses an `algorithm base64 [comment]` line.
///
/// Returns `None` if the input does not look like one.
fn from_ssh_line(input: &[u8]) -> Result<Option<Key>> {
    let Ok(text) = std::str::from_utf8(input) else {
        return Ok(None);
    };
    let Some(line) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let mut parts = line.split_whitespace();
    let (Some(alg), Some(data)) = (parts.next(), parts.next()) else {
        return Ok(None);
    };
    if !is_ssh_key_name(alg) {
        return Ok(None);
    }

    let blob = general_purpose::STANDARD.decode(data)?;
    ensure!(
        blob.get(4..4 + alg.len()) == Some(alg.as_bytes()),
        "ssh key line for {} holds a different key type",
        alg
    );

    let comment = parts.collect::<Vec<_>>().join(" ");
    let comment = (!comment.is_empty()).then_some(comment);
    from_ssh_blob(&blob, comment).map(Some)
}

fn from_ssh_blob(blob: &[u8], comment: Option<String>) -> Result<Key> {
    let params = ssh::parse_key_blob(blob)?;
    let mut key = Key::new(ssh::fingerprint(blob)?, params);
    if let Some(comment) = comment {
        key.set_user_id(comment);
    }
    debug!("ssh {} key {:?}", key.params.name(), key.fingerprint);
    Ok(key)
}

fn from_binary(input: &[u8]) -> Result<Key> {
    let mut parser = PacketParser::new(input);
    let Some(header) = parser.next_header()? else {
        malformed_err!("empty key");
    };

    match parser.envelope() {
        Some(Envelope::SshPublicKey) => {
            let blob = parser.rest()?;
            from_ssh_blob(&blob, None)
        }
        Some(Envelope::Der) => {
            let der = parser.rest()?;
            from_der(&der)
        }
        Some(Envelope::SshSignature) => malformed_err!("expected a key, found an ssh signature"),
        Some(Envelope::OpenPgp) | None => from_packets(header, parser),
    }
}

/// Assembles a key from a transferable public or secret key.
fn from_packets(first: PacketHeader, mut parser: PacketParser<&[u8]>) -> Result<Key> {
    let mut primary: Option<Key> = None;
    let mut next = Some(first);

    while let Some(header) = next {
        match header.tag {
            Tag::PublicKey | Tag::SecretKey => {
                if primary.is_some() {
                    debug!("stopping at the next primary key");
                    break;
                }
                let packet = KeyPacket::try_from_reader(header.tag, &mut parser)?;
                primary = Some(packet.into());
            }
            Tag::PublicSubkey | Tag::SecretSubkey | Tag::UserId => {
                let Some(primary) = primary.as_mut() else {
                    malformed_err!("key starts with a {:?} packet", header.tag);
                };
                if header.tag == Tag::UserId {
                    let id = UserId::try_from_reader(&mut parser)?;
                    if primary.user_id.is_none() {
                        primary.set_user_id(id.as_str());
                    }
                } else {
                    match KeyPacket::try_from_reader(header.tag, &mut parser) {
                        Ok(packet) => primary.subkeys.push(packet.into()),
                        Err(Error::Unsupported { message }) => {
                            warn!("skipping subkey: {}", message);
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            tag => {
                debug!("skipping {:?} packet in key", tag);
                parser.drain()?;
            }
        }
        next = parser.next_header()?;
    }

    primary.ok_or_else(|| Error::MalformedPacket {
        message: "no key packet found".to_string(),
    })
}

type DerLeaf = (DerType, Vec<u8>);

/// Flattens nested DER values into the list of their primitive values.
fn flatten_der(der: &[u8], depth: usize, leaves: &mut Vec<DerLeaf>) -> Result<()> {
    ensure!(depth <= MAX_DER_DEPTH, "DER nested too deeply");

    let mut reader = DerReader::new(der);
    while let Some(typ) = reader.next_value()? {
        let body = reader.read_body()?;
        match typ {
            DerType::Sequence | DerType::Set => flatten_der(&body, depth + 1, leaves)?,
            DerType::BitString => flatten_bit_string(&body, depth, leaves)?,
            typ => leaves.push((typ, body)),
        }
    }
    Ok(())
}

fn flatten_bit_string(body: &[u8], depth: usize, leaves: &mut Vec<DerLeaf>) -> Result<()> {
    if let Some(int) = WRAPPED_INTEGER_PREFIXES
        .iter()
        .find_map(|prefix| body.strip_prefix(*prefix))
    {
        leaves.push((DerType::Integer, int.to_vec()));
        return Ok(());
    }

    // the first octet counts the unused bits
    let Some((_, content)) = body.split_first() else {
        malformed_err!("empty bit string");
    };
    if DerReader::<&[u8]>::could_start_sequence(content) {
        return flatten_der(content, depth + 1, leaves);
    }
    leaves.push((DerType::BitString, content.to_vec()));
    Ok(())
}

/// Parses a DER encoded public key: a PKCS#1 `RSAPublicKey` or a
/// SubjectPublicKeyInfo holding an RSA, DSA or ECDSA key.
///
/// The fingerprint is the SHA-256 over the DER bytes.
pub(crate) fn from_der(der: &[u8]) -> Result<Key> {
    let mut leaves = Vec::new();
    flatten_der(der, 0, &mut leaves)?;

    let oids: Vec<&[u8]> = leaves
        .iter()
        .filter(|(typ, _)| *typ == DerType::ObjectIdentifier)
        .map(|(_, body)| &body[..])
        .collect();
    let integers: Vec<Mpi> = leaves
        .iter()
        .filter(|(typ, _)| *typ == DerType::Integer)
        .map(|(_, body)| Mpi::from_slice(body))
        .collect();

    let params = match (oids.first(), &integers[..]) {
        (None, [n, e]) => PublicParams::Rsa {
            n: n.clone(),
            e: e.clone(),
        },
        (Some(oid), [n, e]) if *oid == RSA_ENCRYPTION.as_bytes() => PublicParams::Rsa {
            n: n.clone(),
            e: e.clone(),
        },
        (Some(oid), [p, q, g, y]) if *oid == DSA.as_bytes() => PublicParams::Dsa {
            p: p.clone(),
            q: q.clone(),
            g: g.clone(),
            y: y.clone(),
        },
        (Some(oid), _) if *oid == EC_PUBLIC_KEY.as_bytes() => {
            let Some(curve) = oids.get(1).and_then(|oid| EccCurve::from_oid(oid)) else {
                malformed_err!("EC key without a curve");
            };
            let Some((_, point)) = leaves.iter().find(|(typ, _)| *typ == DerType::BitString)
            else {
                malformed_err!("EC key without a point");
            };
            let (x, y) = ecdsa::split_point(&curve, point)?;
            PublicParams::Ecdsa {
                curve,
                x: x.into(),
                y: y.into(),
            }
        }
        (Some(oid), _) => unsupported_err!("DER key with algorithm {}", hex::encode(oid)),
        (None, _) => unsupported_err!("DER structure with {} integers", integers.len()),
    };

    let key = Key::new(ssh::fingerprint(der)?, params);
    debug!("DER {} key {:?}", key.params.name(), key.fingerprint);
    Ok(key)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use bytes::Bytes;
    use ed25519_dalek::SigningKey;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::hash::HashAlgorithm;

    /// Body of a v4 Ed25519 public key packet.
    const ED25519_V4: &[u8] = &hex!(
        "04 5C5A4E83 16"
        "09 2B06010401DA470F01"
        "0107 40 3F098994BDD916ED4053197934E4A87C80733A1280D62F8010992E43EE3B2406"
    );

    fn v4_fingerprint(body: &[u8]) -> Fingerprint {
        let mut prefixed = vec![0x99, 0, body.len() as u8];
        prefixed.extend_from_slice(body);
        Fingerprint::V4(
            HashAlgorithm::Sha1.digest(&prefixed).unwrap()[..]
                .try_into()
                .unwrap(),
        )
    }

    fn subkey_body() -> Vec<u8> {
        let mut body = ED25519_V4.to_vec();
        body[4] ^= 1;
        body
    }

    /// A transferable public key: primary key, user id and one subkey.
    fn transferable_key() -> Vec<u8> {
        let uid = b"Alice Example <alice@example.org>";
        let mut raw = vec![0x98, ED25519_V4.len() as u8];
        raw.extend_from_slice(ED25519_V4);
        raw.extend_from_slice(&[0xCD, uid.len() as u8]);
        raw.extend_from_slice(uid);
        let sub = subkey_body();
        raw.extend_from_slice(&[0xB8, sub.len() as u8]);
        raw.extend_from_slice(&sub);
        raw
    }

    fn ssh_string(out: &mut Vec<u8>, data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
    }

    fn ed25519_blob() -> (Vec<u8>, [u8; 32]) {
        let sk = SigningKey::generate(&mut ChaCha8Rng::seed_from_u64(7));
        let point = sk.verifying_key().to_bytes();
        let mut blob = Vec::new();
        ssh_string(&mut blob, b"ssh-ed25519");
        ssh_string(&mut blob, &point);
        (blob, point)
    }

    fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        match body.len() {
            len if len < 0x80 => out.push(len as u8),
            len if len <= 0xFF => out.extend([0x81, len as u8]),
            len => {
                out.push(0x82);
                out.extend((len as u16).to_be_bytes());
            }
        }
        out.extend_from_slice(body);
        out
    }

    fn key_with_subkey() -> Key {
        let mut key = Key::new(
            v4_fingerprint(ED25519_V4),
            PublicParams::Ed25519 { point: [1; 32] },
        );
        key.subkeys.push(Key::new(
            v4_fingerprint(&subkey_body()),
            PublicParams::Ed25519 { point: [2; 32] },
        ));
        key
    }

    #[test]
    fn match_fingerprint() {
        let key = key_with_subkey();
        let primary = key.fingerprint.to_vec();
        let sub = key.subkeys[0].fingerprint.to_vec();

        // exact, marked and unmarked
        assert_eq!(key.match_fingerprint(&primary).unwrap().fingerprint, key.fingerprint);
        assert_eq!(
            key.match_fingerprint(&primary[1..]).unwrap().fingerprint,
            key.fingerprint
        );

        // truncated suffix, such as a key id
        let id = key.key_id();
        assert_eq!(
            key.match_fingerprint(id.as_ref()).unwrap().fingerprint,
            key.fingerprint
        );
        assert!(key.match_fingerprint(&primary[primary.len() - 4..]).is_some());
        assert!(key.match_fingerprint(&primary[primary.len() - 3..]).is_none());

        // subkeys are searched once the primary does not match
        let found = key.match_fingerprint(&sub[sub.len() - 8..]).unwrap();
        assert_eq!(found.fingerprint, key.subkeys[0].fingerprint);

        assert!(key.match_fingerprint(&[0xEE; 20]).is_none());
    }

    #[test]
    fn match_fingerprint_v5_key_id() {
        let key = Key::new(
            Fingerprint::V5(core::array::from_fn(|i| i as u8)),
            PublicParams::Ed25519 { point: [1; 32] },
        );
        assert!(key.match_fingerprint(&hex!("0001020304050607")).is_some());
        assert!(key.match_fingerprint(&hex!("18191A1B1C1D1E1F")).is_some());
        assert!(key.match_fingerprint(&hex!("0102030405060708")).is_none());
    }

    #[test]
    fn openpgp_binary_and_armored() {
        let _ = pretty_env_logger::try_init();

        let raw = transferable_key();
        let key = parse_key(&raw).unwrap();
        assert_eq!(key.fingerprint, v4_fingerprint(ED25519_V4));
        assert!(matches!(key.params, PublicParams::Ed25519 { .. }));
        assert_eq!(key.user_id.as_deref(), Some("Alice Example <alice@example.org>"));
        assert_eq!(key.mail.as_deref(), Some("alice@example.org"));
        assert!(!key.has_secret);
        assert_eq!(key.subkeys.len(), 1);
        assert_eq!(key.subkeys[0].fingerprint, v4_fingerprint(&subkey_body()));

        let mut armored = Vec::new();
        armor::write(&raw, BlockType::PublicKey, &mut armored, None, true).unwrap();
        let from_armor = parse_key(&armored).unwrap();
        assert_eq!(from_armor.fingerprint, key.fingerprint);
        assert_eq!(from_armor.subkeys.len(), 1);
    }

    #[test]
    fn armor_checksum_surfaces() {
        let mut armored = Vec::new();
        armor::write(
            &transferable_key(),
            BlockType::PublicKey,
            &mut armored,
            None,
            true,
        )
        .unwrap();
        let text = String::from_utf8(armored).unwrap();
        let crc_line = text.lines().find(|l| l.starts_with('=')).unwrap();
        let broken = text.replace(crc_line, "=AAAA");

        assert!(matches!(
            parse_key(broken.as_bytes()),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn ssh_line_and_blob() {
        let (blob, point) = ed25519_blob();
        let line = format!(
            "ssh-ed25519 {} Alice <alice@example.org>\n",
            general_purpose::STANDARD.encode(&blob)
        );

        let key = parse_key(line.as_bytes()).unwrap();
        assert_eq!(key.params, PublicParams::Ed25519 { point });
        assert_eq!(key.fingerprint, ssh::fingerprint(&blob).unwrap());
        assert!(key.fingerprint.to_vec().starts_with(&[0, 0, 0]));
        assert_eq!(key.user_id.as_deref(), Some("Alice <alice@example.org>"));
        assert_eq!(key.mail.as_deref(), Some("alice@example.org"));

        let raw = parse_key(&blob).unwrap();
        assert_eq!(raw.fingerprint, key.fingerprint);
        assert_eq!(raw.user_id, None);

        let mismatched = format!("ssh-rsa {}", general_purpose::STANDARD.encode(&blob));
        assert!(parse_key(mismatched.as_bytes()).is_err());
    }

    #[test]
    fn rfc4716_armor() {
        let (blob, point) = ed25519_blob();
        let armored = format!(
            "---- BEGIN SSH2 PUBLIC KEY ----\n\
             Comment: \"alice@example.org\"\n\
             {}\n\
             ---- END SSH2 PUBLIC KEY ----\n",
            general_purpose::STANDARD.encode(&blob)
        );
        let key = parse_key(armored.as_bytes()).unwrap();
        assert_eq!(key.params, PublicParams::Ed25519 { point });
        assert_eq!(key.user_id.as_deref(), Some("alice@example.org"));
    }

    #[test]
    fn der_rsa() {
        use rsa::{
            pkcs1::EncodeRsaPublicKey, pkcs8::EncodePublicKey, traits::PublicKeyParts,
            RsaPrivateKey,
        };

        let sk = RsaPrivateKey::new(&mut ChaCha8Rng::seed_from_u64(1), 1024).unwrap();
        let pk = sk.to_public_key();
        let expected = PublicParams::Rsa {
            n: Mpi::from(pk.n()),
            e: Mpi::from(pk.e()),
        };

        let spki = pk.to_public_key_der().unwrap();
        let key = parse_key(spki.as_bytes()).unwrap();
        assert_eq!(key.params, expected);
        assert_eq!(key.fingerprint, ssh::fingerprint(spki.as_bytes()).unwrap());

        let pkcs1 = pk.to_pkcs1_der().unwrap();
        let key = parse_key(pkcs1.as_bytes()).unwrap();
        assert_eq!(key.params, expected);

        let mut pem = Vec::new();
        armor::write(
            spki.as_bytes(),
            BlockType::PublicKeyPKCS8,
            &mut pem,
            None,
            false,
        )
        .unwrap();
        assert_eq!(parse_key(&pem).unwrap().params, expected);
    }

    #[test]
    fn der_dsa_with_wrapped_y() {
        let oid = tlv(0x06, DSA.as_bytes());
        let mut domain = tlv(0x02, &hex!("00C1"));
        domain.extend(tlv(0x02, &hex!("0B")));
        domain.extend(tlv(0x02, &hex!("05")));
        let mut alg = oid;
        alg.extend(tlv(0x30, &domain));

        let mut y = hex!("00028181 00").to_vec();
        y.extend_from_slice(&[0xA5; 128]);

        let mut spki = tlv(0x30, &alg);
        spki.extend(tlv(0x03, &y));
        let der = tlv(0x30, &spki);

        let key = parse_key(&der).unwrap();
        assert_eq!(
            key.params,
            PublicParams::Dsa {
                p: Mpi::from_slice(&hex!("C1")),
                q: Mpi::from_slice(&hex!("0B")),
                g: Mpi::from_slice(&hex!("05")),
                y: Mpi::from_slice(&[0xA5; 128]),
            }
        );
    }

    #[test]
    fn der_ecdsa() {
        use p256::{ecdsa::SigningKey, pkcs8::EncodePublicKey};

        let sk = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(2));
        let vk = sk.verifying_key();
        let point = vk.to_encoded_point(false);
        let spki = vk.to_public_key_der().unwrap();

        let key = parse_key(spki.as_bytes()).unwrap();
        assert_eq!(
            key.params,
            PublicParams::Ecdsa {
                curve: EccCurve::P256,
                x: Bytes::copy_from_slice(point.x().unwrap()),
                y: Bytes::copy_from_slice(point.y().unwrap()),
            }
        );
    }

    #[test]
    fn der_unknown_algorithm() {
        // an Ed25519 SubjectPublicKeyInfo
        let mut spki = tlv(0x30, &tlv(0x06, &hex!("2B6570")));
        let mut point = vec![0];
        point.extend_from_slice(&[9; 32]);
        spki.extend(tlv(0x03, &point));
        let der = tlv(0x30, &spki);

        assert!(matches!(parse_key(&der), Err(Error::Unsupported { .. })));
    }
}
