//! SSH wire formats: public key blobs and `SSHSIG` detached signatures.
//!
//! Ref: <https://github.com/openssh/openssh-portable/blob/master/PROTOCOL.sshsig>

use std::io::BufRead;

use bytes::{Buf, Bytes};
use log::debug;

use crate::{
    crypto::{
        ecc_curve::EccCurve, ecdsa, hash::HashAlgorithm, public_key::PublicKeyAlgorithm,
    },
    errors::{ensure_eq, malformed_err, unsupported_err, Result},
    packet::{SignatureRecord, SignatureType, SignatureVersion, SignedBlobBuilder},
    parsing::BufParsing,
    parsing_reader::BufReadParsing,
    types::{Fingerprint, Mpi, PublicParams},
};

const MAGIC: &[u8; 6] = b"SSHSIG";
const SIG_VERSION: u32 = 1;
const ED25519_SIG_LEN: usize = 64;
const DSS_SIG_LEN: usize = 40;

/// The SSH specific parts of a [`SignatureRecord`].
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SshSignatureInfo {
    /// The key embedded in the signature.
    pub public_key: PublicParams,
    pub fingerprint: Fingerprint,
    pub namespace: String,
    /// The signature format name, such as `rsa-sha2-512`.
    pub sig_format: String,
}

impl SshSignatureInfo {
    /// The hash applied to the signed data before the public key operation.
    ///
    /// `None` for Ed25519, which signs the data itself.
    pub fn verification_hash(&self) -> Option<HashAlgorithm> {
        match &self.public_key {
            PublicParams::Dsa { .. } => Some(HashAlgorithm::Sha1),
            PublicParams::Rsa { .. } if self.sig_format == "rsa-sha2-256" => {
                Some(HashAlgorithm::Sha256)
            }
            PublicParams::Rsa { .. } => Some(HashAlgorithm::Sha512),
            PublicParams::Ecdsa { curve, .. } => {
                let name = curve.name();
                if name.ends_with("256") {
                    Some(HashAlgorithm::Sha256)
                } else if name.ends_with("384") {
                    Some(HashAlgorithm::Sha384)
                } else {
                    Some(HashAlgorithm::Sha512)
                }
            }
            _ => None,
        }
    }
}

/// The SSH fingerprint of a wire format key blob.
pub fn fingerprint(blob: &[u8]) -> Result<Fingerprint> {
    let digest = HashAlgorithm::Sha256.digest(blob)?;
    Ok(Fingerprint::Ssh(digest.as_slice().try_into()?))
}

/// Reads an SSH `mpint`, dropping the sign byte.
fn read_mpint<B: Buf>(i: &mut B) -> Result<Mpi> {
    let raw = i.read_ssh_string()?;
    Ok(Mpi::from_slice(&raw))
}

fn read_name<B: Buf>(i: &mut B) -> Result<String> {
    let raw = i.read_ssh_string()?;
    Ok(std::str::from_utf8(&raw)?.to_string())
}

/// Parses an SSH wire format public key blob.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4253#section-6.6>
pub fn parse_key_blob(blob: &[u8]) -> Result<PublicParams> {
    let mut i = blob;
    let alg = read_name(&mut i)?;
    debug!("ssh key {}", alg);

    let params = match alg.as_str() {
        "ssh-ed25519" => {
            let point = i.read_ssh_string()?;
            PublicParams::Ed25519 {
                point: (&point[..]).try_into()?,
            }
        }
        "ssh-rsa" => {
            let e = read_mpint(&mut i)?;
            let n = read_mpint(&mut i)?;
            PublicParams::Rsa { n, e }
        }
        "ssh-dss" => {
            let p = read_mpint(&mut i)?;
            let q = read_mpint(&mut i)?;
            let g = read_mpint(&mut i)?;
            let y = read_mpint(&mut i)?;
            PublicParams::Dsa { p, q, g, y }
        }
        name if name.starts_with("ecdsa-sha2-") => {
            let curve_name = read_name(&mut i)?;
            let Some(curve) = EccCurve::from_ssh_name(&curve_name) else {
                unsupported_err!("ssh curve {}", curve_name);
            };
            ensure_eq!(
                name.trim_start_matches("ecdsa-sha2-"),
                curve_name.as_str(),
                "ssh key curve mismatch"
            );
            let point = i.read_ssh_string()?;
            let (x, y) = ecdsa::split_point(&curve, &point)?;
            PublicParams::Ecdsa {
                curve,
                x: x.into(),
                y: y.into(),
            }
        }
        other => unsupported_err!("ssh key type {}", other),
    };

    Ok(params)
}

fn pub_alg(params: &PublicParams) -> PublicKeyAlgorithm {
    match params {
        PublicParams::Rsa { .. } => PublicKeyAlgorithm::RSA,
        PublicParams::Dsa { .. } => PublicKeyAlgorithm::DSA,
        PublicParams::Ecdsa { .. } => PublicKeyAlgorithm::ECDSA,
        PublicParams::Ed25519 { .. } => PublicKeyAlgorithm::EdDSA,
        PublicParams::Ecdh { .. } | PublicParams::Curve25519 { .. } => PublicKeyAlgorithm::ECDH,
        PublicParams::Elgamal { .. } => PublicKeyAlgorithm::Elgamal,
        PublicParams::Unknown { alg, .. } => *alg,
    }
}

/// Splits an SSH signature blob into the values a [`SignatureRecord`] carries.
fn signature_values(format: &str, mut raw: Bytes) -> Result<Vec<Bytes>> {
    let values = match format {
        "ssh-ed25519" => {
            ensure_eq!(raw.len(), ED25519_SIG_LEN, "ed25519 signature length");
            vec![raw]
        }
        "ssh-dss" => {
            ensure_eq!(raw.len(), DSS_SIG_LEN, "dss signature length");
            vec![raw]
        }
        "ssh-rsa" | "rsa-sha2-256" | "rsa-sha2-512" => vec![raw],
        f if f.starts_with("ecdsa-sha2-") => {
            let r = read_mpint(&mut raw)?;
            let s = read_mpint(&mut raw)?;
            vec![
                Bytes::copy_from_slice(r.as_bytes()),
                Bytes::copy_from_slice(s.as_bytes()),
            ]
        }
        other => unsupported_err!("ssh signature format {}", other),
    };
    Ok(values)
}

/// Parses a binary `SSHSIG` signature.
pub fn parse_signature<B: BufRead>(mut i: B) -> Result<SignatureRecord> {
    let mut buf = i.rest()?.freeze();

    let magic: [u8; 6] = buf.read_array()?;
    if &magic != MAGIC {
        malformed_err!("invalid sshsig magic {}", hex::encode(magic));
    }
    let version = buf.read_be_u32()?;
    if version != SIG_VERSION {
        unsupported_err!("sshsig version {}", version);
    }

    let key_blob = buf.read_ssh_string()?;
    let namespace = read_name(&mut buf)?;
    let reserved = buf.read_ssh_string()?;
    let hash_name = read_name(&mut buf)?;
    let mut sig_blob = buf.read_ssh_string()?;

    let hash_alg: HashAlgorithm = hash_name.parse()?;
    if !matches!(hash_alg, HashAlgorithm::Sha256 | HashAlgorithm::Sha512) {
        unsupported_err!("sshsig hash {}", hash_name);
    }

    let public_key = parse_key_blob(&key_blob)?;
    let fingerprint = fingerprint(&key_blob)?;

    let sig_format = read_name(&mut sig_blob)?;
    let sig_raw = sig_blob.read_ssh_string()?;
    let values = signature_values(&sig_format, sig_raw)?;

    let mut blob = SignedBlobBuilder::new();
    blob.push(MAGIC);
    blob.push_ssh_string(namespace.as_bytes())?
        .push_ssh_string(&reserved)?
        .push_ssh_string(hash_name.as_bytes())?;

    debug!(
        "sshsig {} key {:?}, namespace {:?}, hash {}",
        sig_format, fingerprint, namespace, hash_alg
    );

    Ok(SignatureRecord {
        version: SignatureVersion::Ssh,
        typ: SignatureType::Binary,
        pub_alg: pub_alg(&public_key),
        hash_alg,
        created: None,
        issuer: None,
        issuer_fingerprint: Some(fingerprint.clone()),
        signed_blob: blob.finish(),
        hash_prefix: [0; 2],
        salt: None,
        values,
        ssh: Some(SshSignatureInfo {
            public_key,
            fingerprint,
            namespace,
            sig_format,
        }),
    })
}

/// The data an SSH signature is made over, given the message digest.
pub fn signed_data(sig: &SignatureRecord, message_digest: &[u8]) -> Result<Vec<u8>> {
    let mut data = sig.signed_blob.to_vec();
    data.extend_from_slice(&u32::try_from(message_digest.len())?.to_be_bytes());
    data.extend_from_slice(message_digest);
    Ok(data)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use ed25519_dalek::{Signer, SigningKey};
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::errors::Error;

    fn ssh_string(out: &mut Vec<u8>, data: &[u8]) {
        out.extend_from_slice(&u32::try_from(data.len()).unwrap().to_be_bytes());
        out.extend_from_slice(data);
    }

    fn ssh_mpint(out: &mut Vec<u8>, val: &Mpi) {
        let bytes = val.as_bytes();
        if bytes.first().is_some_and(|b| b & 0x80 != 0) {
            let mut signed = vec![0];
            signed.extend_from_slice(bytes);
            ssh_string(out, &signed);
        } else {
            ssh_string(out, bytes);
        }
    }

    /// Encodes a key as an SSH wire format blob.
    fn key_blob(params: &PublicParams) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match params {
            PublicParams::Ed25519 { point } => {
                ssh_string(&mut out, b"ssh-ed25519");
                ssh_string(&mut out, point);
            }
            PublicParams::Rsa { n, e } => {
                ssh_string(&mut out, b"ssh-rsa");
                ssh_mpint(&mut out, e);
                ssh_mpint(&mut out, n);
            }
            PublicParams::Dsa { p, q, g, y } => {
                ssh_string(&mut out, b"ssh-dss");
                for v in [p, q, g, y] {
                    ssh_mpint(&mut out, v);
                }
            }
            PublicParams::Ecdsa { curve, x, y } => {
                let name = curve.name();
                ssh_string(&mut out, format!("ecdsa-sha2-{name}").as_bytes());
                ssh_string(&mut out, name.as_bytes());
                ssh_string(&mut out, &ecdsa::sec1_point(curve, x, y)?);
            }
            other => unsupported_err!("{} keys have no ssh encoding", other.name()),
        }
        Ok(out)
    }

    fn sshsig(key_blob: &[u8], namespace: &str, hash: &str, format: &str, sig: &[u8]) -> Vec<u8> {
        let mut out = b"SSHSIG".to_vec();
        out.extend_from_slice(&1u32.to_be_bytes());
        ssh_string(&mut out, key_blob);
        ssh_string(&mut out, namespace.as_bytes());
        ssh_string(&mut out, b"");
        ssh_string(&mut out, hash.as_bytes());
        let mut sig_blob = Vec::new();
        ssh_string(&mut sig_blob, format.as_bytes());
        ssh_string(&mut sig_blob, sig);
        ssh_string(&mut out, &sig_blob);
        out
    }

    #[test]
    fn ed25519_signature() {
        let signing = SigningKey::from_bytes(&[42u8; 32]);
        let params = PublicParams::Ed25519 {
            point: signing.verifying_key().to_bytes(),
        };
        let blob = key_blob(&params).unwrap();
        assert_eq!(parse_key_blob(&blob).unwrap(), params);

        let placeholder = [0u8; 64];
        let raw = sshsig(&blob, "git", "sha512", "ssh-ed25519", &placeholder);
        let sig = parse_signature(&raw[..]).unwrap();
        assert_eq!(sig.version, SignatureVersion::Ssh);
        assert_eq!(sig.pub_alg, PublicKeyAlgorithm::EdDSA);
        assert_eq!(sig.hash_alg, HashAlgorithm::Sha512);

        let info = sig.ssh.as_ref().unwrap();
        assert_eq!(info.namespace, "git");
        assert_eq!(info.verification_hash(), None);
        assert_eq!(info.fingerprint, fingerprint(&blob).unwrap());

        let mut expected = b"SSHSIG".to_vec();
        ssh_string(&mut expected, b"git");
        ssh_string(&mut expected, b"");
        ssh_string(&mut expected, b"sha512");
        assert_eq!(&sig.signed_blob[..], &expected[..]);

        let digest = HashAlgorithm::Sha512.digest(b"message").unwrap();
        let data = signed_data(&sig, &digest).unwrap();
        let real = signing.sign(&data).to_bytes();
        let values = vec![Bytes::copy_from_slice(&real)];
        info.public_key
            .verify(HashAlgorithm::None, &data, &values)
            .unwrap();
    }

    #[test]
    fn ecdsa_key_and_signature_values() {
        let x = [0x11u8; 32];
        let y = [0x22u8; 32];
        let params = PublicParams::Ecdsa {
            curve: EccCurve::P256,
            x: Bytes::copy_from_slice(&x),
            y: Bytes::copy_from_slice(&y),
        };
        let blob = key_blob(&params).unwrap();
        assert_eq!(parse_key_blob(&blob).unwrap(), params);

        let mut sig = Vec::new();
        ssh_string(&mut sig, &hex!("00 80 01"));
        ssh_string(&mut sig, &hex!("7F"));
        let raw = sshsig(&blob, "file", "sha256", "ecdsa-sha2-nistp256", &sig);
        let record = parse_signature(&raw[..]).unwrap();
        assert_eq!(
            record.values,
            vec![
                Bytes::from_static(&hex!("8001")),
                Bytes::from_static(&hex!("7F"))
            ]
        );
        assert_eq!(
            record.ssh.unwrap().verification_hash(),
            Some(HashAlgorithm::Sha256)
        );
    }

    #[test]
    fn rsa_blob_field_order() {
        let params = PublicParams::Rsa {
            n: Mpi::from_slice(&hex!("C0FFEE")),
            e: Mpi::from_slice(&hex!("010001")),
        };
        let blob = key_blob(&params).unwrap();
        // e precedes n, and n carries a sign byte
        assert_eq!(
            &blob[11..],
            &hex!("00000003 010001 00000004 00C0FFEE")[..]
        );
        assert_eq!(parse_key_blob(&blob).unwrap(), params);
    }

    #[test]
    fn rejects_bad_input() {
        let blob = key_blob(&PublicParams::Ed25519 { point: [1; 32] }).unwrap();

        let mut raw = sshsig(&blob, "git", "sha512", "ssh-ed25519", &[0; 64]);
        raw[3] = b'X';
        assert!(matches!(
            parse_signature(&raw[..]),
            Err(Error::MalformedPacket { .. })
        ));

        let raw = sshsig(&blob, "git", "md5", "ssh-ed25519", &[0; 64]);
        assert!(matches!(
            parse_signature(&raw[..]),
            Err(Error::Unsupported { .. })
        ));

        let raw = sshsig(&blob, "git", "sha512", "ssh-ed25519", &[0; 10]);
        assert!(parse_signature(&raw[..]).is_err());

        let mut other = Vec::new();
        ssh_string(&mut other, b"sk-ssh-ed25519@openssh.com");
        assert!(matches!(
            parse_key_blob(&other),
            Err(Error::Unsupported { .. })
        ));
    }
}
