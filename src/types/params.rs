use std::io::BufRead;

use bytes::Bytes;
use log::debug;

use crate::{
    crypto::{
        checksum, dsa, ecc_curve::EccCurve, ecdsa, ed25519, hash::HashAlgorithm,
        public_key::PublicKeyAlgorithm, rsa,
    },
    errors::{ensure_eq, malformed_err, unsupported_err, Error, Result},
    parsing_reader::BufReadParsing,
    types::Mpi,
};

/// Prefix of native, compressed encodings of 25519 points.
const NATIVE_POINT_PREFIX: u8 = 0x40;

/// The public parameters of a key, resolved per algorithm.
#[derive(PartialEq, Eq, Clone, derive_more::Debug)]
pub enum PublicParams {
    Rsa {
        n: Mpi,
        e: Mpi,
    },
    Dsa {
        p: Mpi,
        q: Mpi,
        g: Mpi,
        y: Mpi,
    },
    Ecdsa {
        curve: EccCurve,
        #[debug("{}", hex::encode(x))]
        x: Bytes,
        #[debug("{}", hex::encode(y))]
        y: Bytes,
    },
    Ed25519 {
        #[debug("{}", hex::encode(point))]
        point: [u8; 32],
    },
    Ecdh {
        curve: EccCurve,
        #[debug("{}", hex::encode(x))]
        x: Bytes,
        #[debug("{}", hex::encode(y))]
        y: Bytes,
        #[debug("{}", hex::encode(kdf))]
        kdf: Bytes,
    },
    Curve25519 {
        #[debug("{}", hex::encode(point))]
        point: [u8; 32],
        #[debug("{}", hex::encode(kdf))]
        kdf: Bytes,
    },
    Elgamal {
        p: Mpi,
        g: Mpi,
        y: Mpi,
    },
    /// Algorithms and curves we can carry but not use.
    Unknown {
        alg: PublicKeyAlgorithm,
        #[debug("{}", hex::encode(data))]
        data: Bytes,
    },
}

fn read_oid<B: BufRead>(mut i: B) -> Result<EccCurve> {
    let len = i.read_u8()?;
    if len == 0 || len == 0xFF {
        malformed_err!("reserved oid length {}", len);
    }
    let oid = i.take_bytes(len.into())?;
    match EccCurve::from_oid(&oid) {
        Some(curve) => Ok(curve),
        None => malformed_err!("invalid oid {}", hex::encode(&oid)),
    }
}

fn native_point(mpi: &Mpi) -> Result<[u8; 32]> {
    match mpi.as_bytes() {
        [NATIVE_POINT_PREFIX, rest @ ..] if rest.len() == 32 => Ok(rest.try_into()?),
        _ => malformed_err!("invalid native point of {} bytes", mpi.len()),
    }
}

impl PublicParams {
    /// Parses the public parameters of a key packet.
    ///
    /// Unsupported algorithms consume the rest of `i`, which must therefore
    /// be bounded to the key material.
    pub fn try_from_reader<B: BufRead>(alg: PublicKeyAlgorithm, mut i: B) -> Result<Self> {
        let params = match alg {
            PublicKeyAlgorithm::RSA
            | PublicKeyAlgorithm::RSAEncrypt
            | PublicKeyAlgorithm::RSASign => {
                let n = Mpi::try_from_reader(&mut i)?;
                let e = Mpi::try_from_reader(&mut i)?;
                PublicParams::Rsa { n, e }
            }
            PublicKeyAlgorithm::DSA => {
                let p = Mpi::try_from_reader(&mut i)?;
                let q = Mpi::try_from_reader(&mut i)?;
                let g = Mpi::try_from_reader(&mut i)?;
                let y = Mpi::try_from_reader(&mut i)?;
                PublicParams::Dsa { p, q, g, y }
            }
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalSign => {
                let p = Mpi::try_from_reader(&mut i)?;
                let g = Mpi::try_from_reader(&mut i)?;
                let y = Mpi::try_from_reader(&mut i)?;
                PublicParams::Elgamal { p, g, y }
            }
            PublicKeyAlgorithm::ECDSA | PublicKeyAlgorithm::EdDSA => {
                let curve = read_oid(&mut i)?;
                let point = Mpi::try_from_reader(&mut i)?;

                match (alg, curve) {
                    (PublicKeyAlgorithm::EdDSA, EccCurve::Ed25519) => PublicParams::Ed25519 {
                        point: native_point(&point)?,
                    },
                    (PublicKeyAlgorithm::ECDSA, curve) if curve.coordinate_len().is_some() => {
                        let (x, y) = ecdsa::split_point(&curve, point.as_bytes())?;
                        PublicParams::Ecdsa {
                            curve,
                            x: x.into(),
                            y: y.into(),
                        }
                    }
                    (alg, curve) => {
                        debug!("unsupported curve {} for {:?}", curve, alg);
                        PublicParams::Unknown {
                            alg,
                            data: point.as_bytes().to_vec().into(),
                        }
                    }
                }
            }
            PublicKeyAlgorithm::ECDH => {
                let curve = read_oid(&mut i)?;
                let point = Mpi::try_from_reader(&mut i)?;
                let kdf_len = i.read_u8()?;
                let kdf = i.take_bytes(kdf_len.into())?.freeze();

                match curve {
                    EccCurve::Curve25519 => PublicParams::Curve25519 {
                        point: native_point(&point)?,
                        kdf,
                    },
                    curve if curve.coordinate_len().is_some() => {
                        let (x, y) = ecdsa::split_point(&curve, point.as_bytes())?;
                        PublicParams::Ecdh {
                            curve,
                            x: x.into(),
                            y: y.into(),
                            kdf,
                        }
                    }
                    curve => {
                        debug!("unsupported ECDH curve {}", curve);
                        PublicParams::Unknown {
                            alg,
                            data: point.as_bytes().to_vec().into(),
                        }
                    }
                }
            }
            PublicKeyAlgorithm::Unknown(_) => PublicParams::Unknown {
                alg,
                data: i.rest()?.freeze(),
            },
        };

        Ok(params)
    }

    /// The key values in their canonical order.
    ///
    /// Curve based keys lead with the curve name.
    pub fn values(&self) -> Vec<&[u8]> {
        match self {
            Self::Rsa { n, e } => vec![n.as_bytes(), e.as_bytes()],
            Self::Dsa { p, q, g, y } => vec![p.as_bytes(), q.as_bytes(), g.as_bytes(), y.as_bytes()],
            Self::Ecdsa { curve, x, y } | Self::Ecdh { curve, x, y, .. } => {
                vec![curve.name().as_bytes(), &x[..], &y[..]]
            }
            Self::Ed25519 { point } | Self::Curve25519 { point, .. } => vec![&point[..]],
            Self::Elgamal { p, g, y } => vec![p.as_bytes(), g.as_bytes(), y.as_bytes()],
            Self::Unknown { data, .. } => vec![&data[..]],
        }
    }

    /// Verifies `sig` over `hashed`.
    ///
    /// `hashed` is the digest for OpenPGP signatures. Ed25519 signs the
    /// message directly, so SSH hands in the full signed blob. `sig` holds the
    /// raw signature values as stored in a signature record.
    pub fn verify(&self, hash: HashAlgorithm, hashed: &[u8], sig: &[Bytes]) -> Result<()> {
        match self {
            Self::Rsa { n, e } => {
                let [s] = sig else {
                    malformed_err!("RSA signature with {} values", sig.len());
                };
                rsa::verify(n, e, hash, hashed, s)
            }
            Self::Dsa { p, q, g, y } => {
                let [rs] = sig else {
                    malformed_err!("DSA signature with {} values", sig.len());
                };
                dsa::verify(p, q, g, y, hashed, rs)
            }
            Self::Ecdsa { curve, x, y } => {
                let [r, s] = sig else {
                    malformed_err!("ECDSA signature with {} values", sig.len());
                };
                let point = ecdsa::sec1_point(curve, x, y).map_err(Error::invalid_key)?;
                ecdsa::verify(curve, &point, hashed, r, s)
            }
            Self::Ed25519 { point } => {
                if !ed25519::is_valid_public_key(point) {
                    return Err(Error::invalid_key("Ed25519 point does not decode"));
                }
                let [rs] = sig else {
                    malformed_err!("Ed25519 signature with {} values", sig.len());
                };
                let rs: &[u8; 64] = match (&rs[..]).try_into() {
                    Ok(rs) => rs,
                    Err(_) => malformed_err!("Ed25519 signature of {} bytes", rs.len()),
                };
                if ed25519::verify(point, rs, hashed) {
                    Ok(())
                } else {
                    Err(signature::Error::new().into())
                }
            }
            Self::Ecdh { .. } | Self::Curve25519 { .. } | Self::Elgamal { .. } => {
                unsupported_err!("{} keys can not sign", self.name())
            }
            Self::Unknown { alg, .. } => unsupported_err!("verify with {:?}", alg),
        }
    }

    /// Short algorithm name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => "RSA",
            Self::Dsa { .. } => "DSA",
            Self::Ecdsa { .. } => "ECDSA",
            Self::Ed25519 { .. } => "Ed25519",
            Self::Ecdh { .. } => "ECDH",
            Self::Curve25519 { .. } => "Curve25519",
            Self::Elgamal { .. } => "Elgamal",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Secret key material following the public part of a secret key packet.
#[derive(Clone, derive_more::Debug)]
pub enum SecretParams {
    /// Unencrypted RSA material, ready for decryption.
    Rsa(#[debug("RsaPrivateKey")] Box<::rsa::RsaPrivateKey>),
    /// Unencrypted material of an algorithm we do not decrypt with.
    Plain,
    /// Material protected by a passphrase; left as is.
    Encrypted {
        /// The S2K usage octet.
        usage: u8,
    },
}

impl SecretParams {
    /// Parses the secret part of a key packet.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.3>
    pub fn try_from_reader<B: BufRead>(public: &PublicParams, mut i: B) -> Result<Self> {
        let usage = i.read_u8()?;
        if usage != 0 {
            debug!("secret key material is encrypted (usage {})", usage);
            i.drain()?;
            return Ok(Self::Encrypted { usage });
        }

        let PublicParams::Rsa { n, e } = public else {
            debug!("unencrypted {} secret key material is not used", public.name());
            i.drain()?;
            return Ok(Self::Plain);
        };

        let d = Mpi::try_from_reader(&mut i)?;
        let p = Mpi::try_from_reader(&mut i)?;
        let q = Mpi::try_from_reader(&mut i)?;
        let u = Mpi::try_from_reader(&mut i)?;
        let expected = i.read_array::<2>()?;

        let mut raw = Vec::new();
        for mpi in [&d, &p, &q, &u] {
            raw.extend_from_slice(&mpi.to_vec());
        }
        checksum::simple(expected, &raw)?;
        ensure_eq!(i.has_remaining()?, false, "trailing secret key data");

        let key = rsa::private_key(n, e, &d, &p, &q)?;
        Ok(Self::Rsa(Box::new(key)))
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Rsa(_))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use hex_literal::hex;

    use super::*;
    use crate::errors::Error;

    const ED25519_OID: [u8; 9] = hex!("2B06010401DA470F01");
    const CURVE25519_OID: [u8; 10] = hex!("2B060104019755010501");

    fn curve_key(oid: &[u8], point: &[u8], kdf: Option<&[u8]>) -> Vec<u8> {
        let mut raw = vec![oid.len() as u8];
        raw.extend_from_slice(oid);
        Mpi::from_slice(point).to_writer(&mut raw).unwrap();
        if let Some(kdf) = kdf {
            raw.push(kdf.len() as u8);
            raw.extend_from_slice(kdf);
        }
        raw
    }

    #[test]
    fn rsa_values() {
        let raw = hex!("0009 01FF 0011 010001");
        let params = PublicParams::try_from_reader(PublicKeyAlgorithm::RSA, &raw[..]).unwrap();
        assert_eq!(params.values(), vec![&[0x01, 0xFF][..], &[0x01, 0x00, 0x01][..]]);
    }

    #[test]
    fn eddsa_remaps_to_ed25519() {
        let mut point = vec![0x40];
        point.extend_from_slice(&[7u8; 32]);
        let raw = curve_key(&ED25519_OID, &point, None);

        let params = PublicParams::try_from_reader(PublicKeyAlgorithm::EdDSA, &raw[..]).unwrap();
        assert_eq!(params, PublicParams::Ed25519 { point: [7u8; 32] });
        assert_eq!(params.values(), vec![&[7u8; 32][..]]);

        // prefix missing
        let raw = curve_key(&ED25519_OID, &[7u8; 33], None);
        assert!(PublicParams::try_from_reader(PublicKeyAlgorithm::EdDSA, &raw[..]).is_err());
    }

    #[test]
    fn ecdh_remaps_to_curve25519() {
        let mut point = vec![0x40];
        point.extend_from_slice(&[9u8; 32]);
        let kdf = hex!("010807");
        let raw = curve_key(&CURVE25519_OID, &point, Some(&kdf));

        let params = PublicParams::try_from_reader(PublicKeyAlgorithm::ECDH, &raw[..]).unwrap();
        assert_eq!(
            params,
            PublicParams::Curve25519 {
                point: [9u8; 32],
                kdf: Bytes::copy_from_slice(&kdf),
            }
        );
        assert!(matches!(
            params.verify(HashAlgorithm::Sha256, &[], &[]),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn ecdsa_values_lead_with_curve_name() {
        let mut point = vec![0x04];
        point.extend_from_slice(&[1u8; 32]);
        point.extend_from_slice(&[2u8; 32]);
        let raw = curve_key(&EccCurve::P256.oid(), &point, None);

        let params = PublicParams::try_from_reader(PublicKeyAlgorithm::ECDSA, &raw[..]).unwrap();
        assert_eq!(
            params.values(),
            vec![&b"nistp256"[..], &[1u8; 32][..], &[2u8; 32][..]]
        );
    }

    #[test]
    fn reserved_oid_length() {
        let raw = hex!("00 0001 01");
        assert!(matches!(
            PublicParams::try_from_reader(PublicKeyAlgorithm::ECDSA, &raw[..]),
            Err(Error::MalformedPacket { .. })
        ));
    }

    #[test]
    fn unknown_algorithm_is_carried() {
        let raw = hex!("DEADBEEF");
        let params =
            PublicParams::try_from_reader(PublicKeyAlgorithm::Unknown(99), &raw[..]).unwrap();
        assert_eq!(params.values(), vec![&raw[..]]);
    }

    #[test]
    fn encrypted_secret_is_skipped() {
        let public = PublicParams::Rsa {
            n: Mpi::from_slice(&[0xC5]),
            e: Mpi::from_slice(&[0x03]),
        };
        let raw = hex!("FE 09 03 08 0102030405060708 60");
        let secret = SecretParams::try_from_reader(&public, &raw[..]).unwrap();
        assert!(matches!(secret, SecretParams::Encrypted { usage: 0xFE }));
        assert!(!secret.is_usable());
    }
}
