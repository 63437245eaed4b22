use const_oid::ObjectIdentifier;

/// Elliptic curves known by OID.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EccCurve {
    Curve25519,
    Ed25519,
    P256,
    P384,
    P521,
    BrainpoolP256r1,
    BrainpoolP384r1,
    BrainpoolP512r1,
    BrainpoolP512t1,
    Unknown(ObjectIdentifier),
}

/// DER encoded OID bodies, as they appear on the wire in OpenPGP key packets.
const CURVES: &[(EccCurve, &[u8])] = &[
    (EccCurve::P256, &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07]),
    (EccCurve::P384, &[0x2B, 0x81, 0x04, 0x00, 0x22]),
    (EccCurve::P521, &[0x2B, 0x81, 0x04, 0x00, 0x23]),
    (
        EccCurve::BrainpoolP256r1,
        &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07],
    ),
    (
        EccCurve::BrainpoolP384r1,
        &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0B],
    ),
    (
        EccCurve::BrainpoolP512r1,
        &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0D],
    ),
    (
        EccCurve::BrainpoolP512t1,
        &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0E],
    ),
    (
        EccCurve::Ed25519,
        &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01],
    ),
    (
        EccCurve::Curve25519,
        &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01],
    ),
];

impl EccCurve {
    /// Looks up a curve by its DER encoded OID body.
    ///
    /// Returns `None` only if the bytes are not a valid OID at all.
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        if let Some((curve, _)) = CURVES.iter().find(|(_, known)| *known == oid) {
            return Some(curve.clone());
        }
        ObjectIdentifier::from_bytes(oid).ok().map(Self::Unknown)
    }

    /// Looks up a curve by the name SSH uses in `ecdsa-sha2-*` keys.
    pub fn from_ssh_name(name: &str) -> Option<Self> {
        match name {
            "nistp256" => Some(Self::P256),
            "nistp384" => Some(Self::P384),
            "nistp521" => Some(Self::P521),
            _ => None,
        }
    }

    pub fn oid(&self) -> Vec<u8> {
        match self {
            Self::Unknown(oid) => oid.as_bytes().to_vec(),
            known => CURVES
                .iter()
                .find(|(curve, _)| curve == known)
                .map(|(_, oid)| oid.to_vec())
                .unwrap_or_default(),
        }
    }

    /// Standard name.
    ///
    /// The NIST names keep their bit size as suffix, which selects the
    /// hash for SSH ECDSA signatures.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Curve25519 => "Curve25519",
            Self::Ed25519 => "Ed25519",
            Self::P256 => "nistp256",
            Self::P384 => "nistp384",
            Self::P521 => "nistp521",
            Self::BrainpoolP256r1 => "brainpoolP256r1",
            Self::BrainpoolP384r1 => "brainpoolP384r1",
            Self::BrainpoolP512r1 => "brainpoolP512r1",
            Self::BrainpoolP512t1 => "brainpoolP512t1",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Width in bytes of a single affine coordinate.
    pub fn coordinate_len(&self) -> Option<usize> {
        match self {
            Self::P256 | Self::BrainpoolP256r1 => Some(32),
            Self::P384 | Self::BrainpoolP384r1 => Some(48),
            Self::P521 => Some(66),
            Self::BrainpoolP512r1 | Self::BrainpoolP512t1 => Some(64),
            Self::Curve25519 | Self::Ed25519 => Some(32),
            Self::Unknown(_) => None,
        }
    }
}

impl std::fmt::Display for EccCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(oid) => write!(f, "unknown curve {oid}"),
            known => f.write_str(known.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_curve_oids() {
        for (curve, oid) in CURVES {
            assert_eq!(&curve.oid(), oid);
            assert_eq!(&EccCurve::from_oid(oid).unwrap(), curve);
        }
        assert_eq!(
            EccCurve::Ed25519.oid(),
            vec![0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01]
        );
    }

    #[test]
    fn test_unknown_curve() {
        // secp256k1
        let oid = [0x2B, 0x81, 0x04, 0x00, 0x0A];
        let curve = EccCurve::from_oid(&oid).unwrap();
        assert!(matches!(curve, EccCurve::Unknown(_)));
        assert_eq!(curve.oid(), oid.to_vec());
        assert_eq!(curve.coordinate_len(), None);
    }
}
