use num_enum::{FromPrimitive, IntoPrimitive};

/// Public key algorithm ids.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.1>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt and Sign)
    RSA = 1,
    /// DEPRECATED: RSA (Encrypt-Only)
    RSAEncrypt = 2,
    /// DEPRECATED: RSA (Sign-Only)
    RSASign = 3,
    /// Elgamal (Encrypt-Only)
    Elgamal = 16,
    DSA = 17,
    /// Elliptic Curve Diffie-Hellman: RFC 6637
    ECDH = 18,
    /// ECDSA: RFC 6637
    ECDSA = 19,
    /// DEPRECATED: Elgamal (Encrypt and Sign)
    ElgamalSign = 20,
    /// EdDSA, as used by GnuPG for Ed25519 keys.
    EdDSA = 22,

    #[num_enum(catch_all)]
    Unknown(#[cfg_attr(test, proptest(strategy = "23u8.."))] u8),
}

impl PublicKeyAlgorithm {
    pub fn is_rsa(self) -> bool {
        matches!(self, Self::RSA | Self::RSAEncrypt | Self::RSASign)
    }

    pub fn is_elgamal(self) -> bool {
        matches!(self, Self::Elgamal | Self::ElgamalSign)
    }
}
