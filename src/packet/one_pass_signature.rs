use std::io::BufRead;

use crate::{
    crypto::{hash::HashAlgorithm, public_key::PublicKeyAlgorithm},
    errors::{unsupported_err, Result},
    packet::SignatureType,
    parsing_reader::BufReadParsing,
    types::KeyId,
};

/// One-Pass Signature Packet
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.4>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnePassSignature {
    pub typ: SignatureType,
    pub hash_alg: HashAlgorithm,
    pub pub_alg: PublicKeyAlgorithm,
    pub key_id: KeyId,
    /// `false` if another one-pass signature follows that covers this one too.
    pub last: bool,
}

impl OnePassSignature {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 3 {
            unsupported_err!("one pass signature version {}", version);
        }

        let typ = SignatureType::from(i.read_u8()?);
        let hash_alg = HashAlgorithm::from(i.read_u8()?);
        let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
        let key_id = KeyId::new(i.read_array()?);
        let last = i.read_u8()? != 0;

        Ok(Self {
            typ,
            hash_alg,
            pub_alg,
            key_id,
            last,
        })
    }
}
