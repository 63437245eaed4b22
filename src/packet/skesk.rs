use std::io::BufRead;

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::{
    crypto::sym::SymmetricKeyAlgorithm,
    errors::{bail, ensure, unsupported_err, Result},
    parsing_reader::BufReadParsing,
    types::StringToKey,
};

/// Symmetric-Key Encrypted Session Key Packet
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.3>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SymKeyEncryptedSessionKey {
    pub sym_alg: SymmetricKeyAlgorithm,
    pub s2k: StringToKey,
    /// Absent when the S2K output is the session key itself.
    #[debug("{:?}", encrypted_key.as_ref().map(hex::encode))]
    pub encrypted_key: Option<Bytes>,
}

impl SymKeyEncryptedSessionKey {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 4 {
            unsupported_err!("SKESK version {}", version);
        }

        let sym_alg = SymmetricKeyAlgorithm::from(i.read_u8()?);
        let s2k = StringToKey::try_from_reader(&mut i)?;
        let rest = i.rest()?.freeze();
        let encrypted_key = (!rest.is_empty()).then_some(rest);

        Ok(Self {
            sym_alg,
            s2k,
            encrypted_key,
        })
    }

    /// Derives the session key from `password`.
    pub fn decrypt(&self, password: &[u8]) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        let key_size = self.sym_alg.key_size();
        ensure!(key_size > 0, "invalid SKESK cipher {:?}", self.sym_alg);
        let key = self.s2k.derive_key(password, key_size)?;

        let Some(encrypted_key) = &self.encrypted_key else {
            return Ok((self.sym_alg, key));
        };

        let iv = vec![0u8; self.sym_alg.block_size()];
        let mut decrypted = Zeroizing::new(encrypted_key.to_vec());
        self.sym_alg
            .decrypt_with_iv_regular(&key, &iv, &mut decrypted)?;

        let Some((alg, session_key)) = decrypted.split_first() else {
            bail!("empty encrypted session key");
        };
        let alg = SymmetricKeyAlgorithm::from(*alg);
        ensure!(
            alg.key_size() > 0 && alg.key_size() == session_key.len(),
            "invalid session key for {:?} (wrong password?)",
            alg
        );

        Ok((alg, Zeroizing::new(session_key.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use aes::Aes128;
    use cfb_mode::{
        cipher::{AsyncStreamCipher, KeyIvInit},
        Encryptor,
    };
    use hex_literal::hex;

    use super::*;
    use crate::crypto::hash::HashAlgorithm;

    const SALT: [u8; 8] = hex!("0102030405060708");

    #[test]
    fn parse_and_derive_directly() {
        let raw = hex!("04 07 03 08 0102030405060708 60");
        let skesk = SymKeyEncryptedSessionKey::try_from_reader(&raw[..]).unwrap();
        assert_eq!(skesk.sym_alg, SymmetricKeyAlgorithm::AES128);
        assert_eq!(skesk.encrypted_key, None);

        let (alg, key) = skesk.decrypt(b"hello").unwrap();
        assert_eq!(alg, SymmetricKeyAlgorithm::AES128);
        // first half of the iterated SHA-256 output for this salt and count
        assert_eq!(&key[..], &hex!("ee34c35235811eb5d0f3fd583d1e4819")[..]);
    }

    #[test]
    fn encrypted_session_key() {
        let s2k = StringToKey::Salted {
            hash_alg: HashAlgorithm::Sha256,
            salt: SALT,
        };
        let kek = s2k.derive_key(b"pw", 16).unwrap();

        let mut esk = vec![9u8];
        esk.extend_from_slice(&[0x5A; 32]);
        Encryptor::<Aes128>::new_from_slices(&kek, &[0u8; 16])
            .unwrap()
            .encrypt(&mut esk);

        let skesk = SymKeyEncryptedSessionKey {
            sym_alg: SymmetricKeyAlgorithm::AES128,
            s2k,
            encrypted_key: Some(esk.into()),
        };
        let (alg, key) = skesk.decrypt(b"pw").unwrap();
        assert_eq!(alg, SymmetricKeyAlgorithm::AES256);
        assert_eq!(&key[..], &[0x5A; 32][..]);

        assert!(skesk.decrypt(b"wrong").is_err());
    }

    #[test]
    fn other_versions() {
        assert!(SymKeyEncryptedSessionKey::try_from_reader(&hex!("05 07")[..]).is_err());
    }
}
