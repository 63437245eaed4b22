use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use camellia::{Camellia128, Camellia192, Camellia256};
use cast5::Cast5;
use cfb_mode::{
    cipher::{AsyncStreamCipher, KeyIvInit},
    Decryptor,
};
use des::TdesEde3;
use idea::Idea;
use num_enum::{FromPrimitive, IntoPrimitive};
use twofish::Twofish;

use crate::errors::{bail, unimplemented_err, Result};

mod decryptor;

pub use self::decryptor::StreamDecryptor;

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.2>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    #[cfg_attr(test, proptest(skip))]
    Plaintext = 0,
    IDEA = 1,
    TripleDES = 2,
    CAST5 = 3,
    Blowfish = 4,
    // 5 & 6 are reserved for DES/SK
    AES128 = 7,
    AES192 = 8,
    AES256 = 9,
    /// Twofish with 256-bit key
    Twofish = 10,
    /// [Camellia](https://tools.ietf.org/html/rfc5581#section-3) with 128-bit key
    Camellia128 = 11,
    Camellia192 = 12,
    Camellia256 = 13,

    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "14u8.."))] u8),
}

impl zeroize::DefaultIsZeroes for SymmetricKeyAlgorithm {}

#[allow(clippy::derivable_impls)]
impl Default for SymmetricKeyAlgorithm {
    fn default() -> Self {
        Self::AES128
    }
}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    pub fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::IDEA
            | SymmetricKeyAlgorithm::TripleDES
            | SymmetricKeyAlgorithm::CAST5
            | SymmetricKeyAlgorithm::Blowfish => 8,
            SymmetricKeyAlgorithm::AES128
            | SymmetricKeyAlgorithm::AES192
            | SymmetricKeyAlgorithm::AES256
            | SymmetricKeyAlgorithm::Twofish
            | SymmetricKeyAlgorithm::Camellia128
            | SymmetricKeyAlgorithm::Camellia192
            | SymmetricKeyAlgorithm::Camellia256 => 16,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The size of the key in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::IDEA => 16,
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::Blowfish => 16,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 => 32,
            SymmetricKeyAlgorithm::Twofish => 32,
            SymmetricKeyAlgorithm::Camellia128 => 16,
            SymmetricKeyAlgorithm::Camellia192 => 24,
            SymmetricKeyAlgorithm::Camellia256 => 32,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// Decrypt the data using CFB mode, without padding. Overwrites the input.
    /// This is regular CFB, not OpenPGP CFB.
    pub fn decrypt_with_iv_regular(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        match self {
            SymmetricKeyAlgorithm::Plaintext => {
                bail!("'Plaintext' is not a legal cipher for encrypted data")
            }
            SymmetricKeyAlgorithm::IDEA => {
                Decryptor::<Idea>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::TripleDES => {
                Decryptor::<TdesEde3>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::CAST5 => {
                Decryptor::<Cast5>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::Blowfish => {
                Decryptor::<Blowfish>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::AES128 => {
                Decryptor::<Aes128>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::AES192 => {
                Decryptor::<Aes192>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::AES256 => {
                Decryptor::<Aes256>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::Twofish => {
                Decryptor::<Twofish>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::Camellia128 => {
                Decryptor::<Camellia128>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::Camellia192 => {
                Decryptor::<Camellia192>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::Camellia256 => {
                Decryptor::<Camellia256>::new_from_slices(key, iv)?.decrypt(data);
            }
            SymmetricKeyAlgorithm::Other(_) => {
                unimplemented_err!("SymmetricKeyAlgorithm {} is unsupported", u8::from(self))
            }
        }

        Ok(())
    }

    /// Streaming decryption of an integrity protected (SEIPD v1) body.
    pub fn stream_decryptor_protected<R>(self, key: &[u8], ciphertext: R) -> Result<StreamDecryptor<R>>
    where
        R: std::io::BufRead,
    {
        StreamDecryptor::new(self, true, key, ciphertext)
    }

    /// Streaming decryption of a legacy, unprotected (SED) body.
    pub fn stream_decryptor_unprotected<R>(
        self,
        key: &[u8],
        ciphertext: R,
    ) -> Result<StreamDecryptor<R>>
    where
        R: std::io::BufRead,
    {
        StreamDecryptor::new(self, false, key, ciphertext)
    }
}
