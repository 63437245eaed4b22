use std::io::BufRead;

use num_enum::{FromPrimitive, IntoPrimitive};
use zeroize::Zeroizing;

use crate::{
    crypto::hash::HashAlgorithm,
    errors::{unsupported_err, Result},
    parsing_reader::BufReadParsing,
};

const EXPBIAS: u32 = 6;

/// Available String-To-Key types
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum StringToKeyType {
    Simple = 0,
    Salted = 1,
    IteratedAndSalted = 3,
    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "4u8.."))] u8),
}

/// A String-To-Key specifier.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.7>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum StringToKey {
    Simple {
        hash_alg: HashAlgorithm,
    },
    Salted {
        hash_alg: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
    },
    IteratedAndSalted {
        hash_alg: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
        /// The coded count, see [`StringToKey::count`].
        count: u8,
    },
}

impl StringToKey {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let typ = StringToKeyType::from(i.read_u8()?);
        let hash_alg = HashAlgorithm::from(i.read_u8()?);

        let s2k = match typ {
            StringToKeyType::Simple => StringToKey::Simple { hash_alg },
            StringToKeyType::Salted => StringToKey::Salted {
                hash_alg,
                salt: i.read_array::<8>()?,
            },
            StringToKeyType::IteratedAndSalted => {
                let salt = i.read_array::<8>()?;
                let count = i.read_u8()?;
                StringToKey::IteratedAndSalted {
                    hash_alg,
                    salt,
                    count,
                }
            }
            StringToKeyType::Other(t) => unsupported_err!("s2k type {}", t),
        };

        Ok(s2k)
    }

    pub fn typ(&self) -> StringToKeyType {
        match self {
            Self::Simple { .. } => StringToKeyType::Simple,
            Self::Salted { .. } => StringToKeyType::Salted,
            Self::IteratedAndSalted { .. } => StringToKeyType::IteratedAndSalted,
        }
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        match self {
            Self::Simple { hash_alg }
            | Self::Salted { hash_alg, .. }
            | Self::IteratedAndSalted { hash_alg, .. } => *hash_alg,
        }
    }

    /// Decodes the coded iteration count into the number of octets to hash.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.7.1.3>
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::IteratedAndSalted { count, .. } => {
                let c = u32::from(*count);
                Some(((16 + (c & 15)) << ((c >> 4) + EXPBIAS)) as usize)
            }
            _ => None,
        }
    }

    /// Derives `key_size` bytes of key material from `password`.
    ///
    /// When the digest is shorter than the key, additional hash contexts are
    /// run, each preloaded with one more zero octet than the previous one.
    pub fn derive_key(&self, password: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>> {
        let hash_alg = self.hash_alg();
        let Some(digest_size) = hash_alg.digest_size() else {
            unsupported_err!("s2k with hash {}", hash_alg);
        };
        let rounds = key_size.div_ceil(digest_size);
        let mut key = Zeroizing::new(Vec::with_capacity(rounds * digest_size));

        for round in 0..rounds {
            let mut hasher = hash_alg.new_hasher()?;
            hasher.update(&vec![0u8; round]);

            match self {
                Self::Simple { .. } => hasher.update(password),
                Self::Salted { salt, .. } => {
                    hasher.update(salt);
                    hasher.update(password);
                }
                Self::IteratedAndSalted { salt, .. } => {
                    let data_len = salt.len() + password.len();
                    // the whole of salt and password is hashed at least once
                    let count = self.count().unwrap_or_default().max(data_len);

                    for _ in 0..count / data_len {
                        hasher.update(salt);
                        hasher.update(password);
                    }

                    let rest = count % data_len;
                    if rest <= salt.len() {
                        hasher.update(&salt[..rest]);
                    } else {
                        hasher.update(salt);
                        hasher.update(&password[..rest - salt.len()]);
                    }
                }
            }

            key.extend_from_slice(&hasher.finalize());
        }

        key.truncate(key_size);
        Ok(key)
    }
}
