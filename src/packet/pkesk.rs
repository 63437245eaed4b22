use std::io::BufRead;

use bytes::Bytes;
use log::debug;

use crate::{
    crypto::public_key::PublicKeyAlgorithm,
    errors::{unsupported_err, Result},
    parsing_reader::BufReadParsing,
    types::{KeyId, Mpi},
};

/// The algorithm specific session key material of a PKESK.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum EncryptedSessionKey {
    Rsa { mpi: Mpi },
    Elgamal { first: Mpi, second: Mpi },
    /// Material of algorithms we do not decrypt, kept as is.
    Other {
        #[debug("{}", hex::encode(data))]
        data: Bytes,
    },
}

/// Public-Key Encrypted Session Key Packet
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.1>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEncryptedSessionKey {
    /// The recipient. All zeros for anonymous recipients.
    pub id: KeyId,
    pub pub_alg: PublicKeyAlgorithm,
    pub values: EncryptedSessionKey,
}

impl PublicKeyEncryptedSessionKey {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 3 {
            unsupported_err!("PKESK version {}", version);
        }

        let id = KeyId::new(i.read_array()?);
        let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);

        let values = match pub_alg {
            PublicKeyAlgorithm::RSA
            | PublicKeyAlgorithm::RSAEncrypt
            | PublicKeyAlgorithm::RSASign => EncryptedSessionKey::Rsa {
                mpi: Mpi::try_from_reader(&mut i)?,
            },
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalSign => {
                EncryptedSessionKey::Elgamal {
                    first: Mpi::try_from_reader(&mut i)?,
                    second: Mpi::try_from_reader(&mut i)?,
                }
            }
            _ => EncryptedSessionKey::Other {
                data: i.rest()?.freeze(),
            },
        };
        i.drain()?;

        debug!("PKESK for {:?} ({:?})", id, pub_alg);
        Ok(Self {
            id,
            pub_alg,
            values,
        })
    }
}
