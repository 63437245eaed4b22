use std::io::{self, BufRead, Read};

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use bytes::{Buf, BytesMut};
use camellia::{Camellia128, Camellia192, Camellia256};
use cast5::Cast5;
use cfb_mode::{cipher::KeyIvInit, BufDecryptor};
use cipher::{BlockCipher, BlockEncryptMut, BlockSizeUser};
use des::TdesEde3;
use idea::Idea;
use log::debug;
use sha1::{Digest, Sha1};
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::{
    crypto::sym::SymmetricKeyAlgorithm,
    errors::{unsupported_err, Error, Result},
    util::{fill_buffer, fill_buffer_bytes},
};

/// MDC packet: 1 byte tag, 1 byte length and a SHA-1 digest.
const MDC_LEN: usize = 22;
pub(crate) const BUFFER_SIZE: usize = 1024 * 8;

/// OpenPGP CFB decryption over a [`BufRead`] ciphertext source.
#[allow(clippy::large_enum_variant)]
pub enum StreamDecryptor<R: BufRead> {
    Idea(StreamDecryptorInner<Idea, R>),
    TripleDes(StreamDecryptorInner<TdesEde3, R>),
    Cast5(StreamDecryptorInner<Cast5, R>),
    Blowfish(StreamDecryptorInner<Blowfish, R>),
    Aes128(StreamDecryptorInner<Aes128, R>),
    Aes192(StreamDecryptorInner<Aes192, R>),
    Aes256(StreamDecryptorInner<Aes256, R>),
    Twofish(StreamDecryptorInner<Twofish, R>),
    Camellia128(StreamDecryptorInner<Camellia128, R>),
    Camellia192(StreamDecryptorInner<Camellia192, R>),
    Camellia256(StreamDecryptorInner<Camellia256, R>),
}

macro_rules! dispatch {
    ($self:expr, $i:ident => $body:expr) => {
        match $self {
            Self::Idea($i) => $body,
            Self::TripleDes($i) => $body,
            Self::Cast5($i) => $body,
            Self::Blowfish($i) => $body,
            Self::Aes128($i) => $body,
            Self::Aes192($i) => $body,
            Self::Aes256($i) => $body,
            Self::Twofish($i) => $body,
            Self::Camellia128($i) => $body,
            Self::Camellia192($i) => $body,
            Self::Camellia256($i) => $body,
        }
    };
}

impl<R: BufRead> BufRead for StreamDecryptor<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        dispatch!(self, i => i.fill_buf())
    }

    fn consume(&mut self, amt: usize) {
        dispatch!(self, i => i.consume(amt))
    }
}

impl<R: BufRead> Read for StreamDecryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        dispatch!(self, i => i.read(buf))
    }
}

impl<R: BufRead> StreamDecryptor<R> {
    pub fn new(
        alg: SymmetricKeyAlgorithm,
        protected: bool,
        key: &[u8],
        ciphertext: R,
    ) -> Result<Self> {
        let this = match alg {
            SymmetricKeyAlgorithm::IDEA => {
                Self::Idea(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::TripleDES => {
                Self::TripleDes(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::CAST5 => {
                Self::Cast5(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::Blowfish => {
                Self::Blowfish(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::AES128 => {
                Self::Aes128(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::AES192 => {
                Self::Aes192(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::AES256 => {
                Self::Aes256(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::Twofish => {
                Self::Twofish(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::Camellia128 => {
                Self::Camellia128(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::Camellia192 => {
                Self::Camellia192(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::Camellia256 => {
                Self::Camellia256(StreamDecryptorInner::new(protected, ciphertext, key)?)
            }
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => {
                unsupported_err!("symmetric algorithm {}", u8::from(alg))
            }
        };
        Ok(this)
    }

    /// The ciphertext source, `None` if the decryptor is poisoned.
    pub fn get_mut(&mut self) -> Option<&mut R> {
        dispatch!(self, i => i.get_mut())
    }
}

pub enum MaybeProtected {
    Protected { hasher: Sha1 },
    Unprotected { key: Zeroizing<Vec<u8>> },
}

impl MaybeProtected {
    fn is_protected(&self) -> bool {
        matches!(self, Self::Protected { .. })
    }
}

pub enum StreamDecryptorInner<M, R>
where
    M: BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    Prefix {
        decryptor: BufDecryptor<M>,
        source: R,
        protected: MaybeProtected,
    },
    Data {
        /// Decrypted bytes at the front of `buffer` that may be handed out.
        /// When protected, the trailing `MDC_LEN` bytes are always held back.
        data_available: usize,
        decryptor: BufDecryptor<M>,
        buffer: BytesMut,
        source: R,
        protected: MaybeProtected,
    },
    Done {
        buffer: BytesMut,
        source: R,
    },
    Error,
}

fn poisoned() -> io::Error {
    io::Error::other("decryptor is in an error state")
}

impl<M, R> StreamDecryptorInner<M, R>
where
    M: BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    fn new(protected: bool, source: R, key: &[u8]) -> Result<Self> {
        debug!("cfb decrypt stream, protected: {protected}");

        // IV is all zeroes
        let iv = vec![0u8; <M as BlockSizeUser>::block_size()];
        let decryptor = BufDecryptor::<M>::new_from_slices(key, &iv)?;

        let protected = if protected {
            MaybeProtected::Protected {
                hasher: Sha1::default(),
            }
        } else {
            MaybeProtected::Unprotected {
                key: key.to_vec().into(),
            }
        };

        Ok(Self::Prefix {
            decryptor,
            source,
            protected,
        })
    }

    fn get_mut(&mut self) -> Option<&mut R> {
        match self {
            Self::Prefix { source, .. } | Self::Data { source, .. } | Self::Done { source, .. } => {
                Some(source)
            }
            Self::Error => None,
        }
    }

    fn fill_inner(&mut self) -> io::Result<()> {
        loop {
            let (needs_replacing, should_return) = match self {
                Self::Prefix { .. } => (true, false),
                Self::Data {
                    data_available,
                    decryptor,
                    buffer,
                    source,
                    protected,
                } => {
                    if protected.is_protected() && buffer.remaining() > MDC_LEN
                        || !protected.is_protected() && *data_available > 0
                    {
                        (false, true)
                    } else {
                        let current_len = buffer.remaining();
                        let to_read = BUFFER_SIZE - current_len;
                        let read = fill_buffer_bytes(source, buffer, BUFFER_SIZE)?;
                        let is_last_read = read < to_read;
                        decryptor.decrypt(&mut buffer[current_len..]);

                        match protected {
                            _ if is_last_read => (true, true),
                            MaybeProtected::Protected { hasher } => {
                                // everything but the possible MDC is final
                                let start = *data_available;
                                let end = buffer.len() - MDC_LEN;
                                if start < end {
                                    hasher.update(&buffer[start..end]);
                                    *data_available = end;
                                }
                                (false, true)
                            }
                            MaybeProtected::Unprotected { .. } => {
                                *data_available = buffer.len();
                                (false, true)
                            }
                        }
                    }
                }
                Self::Done { .. } => (false, true),
                Self::Error => return Err(poisoned()),
            };

            if needs_replacing {
                match std::mem::replace(self, Self::Error) {
                    Self::Prefix {
                        mut decryptor,
                        mut source,
                        mut protected,
                    } => {
                        let bs = <M as BlockSizeUser>::block_size();

                        let mut prefix = vec![0u8; bs + 2];
                        let read = fill_buffer(&mut source, &mut prefix)?;
                        if read < bs + 2 {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "missing quick check",
                            ));
                        }

                        match &mut protected {
                            MaybeProtected::Unprotected { key } => {
                                // legacy resync: the IV for the data is the
                                // ciphertext following the first two bytes
                                let resync_iv = prefix[2..].to_vec();
                                decryptor.decrypt(&mut prefix);
                                decryptor = BufDecryptor::<M>::new_from_slices(&key[..], &resync_iv)
                                    .map_err(|_| {
                                        io::Error::new(io::ErrorKind::InvalidInput, "invalid IV")
                                    })?;
                            }
                            MaybeProtected::Protected { hasher } => {
                                decryptor.decrypt(&mut prefix);
                                hasher.update(&prefix);
                            }
                        }

                        if prefix[bs - 2..bs] != prefix[bs..] {
                            debug!("quick check failed");
                            return Err(Error::ChecksumMismatch {
                                message: "session key quick check".to_string(),
                            }
                            .into());
                        }

                        *self = Self::Data {
                            data_available: 0,
                            decryptor,
                            buffer: BytesMut::with_capacity(BUFFER_SIZE),
                            source,
                            protected,
                        };
                    }
                    Self::Data {
                        mut buffer,
                        source,
                        protected,
                        data_available,
                        ..
                    } => {
                        if let MaybeProtected::Protected { mut hasher } = protected {
                            if buffer.remaining() < MDC_LEN {
                                return Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    "missing MDC",
                                ));
                            }

                            let mdc = buffer.split_off(buffer.len() - MDC_LEN);

                            if data_available < buffer.len() {
                                hasher.update(&buffer[data_available..]);
                            }
                            hasher.update(&mdc[..2]);
                            let sha1: [u8; 20] = hasher.finalize().into();

                            if mdc[0] != 0xD3 || mdc[1] != 0x14 || mdc[2..] != sha1[..] {
                                debug!("MDC mismatch");
                                return Err(Error::MdcError.into());
                            }
                        }

                        *self = Self::Done { buffer, source };
                    }
                    Self::Done { .. } | Self::Error => return Err(poisoned()),
                }
            }

            if should_return {
                return Ok(());
            }
        }
    }
}

impl<M, R> BufRead for StreamDecryptorInner<M, R>
where
    M: BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill_inner()?;
        match self {
            Self::Data {
                buffer,
                data_available,
                ..
            } => Ok(&buffer[..*data_available]),
            Self::Done { buffer, .. } => Ok(&buffer[..]),
            Self::Prefix { .. } | Self::Error => Err(poisoned()),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::Data {
                buffer,
                data_available,
                ..
            } => {
                buffer.advance(amt);
                *data_available -= amt;
            }
            Self::Done { buffer, .. } => {
                buffer.advance(amt);
            }
            Self::Prefix { .. } | Self::Error => {}
        }
    }
}

impl<M, R> Read for StreamDecryptorInner<M, R>
where
    M: BlockEncryptMut + BlockCipher,
    BufDecryptor<M>: KeyIvInit,
    R: BufRead,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}
