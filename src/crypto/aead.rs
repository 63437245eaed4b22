//! Chunked AEAD decryption for the GnuPG AEAD Encrypted Data packet (tag 20).

use std::io::{self, BufRead, Read};

use aes::{Aes128, Aes192, Aes256};
use bytes::{Buf, BytesMut};
use camellia::{Camellia128, Camellia192, Camellia256};
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};
use twofish::Twofish;

use crate::{
    crypto::{
        ocb::{Ocb, TAG_SIZE},
        sym::SymmetricKeyAlgorithm,
    },
    errors::{ensure, unsupported_err, Result},
    types::Tag,
    util::fill_buffer_bytes,
};

/// Largest accepted chunk size octet, `1 << (16 + 6)` = 4 MiB chunks.
pub const MAX_CHUNK_SIZE_BYTE: u8 = 16;

/// Length of the IV of an OCB encrypted packet.
pub const OCB_IV_LEN: usize = 15;

/// Available AEAD algorithms.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum AeadAlgorithm {
    Eax = 1,
    Ocb = 2,
    Gcm = 3,

    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "4u8.."))] u8),
}

impl AeadAlgorithm {
    /// Nonce/IV size in bytes.
    pub fn iv_size(self) -> Option<usize> {
        match self {
            Self::Eax => Some(16),
            Self::Ocb => Some(OCB_IV_LEN),
            Self::Gcm => Some(12),
            Self::Other(_) => None,
        }
    }
}

/// Expands the chunk size octet `c` into `1 << (c + 6)` bytes.
pub fn chunk_size(c: u8) -> Result<usize> {
    ensure!(
        c <= MAX_CHUNK_SIZE_BYTE,
        "chunk size octet {} is too large",
        c
    );
    Ok(1usize << (c + 6))
}

/// A keyed AEAD, decrypting one chunk at a time.
trait ChunkDecrypt {
    fn decrypt_in_place(
        &mut self,
        nonce: &[u8],
        ad: &[u8],
        buffer: &mut [u8],
        tag: &[u8],
    ) -> Result<()>;
}

impl<C> ChunkDecrypt for Ocb<C>
where
    C: cipher::BlockEncrypt + cipher::BlockDecrypt + cipher::BlockSizeUser<BlockSize = cipher::consts::U16>,
{
    fn decrypt_in_place(
        &mut self,
        nonce: &[u8],
        ad: &[u8],
        buffer: &mut [u8],
        tag: &[u8],
    ) -> Result<()> {
        Ocb::decrypt_in_place(self, nonce, ad, buffer, tag)
    }
}

fn ocb_for(sym_alg: SymmetricKeyAlgorithm, key: &[u8]) -> Result<Box<dyn ChunkDecrypt + Send>> {
    let ocb: Box<dyn ChunkDecrypt + Send> = match sym_alg {
        SymmetricKeyAlgorithm::AES128 => Box::new(Ocb::<Aes128>::new_from_slice(key)?),
        SymmetricKeyAlgorithm::AES192 => Box::new(Ocb::<Aes192>::new_from_slice(key)?),
        SymmetricKeyAlgorithm::AES256 => Box::new(Ocb::<Aes256>::new_from_slice(key)?),
        SymmetricKeyAlgorithm::Twofish => Box::new(Ocb::<Twofish>::new_from_slice(key)?),
        SymmetricKeyAlgorithm::Camellia128 => Box::new(Ocb::<Camellia128>::new_from_slice(key)?),
        SymmetricKeyAlgorithm::Camellia192 => Box::new(Ocb::<Camellia192>::new_from_slice(key)?),
        SymmetricKeyAlgorithm::Camellia256 => Box::new(Ocb::<Camellia256>::new_from_slice(key)?),
        _ => unsupported_err!("OCB with {:?}", sym_alg),
    };
    Ok(ocb)
}

/// Streaming decryption of chunked AEAD data.
///
/// Each chunk of `chunk_size` bytes is followed by its tag. A final tag over
/// the empty string, whose associated data carries the total plaintext
/// length, closes the stream and guards against truncation.
#[derive(derive_more::Debug)]
pub struct StreamDecryptor<R: BufRead> {
    #[debug(skip)]
    aead: Box<dyn ChunkDecrypt + Send>,
    chunk_size: usize,
    /// Plaintext bytes produced so far.
    written: u64,
    chunk_index: u64,
    #[debug("{}", hex::encode(iv))]
    iv: Vec<u8>,
    ad: [u8; 5],
    #[debug(skip)]
    source: R,
    is_source_done: bool,
    #[debug("{} bytes", in_buffer.len())]
    in_buffer: BytesMut,
    #[debug("{} bytes", out_buffer.len())]
    out_buffer: BytesMut,
}

impl<R: BufRead> StreamDecryptor<R> {
    pub fn new(
        sym_alg: SymmetricKeyAlgorithm,
        aead: AeadAlgorithm,
        chunk_size_byte: u8,
        key: &[u8],
        iv: &[u8],
        source: R,
    ) -> Result<Self> {
        let chunk_size = chunk_size(chunk_size_byte)?;

        let cipher = match aead {
            AeadAlgorithm::Ocb => ocb_for(sym_alg, key)?,
            _ => unsupported_err!("AEAD algorithm {:?}", aead),
        };
        ensure!(
            Some(iv.len()) == aead.iv_size(),
            "invalid IV length {} for {:?}",
            iv.len(),
            aead
        );

        let ad = [
            Tag::GnupgAead.encode(),
            0x01,
            sym_alg.into(),
            aead.into(),
            chunk_size_byte,
        ];

        debug!("aead decrypt stream {sym_alg:?} {aead:?}, chunks of {chunk_size} bytes");

        Ok(Self {
            aead: cipher,
            chunk_size,
            written: 0,
            chunk_index: 0,
            iv: iv.to_vec(),
            ad,
            source,
            is_source_done: false,
            in_buffer: BytesMut::with_capacity(2 * (chunk_size + TAG_SIZE)),
            out_buffer: BytesMut::with_capacity(chunk_size),
        })
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    /// IV with its low eight octets XORed with the big endian chunk index.
    fn nonce(&self) -> Vec<u8> {
        let mut nonce = self.iv.clone();
        let offset = nonce.len() - 8;
        for (n, i) in nonce[offset..].iter_mut().zip(self.chunk_index.to_be_bytes()) {
            *n ^= i;
        }
        nonce
    }

    fn chunk_ad(&self) -> Vec<u8> {
        let mut ad = self.ad.to_vec();
        ad.extend_from_slice(&self.chunk_index.to_be_bytes());
        ad
    }

    fn decrypt_chunk(&mut self) -> Result<()> {
        let enc_chunk_size = self.chunk_size + TAG_SIZE;
        let end = enc_chunk_size.min(self.in_buffer.len());
        ensure!(end > TAG_SIZE, "AEAD chunk too short");

        let mut chunk = self.in_buffer.split_to(end);
        let tag = chunk.split_off(end - TAG_SIZE);

        let nonce = self.nonce();
        let ad = self.chunk_ad();
        self.aead.decrypt_in_place(&nonce, &ad, &mut chunk, &tag)?;

        self.written += chunk.len() as u64;
        self.chunk_index += 1;
        self.out_buffer.extend_from_slice(&chunk);

        Ok(())
    }

    fn decrypt_last(&mut self) -> Result<()> {
        let final_tag = self.in_buffer.split_off(self.in_buffer.len() - TAG_SIZE);

        while !self.in_buffer.is_empty() {
            self.decrypt_chunk()?;
        }

        let nonce = self.nonce();
        let mut ad = self.chunk_ad();
        ad.extend_from_slice(&self.written.to_be_bytes());
        self.aead.decrypt_in_place(&nonce, &ad, &mut [], &final_tag)?;

        debug!("aead stream authenticated, {} bytes", self.written);
        Ok(())
    }

    fn fill_inner(&mut self) -> io::Result<()> {
        if self.out_buffer.has_remaining() || self.is_source_done {
            return Ok(());
        }

        // Keep at least one more chunk plus tag buffered, so the final tag
        // is never mistaken for a chunk.
        let buf_size = 2 * (self.chunk_size + TAG_SIZE);
        let to_read = buf_size - self.in_buffer.len();
        let read = fill_buffer_bytes(&mut self.source, &mut self.in_buffer, buf_size)?;

        if read < to_read {
            if self.in_buffer.len() < TAG_SIZE {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "not enough data to finalize aead decryption",
                ));
            }
            self.is_source_done = true;
            self.decrypt_last()?;
        } else {
            self.decrypt_chunk()?;
        }

        Ok(())
    }
}

impl<R: BufRead> BufRead for StreamDecryptor<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill_inner()?;
        Ok(&self.out_buffer[..])
    }

    fn consume(&mut self, amt: usize) {
        self.out_buffer.advance(amt);
    }
}

impl<R: BufRead> Read for StreamDecryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill_inner()?;
        let to_write = self.out_buffer.remaining().min(buf.len());
        self.out_buffer.copy_to_slice(&mut buf[..to_write]);
        Ok(to_write)
    }
}
