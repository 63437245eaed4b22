//! OCB3 decryption (RFC 7253) for 128-bit block ciphers, 128-bit tags.

use cipher::{
    consts::U16, generic_array::GenericArray, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit,
};

use crate::errors::{ensure, Error, Result};

pub const TAG_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

type Block = [u8; BLOCK_SIZE];

fn xor(a: &Block, b: &Block) -> Block {
    let mut out = *a;
    for (o, b) in out.iter_mut().zip(b) {
        *o ^= b;
    }
    out
}

/// Doubling in GF(2^128).
fn double(block: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    let carry = block[0] >> 7;
    for i in 0..BLOCK_SIZE - 1 {
        out[i] = (block[i] << 1) | (block[i + 1] >> 7);
    }
    out[BLOCK_SIZE - 1] = (block[BLOCK_SIZE - 1] << 1) ^ (carry * 0x87);
    out
}

/// Pads a partial block with a single 1 bit followed by zeros.
fn pad(partial: &[u8]) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    out[..partial.len()].copy_from_slice(partial);
    out[partial.len()] = 0x80;
    out
}

/// OCB keyed with a block cipher, caching the `L` table.
pub struct Ocb<C> {
    cipher: C,
    l_star: Block,
    l_dollar: Block,
    /// `L_0, L_1, ...`, grown on demand.
    l: Vec<Block>,
}

impl<C> Ocb<C>
where
    C: BlockEncrypt + BlockDecrypt + BlockSizeUser<BlockSize = U16>,
{
    pub fn new(cipher: C) -> Self {
        let mut l_star = [0u8; BLOCK_SIZE];
        encrypt_block(&cipher, &mut l_star);
        let l_dollar = double(&l_star);
        let l0 = double(&l_dollar);

        Self {
            cipher,
            l_star,
            l_dollar,
            l: vec![l0],
        }
    }

    pub fn new_from_slice(key: &[u8]) -> Result<Self>
    where
        C: KeyInit,
    {
        Ok(Self::new(C::new_from_slice(key)?))
    }

    fn l(&mut self, i: usize) -> Block {
        while self.l.len() <= i {
            let last = self.l[self.l.len() - 1];
            self.l.push(double(&last));
        }
        self.l[i]
    }

    fn encrypt(&self, block: &Block) -> Block {
        let mut out = *block;
        encrypt_block(&self.cipher, &mut out);
        out
    }

    fn decrypt(&self, block: &Block) -> Block {
        let mut out = *block;
        self.cipher
            .decrypt_block(GenericArray::from_mut_slice(&mut out));
        out
    }

    /// `HASH(K, A)`
    fn hash(&mut self, ad: &[u8]) -> Block {
        let mut sum = [0u8; BLOCK_SIZE];
        let mut offset = [0u8; BLOCK_SIZE];

        let mut chunks = ad.chunks_exact(BLOCK_SIZE);
        for (i, chunk) in chunks.by_ref().enumerate() {
            offset = xor(&offset, &self.l((i + 1).trailing_zeros() as usize));
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            sum = xor(&sum, &self.encrypt(&xor(&block, &offset)));
        }

        let rest = chunks.remainder();
        if !rest.is_empty() {
            offset = xor(&offset, &self.l_star);
            sum = xor(&sum, &self.encrypt(&xor(&pad(rest), &offset)));
        }

        sum
    }

    /// `Offset_0` derived from the nonce.
    fn initial_offset(&self, nonce: &[u8]) -> Result<Block> {
        ensure!(
            !nonce.is_empty() && nonce.len() < BLOCK_SIZE,
            "invalid OCB nonce length {}",
            nonce.len()
        );

        // num2str(TAGLEN mod 128, 7) || zeros || 1 || N, with TAGLEN = 128
        let mut full = [0u8; BLOCK_SIZE];
        full[BLOCK_SIZE - nonce.len()..].copy_from_slice(nonce);
        full[BLOCK_SIZE - nonce.len() - 1] |= 0x01;

        let bottom = usize::from(full[BLOCK_SIZE - 1] & 0x3F);
        full[BLOCK_SIZE - 1] &= 0xC0;
        let ktop = self.encrypt(&full);

        let mut stretch = [0u8; BLOCK_SIZE + 8];
        stretch[..BLOCK_SIZE].copy_from_slice(&ktop);
        for i in 0..8 {
            stretch[BLOCK_SIZE + i] = ktop[i] ^ ktop[i + 1];
        }

        let byte_shift = bottom / 8;
        let bit_shift = bottom % 8;
        let mut offset = [0u8; BLOCK_SIZE];
        for (i, o) in offset.iter_mut().enumerate() {
            let hi = stretch[i + byte_shift];
            *o = if bit_shift == 0 {
                hi
            } else {
                (hi << bit_shift) | (stretch[i + byte_shift + 1] >> (8 - bit_shift))
            };
        }

        Ok(offset)
    }

    /// Decrypts `buffer` in place and checks it against `tag`.
    ///
    /// On tag mismatch the buffer contents are unspecified.
    pub fn decrypt_in_place(
        &mut self,
        nonce: &[u8],
        ad: &[u8],
        buffer: &mut [u8],
        tag: &[u8],
    ) -> Result<()> {
        ensure!(tag.len() == TAG_SIZE, "invalid OCB tag length {}", tag.len());

        let mut offset = self.initial_offset(nonce)?;
        let mut checksum = [0u8; BLOCK_SIZE];

        let full_len = buffer.len() - buffer.len() % BLOCK_SIZE;
        let (full, rest) = buffer.split_at_mut(full_len);

        for (i, chunk) in full.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            offset = xor(&offset, &self.l((i + 1).trailing_zeros() as usize));

            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            let plain = xor(&self.decrypt(&xor(&block, &offset)), &offset);
            checksum = xor(&checksum, &plain);
            chunk.copy_from_slice(&plain);
        }

        if !rest.is_empty() {
            offset = xor(&offset, &self.l_star);
            let pad_block = self.encrypt(&offset);
            for (c, p) in rest.iter_mut().zip(pad_block) {
                *c ^= p;
            }
            checksum = xor(&checksum, &pad(rest));
        }

        let full_tag = xor(
            &self.encrypt(&xor(&xor(&checksum, &offset), &self.l_dollar)),
            &self.hash(ad),
        );

        let diff = full_tag
            .iter()
            .zip(tag)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            return Err(Error::AuthenticationFailed);
        }

        Ok(())
    }
}

fn encrypt_block<C: BlockEncrypt + BlockSizeUser<BlockSize = U16>>(cipher: &C, block: &mut Block) {
    cipher.encrypt_block(GenericArray::from_mut_slice(block));
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use aes::{Aes128, Aes256};
    use hex_literal::hex;
    use ocb3::{
        aead::{consts::U15, AeadInPlace, KeyInit as _},
        Ocb3,
    };
    use proptest::prelude::*;

    use super::*;

    const KEY: [u8; 16] = hex!("000102030405060708090A0B0C0D0E0F");

    fn open(nonce: &[u8], ad: &[u8], ct: &[u8]) -> Result<Vec<u8>> {
        let (data, tag) = ct.split_at(ct.len() - TAG_SIZE);
        let mut data = data.to_vec();
        Ocb::<Aes128>::new_from_slice(&KEY)?.decrypt_in_place(nonce, ad, &mut data, tag)?;
        Ok(data)
    }

    #[test]
    fn rfc7253_vectors() {
        // empty message
        assert_eq!(
            open(
                &hex!("BBAA99887766554433221100"),
                b"",
                &hex!("785407BFFFC8AD9EDCC5520AC9111EE6")
            )
            .unwrap(),
            b""
        );

        // partial block with associated data
        assert_eq!(
            open(
                &hex!("BBAA99887766554433221101"),
                &hex!("0001020304050607"),
                &hex!("6820B3657B6F615A5725BDA0D3B4EB3A257C9AF1F8F03009")
            )
            .unwrap(),
            hex!("0001020304050607")
        );
    }

    #[test]
    fn rejects_modified_tag() {
        let mut ct = hex!("6820B3657B6F615A5725BDA0D3B4EB3A257C9AF1F8F03009");
        ct[10] ^= 1;
        assert!(matches!(
            open(
                &hex!("BBAA99887766554433221101"),
                &hex!("0001020304050607"),
                &ct
            ),
            Err(Error::AuthenticationFailed)
        ));
    }

    #[test]
    fn rejects_bad_nonce() {
        assert!(open(&[], b"", &[0u8; 16]).is_err());
        assert!(open(&[0u8; 16], b"", &[0u8; 16]).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn agrees_with_ocb3(
            key: [u8; 32],
            nonce: [u8; 15],
            ad in proptest::collection::vec(any::<u8>(), 0..80),
            msg in proptest::collection::vec(any::<u8>(), 0..300),
        ) {
            let sealer = Ocb3::<Aes256, U15>::new(&key.into());
            let mut data = msg.clone();
            let tag = sealer
                .encrypt_in_place_detached(&nonce.into(), &ad, &mut data)
                .unwrap();

            let mut ocb = Ocb::<Aes256>::new_from_slice(&key).unwrap();
            ocb.decrypt_in_place(&nonce, &ad, &mut data, &tag).unwrap();
            prop_assert_eq!(data, msg);
        }
    }
}
