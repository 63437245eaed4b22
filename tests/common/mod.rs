//! Builders for test fixtures, signed and encrypted with independent crates.
#![allow(dead_code, clippy::unwrap_used)]

use std::{
    io::{self, Read, Write},
    sync::OnceLock,
};

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine};
use cfb_mode::{
    cipher::{AsyncStreamCipher, KeyIvInit},
    Encryptor,
};
use ed25519_dalek::{Signer, SigningKey};
use ocb3::{
    aead::{consts::U15, AeadInPlace, KeyInit},
    Ocb3,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rsa::{
    traits::{PrivateKeyParts, PublicKeyParts},
    BigUint, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

pub const CREATED: [u8; 4] = [0x65, 0x00, 0x00, 0x00];

/// Frames `body` as a new format packet.
pub fn packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xC0 | tag];
    match body.len() {
        len @ 0..=191 => out.push(len as u8),
        len @ 192..=8382 => {
            let len = len - 192;
            out.push((len >> 8) as u8 + 192);
            out.push(len as u8);
        }
        len => {
            out.push(0xFF);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(body);
    out
}

pub fn mpi(val: &[u8]) -> Vec<u8> {
    let start = val.iter().position(|b| *b != 0).unwrap_or(val.len());
    let val = &val[start..];
    let bits = match val.first() {
        Some(first) => (val.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    };
    let mut out = (bits as u16).to_be_bytes().to_vec();
    out.extend_from_slice(val);
    out
}

pub fn ssh_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// Wraps `data` in armor lines, without headers or checksum.
pub fn armor(label: &str, data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = format!("-----BEGIN {label}-----\n");
    if !label.starts_with("SSH") {
        out.push('\n');
    }
    for line in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(line).unwrap());
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// A 2048 bit RSA key, generated once per test binary.
pub fn rsa_key(seed: u64) -> RsaPrivateKey {
    static KEYS: OnceLock<[RsaPrivateKey; 2]> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        [0, 1].map(|s| RsaPrivateKey::new(&mut ChaCha8Rng::seed_from_u64(s), 2048).unwrap())
    });
    keys[(seed % 2) as usize].clone()
}

pub fn rsa_public_body(key: &RsaPrivateKey) -> Vec<u8> {
    let mut body = vec![4];
    body.extend_from_slice(&CREATED);
    body.push(1);
    body.extend(mpi(&key.n().to_bytes_be()));
    body.extend(mpi(&key.e().to_bytes_be()));
    body
}

/// An unprotected secret key packet body.
pub fn rsa_secret_body(key: &RsaPrivateKey) -> Vec<u8> {
    let primes = key.primes();
    // OpenPGP wants p < q and u = p^-1 mod q, the reverse of PKCS#1
    let (p, q) = (&primes[1], &primes[0]);
    let u = key.crt_coefficient().unwrap_or_else(|| BigUint::from(0u8));

    let mut secret = Vec::new();
    for val in [key.d(), p, q, &u] {
        secret.extend(mpi(&val.to_bytes_be()));
    }
    let sum = secret
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));

    let mut body = rsa_public_body(key);
    body.push(0);
    body.extend(secret);
    body.extend_from_slice(&sum.to_be_bytes());
    body
}

pub fn fingerprint(public_body: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update([0x99]);
    hasher.update((public_body.len() as u16).to_be_bytes());
    hasher.update(public_body);
    hasher.finalize().into()
}

pub fn key_id(fingerprint: &[u8; 20]) -> [u8; 8] {
    fingerprint[12..].try_into().unwrap()
}

/// A transferable public key: primary key plus user id.
pub fn rsa_public_key(key: &RsaPrivateKey, user_id: &str) -> Vec<u8> {
    let mut out = packet(6, &rsa_public_body(key));
    out.extend(packet(13, user_id.as_bytes()));
    out
}

/// Frames `body` as an old format packet with a two byte length.
pub fn old_packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x80 | (tag << 2) | 1];
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// A v4 RSA signature packet over `data`, with SHA-256.
///
/// `data` is hashed as given, text signatures must pass it normalized.
pub fn rsa_signature(key: &RsaPrivateKey, typ: u8, data: &[u8]) -> Vec<u8> {
    packet(2, &rsa_signature_body(key, typ, data))
}

pub fn rsa_signature_body(key: &RsaPrivateKey, typ: u8, data: &[u8]) -> Vec<u8> {
    let fp = fingerprint(&rsa_public_body(key));

    let mut hashed = vec![5, 2];
    hashed.extend_from_slice(&CREATED);
    hashed.extend_from_slice(&[22, 33, 4]);
    hashed.extend_from_slice(&fp);

    let mut unhashed = vec![9, 16];
    unhashed.extend_from_slice(&key_id(&fp));

    let mut header = vec![4, typ, 1, 8];
    header.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
    header.extend_from_slice(&hashed);

    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(&header);
    hasher.update([4, 0xFF]);
    hasher.update((header.len() as u32).to_be_bytes());
    let digest = hasher.finalize();

    let sig = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap();

    let mut body = header;
    body.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
    body.extend_from_slice(&unhashed);
    body.extend_from_slice(&digest[..2]);
    body.extend(mpi(&sig));
    body
}

pub fn one_pass_signature(key: &RsaPrivateKey, typ: u8) -> Vec<u8> {
    let fp = fingerprint(&rsa_public_body(key));
    let mut body = vec![3, typ, 8, 1];
    body.extend_from_slice(&key_id(&fp));
    body.push(1);
    packet(4, &body)
}

pub fn ed25519_signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7; 32])
}

pub fn ssh_ed25519_blob(key: &SigningKey) -> Vec<u8> {
    let mut blob = Vec::new();
    ssh_string(&mut blob, b"ssh-ed25519");
    ssh_string(&mut blob, key.verifying_key().as_bytes());
    blob
}

/// The `authorized_keys` line of `key`.
pub fn ssh_ed25519_line(key: &SigningKey, comment: &str) -> String {
    format!("ssh-ed25519 {} {comment}", STANDARD.encode(ssh_ed25519_blob(key)))
}

/// A binary `SSHSIG` over `document`, hashed with SHA-512.
pub fn sshsig(key: &SigningKey, namespace: &str, document: &[u8]) -> Vec<u8> {
    let mut signed = b"SSHSIG".to_vec();
    ssh_string(&mut signed, namespace.as_bytes());
    ssh_string(&mut signed, b"");
    ssh_string(&mut signed, b"sha512");
    ssh_string(&mut signed, &Sha512::digest(document));
    let sig = key.sign(&signed).to_bytes();

    let mut sig_blob = Vec::new();
    ssh_string(&mut sig_blob, b"ssh-ed25519");
    ssh_string(&mut sig_blob, &sig);

    let mut out = b"SSHSIG".to_vec();
    out.extend_from_slice(&1u32.to_be_bytes());
    ssh_string(&mut out, &ssh_ed25519_blob(key));
    ssh_string(&mut out, namespace.as_bytes());
    ssh_string(&mut out, b"");
    ssh_string(&mut out, b"sha512");
    ssh_string(&mut out, &sig_blob);
    out
}

pub fn literal(file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = vec![b'b', file_name.len() as u8];
    body.extend_from_slice(file_name.as_bytes());
    body.extend_from_slice(&CREATED);
    body.extend_from_slice(data);
    packet(11, &body)
}

pub fn zlib(inner: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(vec![2], flate2::Compression::default());
    encoder.write_all(inner).unwrap();
    packet(8, &encoder.finish().unwrap())
}

/// SKESK with a salted SHA-256 S2K for AES-128, and the key it derives.
pub fn skesk(password: &str) -> (Vec<u8>, [u8; 16]) {
    let salt = [0x5A; 8];
    let mut body = vec![4, 7, 1, 8];
    body.extend_from_slice(&salt);

    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let key = hasher.finalize()[..16].try_into().unwrap();
    (packet(3, &body), key)
}

/// PKESK carrying an AES-128 session key for `recipient`.
pub fn pkesk(recipient: &RsaPrivateKey, key_id: [u8; 8], session_key: &[u8; 16]) -> Vec<u8> {
    let mut plain = vec![7];
    plain.extend_from_slice(session_key);
    let sum = session_key
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));
    plain.extend_from_slice(&sum.to_be_bytes());

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let ct = recipient
        .to_public_key()
        .encrypt(&mut rng, Pkcs1v15Encrypt, &plain)
        .unwrap();

    let mut body = vec![3];
    body.extend_from_slice(&key_id);
    body.push(1);
    body.extend(mpi(&ct));
    packet(1, &body)
}

/// Integrity protected data (SEIPD v1) with an AES-128 key.
pub fn seipd(key: &[u8; 16], inner: &[u8]) -> Vec<u8> {
    let prefix = [0x42u8; 16];
    let mut plain = prefix.to_vec();
    plain.extend_from_slice(&prefix[14..]);
    plain.extend_from_slice(inner);
    plain.extend_from_slice(&[0xD3, 0x14]);
    let mdc = Sha1::digest(&plain);
    plain.extend_from_slice(&mdc);

    Encryptor::<Aes128>::new(key.into(), &[0u8; 16].into()).encrypt(&mut plain);

    let mut body = vec![1];
    body.extend(plain);
    packet(18, &body)
}

/// OCB encrypted data (tag 20) with an AES-128 key and 64 byte chunks.
pub fn ocb_encrypted(key: &[u8; 16], inner: &[u8]) -> Vec<u8> {
    const CHUNK_BYTE: u8 = 0;
    let iv = [0x33u8; 15];
    let sealer = Ocb3::<Aes128, U15>::new(key.into());
    let ad_prefix = [0xD4, 1, 7, 2, CHUNK_BYTE];
    let nonce = |index: u64| {
        let mut n = iv;
        for (a, b) in n[7..].iter_mut().zip(index.to_be_bytes()) {
            *a ^= b;
        }
        n
    };

    let mut body = vec![1, 7, 2, CHUNK_BYTE];
    body.extend_from_slice(&iv);

    let mut index = 0u64;
    for chunk in inner.chunks(64) {
        let mut ad = ad_prefix.to_vec();
        ad.extend_from_slice(&index.to_be_bytes());
        let mut data = chunk.to_vec();
        let tag = sealer
            .encrypt_in_place_detached(&nonce(index).into(), &ad, &mut data)
            .unwrap();
        body.extend(data);
        body.extend_from_slice(&tag);
        index += 1;
    }

    let mut ad = ad_prefix.to_vec();
    ad.extend_from_slice(&index.to_be_bytes());
    ad.extend_from_slice(&(inner.len() as u64).to_be_bytes());
    let tag = sealer
        .encrypt_in_place_detached(&nonce(index).into(), &ad, &mut [])
        .unwrap();
    body.extend_from_slice(&tag);

    packet(20, &body)
}

/// Reads `reader` to its end, recovering the crate error of a failed read.
pub fn read_all<R: Read>(mut reader: R) -> Result<Vec<u8>, sigstream::Error> {
    let mut out = Vec::new();
    match reader.read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(err) => Err(into_crate_error(err)),
    }
}

pub fn into_crate_error(err: io::Error) -> sigstream::Error {
    if err.get_ref().is_some_and(|e| e.is::<sigstream::Error>()) {
        return *err.into_inner().unwrap().downcast().unwrap();
    }
    err.into()
}
