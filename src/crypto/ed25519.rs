//! Ed25519 signature verification (RFC 8032).
//!
//! Verification only, variable time. All inputs are public.

mod field;
mod point;

use log::debug;
use num_bigint::BigUint;
use sha2::{Digest, Sha512};

use self::point::Curve;

/// The group order `L = 2^252 + 27742317777372353535851937790883648493`.
const GROUP_ORDER: [u8; 32] = [
    0xED, 0xD3, 0xF5, 0x5C, 0x1A, 0x63, 0x12, 0x58, 0xD6, 0x9C, 0xF7, 0xA2, 0xDE, 0xF9, 0xDE, 0x14,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10,
];

fn to_scalar_bytes(n: &BigUint) -> [u8; 32] {
    let mut out = [0u8; 32];
    let le = n.to_bytes_le();
    out[..le.len()].copy_from_slice(&le);
    out
}

/// Checks that `public_key` decodes to a curve point.
pub fn is_valid_public_key(public_key: &[u8; 32]) -> bool {
    Curve::new().decompress(public_key).is_some()
}

/// Verifies an Ed25519 signature `R || S` over `message`.
///
/// Rejects non-canonical `S`, undecodable `A` or `R`, and returns `false`
/// rather than an error for every such case.
pub fn verify(public_key: &[u8; 32], signature: &[u8; 64], message: &[u8]) -> bool {
    let order = BigUint::from_bytes_le(&GROUP_ORDER);

    let mut r_enc = [0u8; 32];
    r_enc.copy_from_slice(&signature[..32]);
    let s = BigUint::from_bytes_le(&signature[32..]);
    if s >= order {
        debug!("ed25519: scalar not reduced");
        return false;
    }

    let curve = Curve::new();
    let Some(a) = curve.decompress(public_key) else {
        debug!("ed25519: invalid public key encoding");
        return false;
    };
    if curve.decompress(&r_enc).is_none() {
        debug!("ed25519: invalid R encoding");
        return false;
    }
    let Some(b) = curve.basepoint() else {
        return false;
    };

    let mut h = Sha512::new();
    h.update(r_enc);
    h.update(public_key);
    h.update(message);
    let k = BigUint::from_bytes_le(&h.finalize()) % &order;

    // [S]B - [k]A must encode to R
    let sb = curve.mul(&b, &to_scalar_bytes(&s));
    let ka = curve.mul(&a, &to_scalar_bytes(&k));
    let check = curve.add(&sb, &curve.negate(&ka));

    check.compress() == r_enc
}
