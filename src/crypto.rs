//! # Cryptography module

// Symmetric

pub mod aead;
pub mod ocb;
pub mod sym;

// Signing & Encryption

pub mod dsa;
pub mod ecdsa;
pub mod ed25519;
pub mod rsa;

pub mod checksum;
pub mod ecc_curve;
pub mod hash;
pub mod public_key;
