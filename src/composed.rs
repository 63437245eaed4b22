//! Objects composed of multiple packets, and the operations on them.
//!
//! - [`Key`]s, parsed from OpenPGP transferable keys, SSH public keys and DER
//!   encoded public keys with [`parse_key`].
//! - Detached signature verification, see [`verify`].
//! - Message decryption, see [`decrypt`], streaming the plaintext through a
//!   [`PlaintextReader`].

mod key;
mod message;
mod verify;

pub use self::{
    key::{parse_key, Key},
    message::{decrypt, DecryptedMessage, PlaintextReader, SessionKey},
    verify::verify,
};
