//! # sigstream
//!
//! Streaming verification of detached signatures and decryption of OpenPGP
//! messages.
//!
//! - [`verify`] checks an OpenPGP or `SSHSIG` signature over a document.
//! - [`parse_key`] reads OpenPGP keys, SSH public keys and DER encoded public
//!   keys into a [`Key`].
//! - [`decrypt`] unwraps the session key of a message and streams its
//!   plaintext through a [`PlaintextReader`].
//!
//! Inputs may be armored or binary, the format is detected from the data.
//!
//! ```no_run
//! # fn main() -> sigstream::Result<()> {
//! use std::{fs::File, io::BufReader};
//!
//! let key = sigstream::parse_key(&std::fs::read("key.asc")?)?;
//! let document = File::open("release.tar.gz")?;
//! let signature = BufReader::new(File::open("release.tar.gz.sig")?);
//!
//! if sigstream::verify(document, signature, Some(&key))? {
//!     println!("good signature by {:?}", key.user_id);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub(crate) mod util;

pub mod armor;
pub mod composed;
pub mod crypto;
pub mod der;
pub mod errors;
pub mod normalize_lines;
pub mod packet;
pub(crate) mod parsing;
pub(crate) mod parsing_reader;
pub mod types;

pub use self::{
    composed::{
        decrypt, parse_key, verify, DecryptedMessage, Key, PlaintextReader, SessionKey,
    },
    errors::{Error, Result},
    types::Password,
};
