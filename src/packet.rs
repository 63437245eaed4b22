//! # Packet module
//!
//! Packet framing and the individual packets this crate understands.

mod header;
mod parser;

mod compressed_data;
mod key;
mod literal_data;
mod one_pass_signature;
mod pkesk;
mod signature;
mod skesk;
pub mod ssh;
mod user_id;

pub use self::{
    compressed_data::{CompressionAlgorithm, Decompressor},
    header::{Envelope, HeaderFormat, PacketHeader},
    key::{KeyPacket, KeyVersion},
    literal_data::{DataMode, LiteralDataHeader},
    one_pass_signature::OnePassSignature,
    parser::{Packet, PacketParser},
    pkesk::{EncryptedSessionKey, PublicKeyEncryptedSessionKey},
    signature::{SignatureRecord, SignatureType, SignatureVersion, SignedBlobBuilder},
    skesk::SymKeyEncryptedSessionKey,
    ssh::SshSignatureInfo,
    user_id::UserId,
};

pub(crate) use self::user_id::mail_address;
