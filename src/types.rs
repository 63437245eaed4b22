pub mod fingerprint;
pub mod mpi;
mod packet;
pub mod params;
mod password;
pub mod s2k;

pub use self::{
    fingerprint::{Fingerprint, KeyId},
    mpi::Mpi,
    packet::*,
    params::{PublicParams, SecretParams},
    password::Password,
    s2k::{StringToKey, StringToKeyType},
};
