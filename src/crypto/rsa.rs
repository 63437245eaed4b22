use log::debug;
use md5::Md5;
use ripemd::Ripemd160;
use rsa::{
    traits::PublicKeyParts, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use sha3::{Sha3_256, Sha3_512};
use zeroize::Zeroizing;

use crate::{
    crypto::hash::HashAlgorithm,
    errors::{unimplemented_err, Error, Result},
    types::Mpi,
};

/// Upper bound on accepted modulus sizes.
pub const MAX_KEY_SIZE: usize = 16384;

pub(crate) fn public_key(n: &Mpi, e: &Mpi) -> Result<RsaPublicKey> {
    let key = RsaPublicKey::new_with_max_size(n.to_biguint(), e.to_biguint(), MAX_KEY_SIZE)?;
    Ok(key)
}

/// Verify a RSA, PKCS1v15 padded signature over a precomputed digest.
pub fn verify(n: &Mpi, e: &Mpi, hash: HashAlgorithm, hashed: &[u8], sig: &[u8]) -> Result<()> {
    let key = public_key(n, e).map_err(Error::invalid_key)?;

    let scheme = match hash {
        HashAlgorithm::None => Pkcs1v15Sign::new_unprefixed(),
        HashAlgorithm::Md5 => Pkcs1v15Sign::new::<Md5>(),
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Ripemd160 => Pkcs1v15Sign::new::<Ripemd160>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        HashAlgorithm::Sha3_256 => Pkcs1v15Sign::new::<Sha3_256>(),
        HashAlgorithm::Sha3_512 => Pkcs1v15Sign::new::<Sha3_512>(),
        HashAlgorithm::Other(_) => unimplemented_err!("RSA with hash {}", hash),
    };

    // signatures may have lost leading zeros on the wire
    let size = key.size();
    let sig = if sig.len() < size {
        let mut padded = vec![0u8; size - sig.len()];
        padded.extend_from_slice(sig);
        padded
    } else {
        sig.to_vec()
    };

    key.verify(scheme, hashed, &sig)?;
    Ok(())
}

/// Builds a private key from the OpenPGP secret values.
///
/// OpenPGP keeps `p < q` and `u = p^-1 mod q`; the latter is recomputed by
/// the rsa crate.
pub(crate) fn private_key(n: &Mpi, e: &Mpi, d: &Mpi, p: &Mpi, q: &Mpi) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::from_components(
        n.to_biguint(),
        e.to_biguint(),
        d.to_biguint(),
        vec![p.to_biguint(), q.to_biguint()],
    )?;
    Ok(key)
}

/// RSA decryption using PKCS1v15 padding.
pub fn decrypt(priv_key: &RsaPrivateKey, mpis: &[Mpi]) -> Result<Zeroizing<Vec<u8>>> {
    let [mpi] = mpis else {
        unimplemented_err!("RSA session key with {} values", mpis.len());
    };

    debug!("RSA decrypt, {} bytes", mpi.len());
    let ciphertext = mpi.padded(priv_key.size())?;
    let m = priv_key.decrypt(Pkcs1v15Encrypt, &ciphertext)?;

    Ok(Zeroizing::new(m))
}
