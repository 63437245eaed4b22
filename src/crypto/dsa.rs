use dsa::{Components, Signature, VerifyingKey};
use num_bigint::BigUint;
use signature::hazmat::PrehashVerifier;

use crate::{
    errors::{ensure, Error, Result},
    types::Mpi,
};

/// Verify a DSA signature over a precomputed digest.
///
/// `sig` is `r || s`, both halves of equal width.
pub fn verify(p: &Mpi, q: &Mpi, g: &Mpi, y: &Mpi, hashed: &[u8], sig: &[u8]) -> Result<()> {
    ensure!(
        !sig.is_empty() && sig.len() % 2 == 0,
        "invalid DSA signature length {}",
        sig.len()
    );
    let (r, s) = sig.split_at(sig.len() / 2);

    let components = Components::from_components(p.to_biguint(), q.to_biguint(), g.to_biguint())
        .map_err(Error::invalid_key)?;
    let key =
        VerifyingKey::from_components(components, y.to_biguint()).map_err(Error::invalid_key)?;
    let signature =
        Signature::from_components(BigUint::from_bytes_be(r), BigUint::from_bytes_be(s))?;

    key.verify_prehash(hashed, &signature)?;
    Ok(())
}
