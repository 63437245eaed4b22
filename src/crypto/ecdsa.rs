use signature::hazmat::PrehashVerifier;

use crate::{
    crypto::ecc_curve::EccCurve,
    errors::{ensure, ensure_eq, unsupported_err, Result},
};

/// Builds the SEC1 uncompressed encoding `04 || X || Y`.
pub(crate) fn sec1_point(curve: &EccCurve, x: &[u8], y: &[u8]) -> Result<Vec<u8>> {
    let Some(flen) = curve.coordinate_len() else {
        unsupported_err!("curve {}", curve);
    };
    let mut point = Vec::with_capacity(1 + 2 * flen);
    point.push(0x04);
    point.extend(crate::types::mpi::left_pad(x, flen)?);
    point.extend(crate::types::mpi::left_pad(y, flen)?);
    Ok(point)
}

/// Splits a SEC1 uncompressed point into its coordinates.
pub(crate) fn split_point(curve: &EccCurve, point: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let Some(flen) = curve.coordinate_len() else {
        unsupported_err!("curve {}", curve);
    };
    ensure_eq!(point.len(), 2 * flen + 1, "invalid point length");
    ensure_eq!(point[0], 0x04, "invalid point prefix");
    Ok((point[1..=flen].to_vec(), point[flen + 1..].to_vec()))
}

macro_rules! verify_on {
    ($krate:ident, $flen:expr, $point:expr, $hashed:expr, $r:expr, $s:expr) => {{
        const FLEN: usize = $flen;
        let (r, s) = ($r, $s);
        ensure!(r.len() <= FLEN, "invalid R (len)");
        ensure!(s.len() <= FLEN, "invalid S (len)");

        let pk = $krate::ecdsa::VerifyingKey::from_sec1_bytes($point)
            .map_err(crate::errors::Error::invalid_key)?;

        // add padding if the values were encoded short
        let mut sig_bytes = [0u8; 2 * FLEN];
        sig_bytes[(FLEN - r.len())..FLEN].copy_from_slice(r);
        sig_bytes[FLEN + (FLEN - s.len())..].copy_from_slice(s);
        let sig = $krate::ecdsa::Signature::from_slice(&sig_bytes)?;

        pk.verify_prehash($hashed, &sig)?;
        Ok(())
    }};
}

/// Verify an ECDSA signature over a precomputed digest.
///
/// `point` is the SEC1 uncompressed public point; `r` and `s` are big-endian
/// and may be shorter than the field size.
pub fn verify(curve: &EccCurve, point: &[u8], hashed: &[u8], r: &[u8], s: &[u8]) -> Result<()> {
    match curve {
        EccCurve::P256 => verify_on!(p256, 32, point, hashed, r, s),
        EccCurve::P384 => verify_on!(p384, 48, point, hashed, r, s),
        EccCurve::P521 => verify_on!(p521, 66, point, hashed, r, s),
        _ => unsupported_err!("curve {} for ECDSA", curve),
    }
}
