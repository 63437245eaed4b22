//! Points on edwards25519 in extended coordinates.

use super::field::FieldElement;

/// Curve constant `d = -121665 / 121666`.
fn edwards_d() -> FieldElement {
    -FieldElement::from_u64(121_665) * FieldElement::from_u64(121_666).invert()
}

/// `(X : Y : Z : T)` with `x = X/Z`, `y = Y/Z`, `x * y = T/Z`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EdwardsPoint {
    x: FieldElement,
    y: FieldElement,
    z: FieldElement,
    t: FieldElement,
}

/// Precomputed constants for one batch of point arithmetic.
pub(crate) struct Curve {
    d2: FieldElement,
    d: FieldElement,
    sqrt_m1: FieldElement,
}

impl Curve {
    pub(crate) fn new() -> Self {
        let d = edwards_d();
        Self {
            d2: d + d,
            d,
            sqrt_m1: FieldElement::sqrt_m1(),
        }
    }

    pub(crate) fn identity(&self) -> EdwardsPoint {
        EdwardsPoint {
            x: FieldElement::ZERO,
            y: FieldElement::ONE,
            z: FieldElement::ONE,
            t: FieldElement::ZERO,
        }
    }

    /// The standard base point, `y = 4/5` with even `x`.
    pub(crate) fn basepoint(&self) -> Option<EdwardsPoint> {
        let mut enc = [0x66u8; 32];
        enc[0] = 0x58;
        self.decompress(&enc)
    }

    /// Decodes a 32-byte point encoding.
    ///
    /// Returns `None` for non-canonical `y`, for `x` with no square root,
    /// and for `x = 0` with the sign bit set.
    pub(crate) fn decompress(&self, enc: &[u8; 32]) -> Option<EdwardsPoint> {
        let sign = enc[31] >> 7 == 1;
        let y = FieldElement::from_bytes(enc);

        let mut canonical = *enc;
        canonical[31] &= 0x7F;
        if y.to_bytes() != canonical {
            return None;
        }

        // x^2 = (y^2 - 1) / (d y^2 + 1)
        let yy = y.square();
        let u = yy - FieldElement::ONE;
        let v = self.d * yy + FieldElement::ONE;

        // candidate x = u v^3 (u v^7)^((p-5)/8)
        let v3 = v.square() * v;
        let v7 = v3.square() * v;
        let mut x = u * v3 * (u * v7).pow_p58();

        let vxx = v * x.square();
        if vxx == u {
            // x is a root
        } else if vxx == -u {
            x = x * self.sqrt_m1;
        } else {
            return None;
        }

        if x.is_zero() && sign {
            return None;
        }
        if x.is_negative() != sign {
            x = -x;
        }

        Some(EdwardsPoint {
            x,
            y,
            z: FieldElement::ONE,
            t: x * y,
        })
    }

    /// Complete addition, "add-2008-hwcd-3". Also correct for doubling.
    pub(crate) fn add(&self, p: &EdwardsPoint, q: &EdwardsPoint) -> EdwardsPoint {
        let a = (p.y - p.x) * (q.y - q.x);
        let b = (p.y + p.x) * (q.y + q.x);
        let c = p.t * self.d2 * q.t;
        let d = (p.z + p.z) * q.z;
        let e = b - a;
        let f = d - c;
        let g = d + c;
        let h = b + a;

        EdwardsPoint {
            x: e * f,
            y: g * h,
            z: f * g,
            t: e * h,
        }
    }

    pub(crate) fn negate(&self, p: &EdwardsPoint) -> EdwardsPoint {
        EdwardsPoint {
            x: -p.x,
            y: p.y,
            z: p.z,
            t: -p.t,
        }
    }

    /// Variable time scalar multiplication with a little-endian scalar.
    pub(crate) fn mul(&self, p: &EdwardsPoint, scalar: &[u8; 32]) -> EdwardsPoint {
        let mut acc = self.identity();
        for byte in scalar.iter().rev() {
            for bit in (0..8).rev() {
                acc = self.add(&acc, &acc);
                if (byte >> bit) & 1 == 1 {
                    acc = self.add(&acc, p);
                }
            }
        }
        acc
    }
}

impl EdwardsPoint {
    pub(crate) fn compress(&self) -> [u8; 32] {
        let zinv = self.z.invert();
        let x = self.x * zinv;
        let y = self.y * zinv;

        let mut out = y.to_bytes();
        if x.is_negative() {
            out[31] |= 0x80;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use hex_literal::hex;

    use super::*;

    const BASEPOINT: [u8; 32] =
        hex!("5866666666666666666666666666666666666666666666666666666666666666");

    #[test]
    fn basepoint_roundtrip() {
        let curve = Curve::new();
        let b = curve.basepoint().unwrap();
        assert_eq!(b.compress(), BASEPOINT);
    }

    #[test]
    fn doubling_matches_addition() {
        let curve = Curve::new();
        let b = curve.basepoint().unwrap();
        let two_b = curve.add(&b, &b);

        let mut two = [0u8; 32];
        two[0] = 2;
        assert_eq!(curve.mul(&b, &two).compress(), two_b.compress());

        let mut three = [0u8; 32];
        three[0] = 3;
        assert_eq!(
            curve.mul(&b, &three).compress(),
            curve.add(&two_b, &b).compress()
        );
    }

    #[test]
    fn group_order_annihilates_basepoint() {
        let curve = Curve::new();
        let b = curve.basepoint().unwrap();
        let l = hex!("edd3f55c1a631258d69cf7a2def9de1400000000000000000000000000000010");
        assert_eq!(curve.mul(&b, &l).compress(), curve.identity().compress());
    }

    #[test]
    fn negation() {
        let curve = Curve::new();
        let b = curve.basepoint().unwrap();
        let zero = curve.add(&b, &curve.negate(&b));
        assert_eq!(zero.compress(), curve.identity().compress());
    }

    #[test]
    fn rejects_bad_encodings() {
        let curve = Curve::new();

        // y = p is not canonical
        let mut y_is_p = [0xFFu8; 32];
        y_is_p[0] = 0xED;
        y_is_p[31] = 0x7F;
        assert!(curve.decompress(&y_is_p).is_none());

        // y = 1 gives x = 0, which has no negative form
        let mut neg_zero = [0u8; 32];
        neg_zero[0] = 1;
        assert!(curve.decompress(&neg_zero).is_some());
        neg_zero[31] = 0x80;
        assert!(curve.decompress(&neg_zero).is_none());

        // y = 2 is not on the curve
        let mut off_curve = [0u8; 32];
        off_curve[0] = 2;
        assert!(curve.decompress(&off_curve).is_none());
    }
}
