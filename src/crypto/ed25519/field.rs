//! Arithmetic in GF(2^255 - 19), radix 2^51.

use std::ops::{Add, Mul, Neg, Sub};

const LOW_51: u64 = (1 << 51) - 1;

/// A field element as five 51-bit limbs, little endian.
///
/// Limbs may exceed 51 bits between operations; every operation leaves them
/// below 2^52, which keeps products inside `u128`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldElement([u64; 5]);

impl FieldElement {
    pub(crate) const ZERO: Self = Self([0, 0, 0, 0, 0]);
    pub(crate) const ONE: Self = Self([1, 0, 0, 0, 0]);

    pub(crate) fn from_u64(v: u64) -> Self {
        Self([v & LOW_51, v >> 51, 0, 0, 0])
    }

    /// Loads 32 little-endian bytes, ignoring the top bit.
    pub(crate) fn from_bytes(bytes: &[u8; 32]) -> Self {
        let word = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            u64::from_le_bytes(w)
        };
        let (w0, w1, w2, w3) = (word(0), word(1), word(2), word(3));

        Self([
            w0 & LOW_51,
            ((w0 >> 51) | (w1 << 13)) & LOW_51,
            ((w1 >> 38) | (w2 << 26)) & LOW_51,
            ((w2 >> 25) | (w3 << 39)) & LOW_51,
            (w3 >> 12) & LOW_51,
        ])
    }

    /// Canonical little-endian encoding, fully reduced mod p.
    pub(crate) fn to_bytes(self) -> [u8; 32] {
        let mut l = self.carry().0;

        // q is 1 iff the value is >= p
        let mut q = (l[0] + 19) >> 51;
        q = (l[1] + q) >> 51;
        q = (l[2] + q) >> 51;
        q = (l[3] + q) >> 51;
        q = (l[4] + q) >> 51;

        l[0] += 19 * q;
        l[1] += l[0] >> 51;
        l[0] &= LOW_51;
        l[2] += l[1] >> 51;
        l[1] &= LOW_51;
        l[3] += l[2] >> 51;
        l[2] &= LOW_51;
        l[4] += l[3] >> 51;
        l[3] &= LOW_51;
        l[4] &= LOW_51;

        let mut out = [0u8; 32];
        let mut acc: u128 = 0;
        let mut acc_bits = 0;
        let mut pos = 0;
        for limb in l {
            acc |= u128::from(limb) << acc_bits;
            acc_bits += 51;
            while acc_bits >= 8 {
                out[pos] = acc as u8;
                acc >>= 8;
                acc_bits -= 8;
                pos += 1;
            }
        }
        // 255 bits leave 7 bits for the last byte
        out[pos] = acc as u8;
        out
    }

    /// Propagates carries so every limb is below 2^51 plus a small excess.
    fn carry(self) -> Self {
        let l = self.0;
        let c0 = l[0] >> 51;
        let c1 = l[1] >> 51;
        let c2 = l[2] >> 51;
        let c3 = l[3] >> 51;
        let c4 = l[4] >> 51;

        Self([
            (l[0] & LOW_51) + c4 * 19,
            (l[1] & LOW_51) + c0,
            (l[2] & LOW_51) + c1,
            (l[3] & LOW_51) + c2,
            (l[4] & LOW_51) + c3,
        ])
    }

    pub(crate) fn square(self) -> Self {
        self * self
    }

    /// Raises to the power given as 32 little-endian bytes.
    fn pow(self, exp: &[u8; 32]) -> Self {
        let mut acc = Self::ONE;
        for byte in exp.iter().rev() {
            for bit in (0..8).rev() {
                acc = acc.square();
                if (byte >> bit) & 1 == 1 {
                    acc = acc * self;
                }
            }
        }
        acc
    }

    /// Multiplicative inverse, `self^(p-2)`. Zero maps to zero.
    pub(crate) fn invert(self) -> Self {
        // p - 2 = 2^255 - 21
        let mut exp = [0xFFu8; 32];
        exp[0] = 0xEB;
        exp[31] = 0x7F;
        self.pow(&exp)
    }

    /// `self^((p-5)/8)`, the core of the square root.
    pub(crate) fn pow_p58(self) -> Self {
        // (p - 5) / 8 = 2^252 - 3
        let mut exp = [0xFFu8; 32];
        exp[0] = 0xFD;
        exp[31] = 0x0F;
        self.pow(&exp)
    }

    /// A square root of -1, `2^((p-1)/4)`.
    pub(crate) fn sqrt_m1() -> Self {
        // (p - 1) / 4 = 2^253 - 5
        let mut exp = [0xFFu8; 32];
        exp[0] = 0xFB;
        exp[31] = 0x1F;
        Self::from_u64(2).pow(&exp)
    }

    pub(crate) fn is_zero(self) -> bool {
        self.to_bytes() == [0u8; 32]
    }

    /// The "sign" of an element: the low bit of its canonical encoding.
    pub(crate) fn is_negative(self) -> bool {
        self.to_bytes()[0] & 1 == 1
    }
}

impl PartialEq for FieldElement {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FieldElement {}

impl Add for FieldElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let (a, b) = (self.0, rhs.0);
        Self([
            a[0] + b[0],
            a[1] + b[1],
            a[2] + b[2],
            a[3] + b[3],
            a[4] + b[4],
        ])
        .carry()
    }
}

impl Sub for FieldElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        // add 16p so no limb underflows
        let (a, b) = (self.carry().0, rhs.carry().0);
        Self([
            (a[0] + 36_028_797_018_963_664) - b[0],
            (a[1] + 36_028_797_018_963_952) - b[1],
            (a[2] + 36_028_797_018_963_952) - b[2],
            (a[3] + 36_028_797_018_963_952) - b[3],
            (a[4] + 36_028_797_018_963_952) - b[4],
        ])
        .carry()
    }
}

impl Neg for FieldElement {
    type Output = Self;

    fn neg(self) -> Self {
        Self::ZERO - self
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        #[inline(always)]
        fn m(x: u64, y: u64) -> u128 {
            u128::from(x) * u128::from(y)
        }

        let a = self.0;
        let b = rhs.0;

        let b1_19 = b[1] * 19;
        let b2_19 = b[2] * 19;
        let b3_19 = b[3] * 19;
        let b4_19 = b[4] * 19;

        let c0 = m(a[0], b[0]) + m(a[4], b1_19) + m(a[3], b2_19) + m(a[2], b3_19) + m(a[1], b4_19);
        let mut c1 =
            m(a[1], b[0]) + m(a[0], b[1]) + m(a[4], b2_19) + m(a[3], b3_19) + m(a[2], b4_19);
        let mut c2 =
            m(a[2], b[0]) + m(a[1], b[1]) + m(a[0], b[2]) + m(a[4], b3_19) + m(a[3], b4_19);
        let mut c3 =
            m(a[3], b[0]) + m(a[2], b[1]) + m(a[1], b[2]) + m(a[0], b[3]) + m(a[4], b4_19);
        let mut c4 = m(a[4], b[0]) + m(a[3], b[1]) + m(a[2], b[2]) + m(a[1], b[3]) + m(a[0], b[4]);

        let low = u128::from(LOW_51);
        c1 += c0 >> 51;
        let r0 = (c0 & low) as u64;
        c2 += c1 >> 51;
        let r1 = (c1 & low) as u64;
        c3 += c2 >> 51;
        let r2 = (c2 & low) as u64;
        c4 += c3 >> 51;
        let r3 = (c3 & low) as u64;
        let carry = (c4 >> 51) as u64;
        let r4 = (c4 & low) as u64;

        let r0 = r0 + carry * 19;
        let r1 = r1 + (r0 >> 51);
        let r0 = r0 & LOW_51;

        Self([r0, r1, r2, r3, r4])
    }
}
