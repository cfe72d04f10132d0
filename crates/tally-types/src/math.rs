//! Ray/wad fixed-point arithmetic on 256-bit integers.
//!
//! All accrual math runs on [`U256`] with [`U512`] intermediates, so products
//! of two full-width values never overflow before the division. Every helper
//! rounds toward zero unless its name ends in `_up`; callers pick the
//! direction that never over-pays a participant.
//!
//! ## Scales
//!
//! - [`RAY`] = 10^27, used for rates, indices, and the accumulator
//! - [`WAD`] = 10^18, used for token amounts
//! - [`PERCENTAGE_FACTOR`] = 10,000 basis points

use primitive_types::{U256, U512};

/// 10^27.
pub const RAY: U256 = U256([0x9fd0_803c_e800_0000, 0x033b_2e3c, 0, 0]);

/// 5 * 10^26.
pub const HALF_RAY: U256 = U256([0x4fe8_401e_7400_0000, 0x019d_971e, 0, 0]);

/// 10^18.
pub const WAD: U256 = U256([0x0de0_b6b3_a764_0000, 0, 0, 0]);

/// 100% in basis points.
pub const PERCENTAGE_FACTOR: u32 = 10_000;

/// Errors from fixed-point arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    /// Result does not fit in 256 bits.
    #[error("arithmetic overflow")]
    Overflow,

    /// Subtraction below zero.
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Convenience result type for math operations.
pub type Result<T> = std::result::Result<T, MathError>;

/// `a * b / denominator`, rounded down.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `denominator` is zero
/// - [`MathError::Overflow`] if the quotient exceeds 256 bits
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.full_mul(b);
    narrow(product / U512::from(denominator))
}

/// `a * b / denominator`, rounded up.
///
/// # Errors
///
/// Same as [`mul_div`].
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.full_mul(b);
    let denominator = U512::from(denominator);
    let quotient = product / denominator;
    if (product % denominator).is_zero() {
        narrow(quotient)
    } else {
        narrow(quotient + U512::one())
    }
}

/// `a * b / RAY`, rounded down.
pub fn ray_mul(a: U256, b: U256) -> Result<U256> {
    mul_div(a, b, RAY)
}

/// `a * RAY / b`, rounded down.
pub fn ray_div(a: U256, b: U256) -> Result<U256> {
    mul_div(a, RAY, b)
}

/// `a * WAD / b`, rounded down.
pub fn wad_div(a: U256, b: U256) -> Result<U256> {
    mul_div(a, WAD, b)
}

/// `a * b / WAD`, rounded down.
pub fn wad_mul(a: U256, b: U256) -> Result<U256> {
    mul_div(a, b, WAD)
}

/// `value * bps / 10_000`, rounded down.
pub fn percent_mul(value: U256, bps: u32) -> Result<U256> {
    mul_div(value, U256::from(bps), U256::from(PERCENTAGE_FACTOR))
}

/// Checked addition.
pub fn add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Checked subtraction.
pub fn sub(a: U256, b: U256) -> Result<U256> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// Checked multiplication.
pub fn mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

/// Convert a percentage in basis points to a ray fraction.
pub fn bps_to_ray(bps: u32) -> Result<U256> {
    mul_div(U256::from(bps), RAY, U256::from(PERCENTAGE_FACTOR))
}

fn narrow(value: U512) -> Result<U256> {
    U256::try_from(value).map_err(|_| MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(RAY, U256::exp10(27));
        assert_eq!(HALF_RAY, U256::exp10(27) / 2);
        assert_eq!(WAD, U256::exp10(18));
    }

    #[test]
    fn test_mul_div_floor() {
        let r = mul_div(U256::from(10), U256::from(10), U256::from(3)).expect("mul_div");
        assert_eq!(r, U256::from(33));
    }

    #[test]
    fn test_mul_div_up() {
        let r = mul_div_up(U256::from(10), U256::from(10), U256::from(3)).expect("mul_div_up");
        assert_eq!(r, U256::from(34));
        let exact = mul_div_up(U256::from(9), U256::from(10), U256::from(3)).expect("exact");
        assert_eq!(exact, U256::from(30));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // MAX * RAY overflows 256 bits but the quotient fits.
        let r = mul_div(U256::MAX, RAY, RAY).expect("wide");
        assert_eq!(r, U256::MAX);
    }

    #[test]
    fn test_mul_div_overflow() {
        assert_eq!(
            mul_div(U256::MAX, U256::from(2), U256::one()),
            Err(MathError::Overflow)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            mul_div(U256::one(), U256::one(), U256::zero()),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_ray_mul_div() {
        let two_ray = RAY * 2;
        assert_eq!(ray_mul(U256::from(7), two_ray).expect("ray_mul"), U256::from(14));
        assert_eq!(ray_div(U256::from(14), two_ray).expect("ray_div"), U256::from(7));
        // 1 / 3 rounds down
        assert_eq!(ray_div(U256::one(), U256::from(3)).expect("third"), RAY / 3);
    }

    #[test]
    fn test_percent_mul() {
        assert_eq!(percent_mul(U256::from(2000), 2_500).expect("pct"), U256::from(500));
        assert_eq!(percent_mul(U256::from(3), 5_000).expect("pct"), U256::one());
        assert_eq!(bps_to_ray(5_000).expect("bps"), HALF_RAY);
    }

    #[test]
    fn test_sub_underflow() {
        assert_eq!(sub(U256::one(), U256::from(2)), Err(MathError::Underflow));
    }
}
