//! Wide integer math for reward formulas.
//!
//! Every reward expression has the shape `(a × b × c) / (d × e)` with
//! factors up to 64 bits. Products are taken in `u128` and divided with
//! floor semantics; results must fit back in `u64` or the operation fails.

use crate::error::{ProtocolError, ProtocolResult};

/// Floor of `a × b / d`, widened through `u128`.
pub fn mul_div(a: u64, b: u64, d: u64) -> ProtocolResult<u64> {
    if d == 0 {
        return Err(ProtocolError::Overflow);
    }
    let wide = (a as u128) * (b as u128) / (d as u128);
    u64::try_from(wide).map_err(|_| ProtocolError::Overflow)
}

/// Floor of `a × b × c / (d × e)`, widened through `u128`.
pub fn mul3_div2(a: u64, b: u64, c: u64, d: u64, e: u64) -> ProtocolResult<u64> {
    let denom = (d as u128) * (e as u128);
    if denom == 0 {
        return Err(ProtocolError::Overflow);
    }
    let wide = (a as u128)
        .checked_mul(b as u128)
        .and_then(|p| p.checked_mul(c as u128))
        .ok_or(ProtocolError::Overflow)?;
    u64::try_from(wide / denom).map_err(|_| ProtocolError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_floor() {
        assert_eq!(mul_div(100, 50_000, 1_000_000).unwrap(), 5);
        assert_eq!(mul_div(7, 3, 2).unwrap(), 10);
        assert_eq!(mul_div(0, 123, 7).unwrap(), 0);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // a × b overflows u64 but not u128.
        let a = u64::MAX / 2;
        assert_eq!(mul_div(a, 4, 4).unwrap(), a);
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert!(mul_div(1, 1, 0).is_err());
    }

    #[test]
    fn test_mul_div_result_too_large() {
        assert!(mul_div(u64::MAX, 2, 1).is_err());
    }

    #[test]
    fn test_mul3_div2() {
        // 100 × 1000 × 500 / (2000 × 1000) = 25 (the partial-epoch share
        // from the two-staker reference scenario).
        assert_eq!(mul3_div2(100, 1_000, 500, 2_000, 1_000).unwrap(), 25);
    }

    #[test]
    fn test_mul3_div2_realistic_magnitudes() {
        // 70M whole units of stake in micro units, full reward pool, max
        // time weight: still well inside u128.
        let reward = 1_000_000_000_000;
        let balance = 70_000_000_000_000;
        let total = 70_000_000_000_000;
        assert_eq!(
            mul3_div2(reward, balance, 1_000, total, 1_000).unwrap(),
            reward
        );
    }
}
