// Small numeric and sequence helpers shared by the template builder and the realigner.

/// 64-bit integer hash (Thomas Wang), used for deterministic tie-breaking.
pub fn hash_64(key: u64) -> u64 {
    let mut key = key;
    key = key.wrapping_add(!key.wrapping_shl(32));
    key ^= key.wrapping_shr(22);
    key = key.wrapping_add(!key.wrapping_shl(13));
    key ^= key.wrapping_shr(8);
    key = key.wrapping_add(key.wrapping_shl(3));
    key ^= key.wrapping_shr(15);
    key = key.wrapping_add(!key.wrapping_shl(27));
    key ^= key.wrapping_shr(31);
    key
}

/// ln(exp(a) + exp(b)) without overflow. `NEG_INFINITY` is the additive identity.
#[inline]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// ln(exp(a) - exp(b)) for `a >= b`; `NEG_INFINITY` when they are equal.
#[inline]
pub fn log_diff_exp(a: f64, b: f64) -> f64 {
    debug_assert!(a >= b || (a - b).abs() < 1e-9, "log_diff_exp({a}, {b})");
    if b == f64::NEG_INFINITY {
        return a;
    }
    if b >= a {
        return f64::NEG_INFINITY;
    }
    a + (-(b - a).exp()).ln_1p()
}

/// Phred-scaled confidence that `best` is right when the alternatives sum to `others`
/// (both natural-log probabilities).
///
/// Equivalent to `-10 * log10(1 - p_best / (p_best + p_others))`, computed in log space.
pub fn phred_confidence(best: f64, others: f64) -> f64 {
    if others == f64::NEG_INFINITY {
        return f64::INFINITY;
    }
    let total = log_sum_exp(best, others);
    (total - others) * 10.0 / std::f64::consts::LN_10
}

/// Natural-log probability that a base call with the given Phred quality is correct
/// (`matched`) or is a specific wrong base (`!matched`).
#[inline]
pub fn base_log_probability(quality: u8, matched: bool) -> f64 {
    let quality = quality.max(crate::defaults::MIN_BASE_QUALITY);
    let error = 10f64.powf(-(quality as f64) / 10.0);
    if matched {
        (-error).ln_1p()
    } else {
        (error / 3.0).ln()
    }
}

#[inline]
pub const fn complement(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        b'T' | b't' => b'A',
        _ => b'N',
    }
}

pub fn reverse_complement(bases: &[u8]) -> Vec<u8> {
    bases.iter().rev().map(|&b| complement(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_64_is_deterministic() {
        assert_eq!(hash_64(42), hash_64(42));
        assert_ne!(hash_64(42), hash_64(43));
    }

    #[test]
    fn test_log_sum_exp() {
        let s = log_sum_exp(2f64.ln(), 3f64.ln());
        assert!((s - 5f64.ln()).abs() < 1e-12);
        assert_eq!(log_sum_exp(f64::NEG_INFINITY, 1.5), 1.5);
        assert_eq!(log_sum_exp(1.5, f64::NEG_INFINITY), 1.5);
        // Large magnitudes must not overflow
        let big = log_sum_exp(1000.0, 1000.0);
        assert!((big - (1000.0 + 2f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_log_diff_exp() {
        let d = log_diff_exp(5f64.ln(), 3f64.ln());
        assert!((d - 2f64.ln()).abs() < 1e-12);
        assert_eq!(log_diff_exp(1.0, 1.0), f64::NEG_INFINITY);
        assert_eq!(log_diff_exp(1.0, f64::NEG_INFINITY), 1.0);
    }

    #[test]
    fn test_phred_confidence() {
        // Two equally likely candidates: p = 0.5 -> Q3
        let q = phred_confidence(0.0, 0.0);
        assert!((q - 3.0103).abs() < 1e-3);
        // 1 in 1000 alternative: ~Q30
        let q = phred_confidence(0f64.ln_1p(), (1e-3f64).ln());
        assert!((q - 30.0).abs() < 0.01);
        assert!(phred_confidence(0.0, f64::NEG_INFINITY).is_infinite());
    }

    #[test]
    fn test_base_log_probability() {
        let hit = base_log_probability(30, true);
        let miss = base_log_probability(30, false);
        assert!(hit < 0.0 && hit > -0.01);
        assert!(miss < (1e-3f64).ln());
        // Quality floor
        assert_eq!(base_log_probability(0, true), base_log_probability(2, true));
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"ACGTN"), b"NACGT".to_vec());
        assert_eq!(reverse_complement(b""), Vec::<u8>::new());
    }
}
