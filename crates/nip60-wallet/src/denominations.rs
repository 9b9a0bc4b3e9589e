//! Greedy denomination optimizer: split an amount into the fewest proofs,
//! preferring whatever denominations a keyset actually offers.

use std::collections::BTreeMap;

use cashu_core::Keys;

/// Standard power-of-two denominations used when a keyset's offered
/// denominations are not supplied.
const DEFAULT_DENOMINATIONS: &[u64] = &[
    16384, 8192, 4096, 2048, 1024, 512, 256, 128, 64, 32, 16, 8, 4, 2, 1,
];

/// Extract a keyset's offered denominations, ascending.
pub fn keyset_denominations(keys: &Keys) -> Vec<u64> {
    keys.keys().copied().collect()
}

/// Greedily split `amount` into the fewest proofs, consuming `available_denominations`
/// in descending order and topping up with the smallest available unit if a
/// remainder persists. Falls back to the default power-of-two ladder when no
/// denominations are supplied. `amount == 0` yields an empty mapping.
pub fn optimal_split(amount: u64, available_denominations: &[u64]) -> BTreeMap<u64, u64> {
    if amount == 0 {
        return BTreeMap::new();
    }
    if available_denominations.is_empty() {
        return default_split(amount);
    }

    let mut denominations = BTreeMap::new();
    let mut remaining = amount;

    let mut sorted_desc: Vec<u64> = available_denominations.to_vec();
    sorted_desc.sort_unstable_by(|a, b| b.cmp(a));

    for denom in sorted_desc {
        if denom == 0 {
            continue;
        }
        if remaining >= denom {
            let count = remaining / denom;
            *denominations.entry(denom).or_insert(0) += count;
            remaining -= denom * count;
        }
    }

    if remaining > 0 {
        if let Some(&smallest) = available_denominations.iter().filter(|&&d| d > 0).min() {
            *denominations.entry(smallest).or_insert(0) += 1;
        }
    }

    denominations
}

fn default_split(amount: u64) -> BTreeMap<u64, u64> {
    let mut denominations = BTreeMap::new();
    let mut remaining = amount;

    for &denom in DEFAULT_DENOMINATIONS {
        if remaining >= denom {
            let count = remaining / denom;
            denominations.insert(denom, count);
            remaining -= denom * count;
        }
    }

    denominations
}

/// Whether every denomination in `requested` is offered by `available`.
pub fn validate_denominations(available: &[u64], requested: &BTreeMap<u64, u64>) -> Result<(), u64> {
    let available: std::collections::HashSet<u64> = available.iter().copied().collect();
    for denom in requested.keys() {
        if !available.contains(denom) {
            return Err(*denom);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split_power_of_two() {
        let split = optimal_split(11, &[]);
        let expected: BTreeMap<u64, u64> = [(8, 1), (2, 1), (1, 1)].into_iter().collect();
        assert_eq!(split, expected);
    }

    #[test]
    fn test_zero_amount_yields_empty_split() {
        assert!(optimal_split(0, &[]).is_empty());
        assert!(optimal_split(0, &[1, 2, 4]).is_empty());
    }

    #[test]
    fn test_split_sums_to_amount() {
        for amount in [1, 2, 3, 7, 100, 1000, 65535] {
            let split = optimal_split(amount, &[]);
            let sum: u64 = split.iter().map(|(denom, count)| denom * count).sum();
            assert_eq!(sum, amount);
        }
    }

    #[test]
    fn test_custom_denominations_with_remainder_top_up() {
        // No combination of {5, 3} sums exactly to 7; remainder tops up with
        // the smallest available denomination.
        let split = optimal_split(7, &[5, 3]);
        let sum: u64 = split.iter().map(|(denom, count)| denom * count).sum();
        assert!(sum >= 7);
    }

    #[test]
    fn test_validate_denominations_rejects_unknown() {
        let requested: BTreeMap<u64, u64> = [(4, 1), (16, 2)].into_iter().collect();
        assert_eq!(validate_denominations(&[1, 2, 4, 8], &requested), Err(16));
        assert_eq!(validate_denominations(&[1, 2, 4, 16], &requested), Ok(()));
    }
}
