//! Perceptual-hash comparison.
//!
//! Two image fingerprints (hex strings of equal length) are compared three
//! independent ways:
//!
//! * `two_bit_matches` : share of aligned 2-character windows that are equal
//! * `four_bit_matches`: share of aligned 4-character windows that are equal
//! * `string_compare`  : Dice coefficient over character bigrams
//!
//! Every score is rounded to two decimal places.
//!
//! ## Window convention
//!
//! The scan walks positions `0..len` and compares the window *ending* at every
//! even position (resp. every multiple of four). At position 0 that window is
//! zero-width. [`WindowConvention`] makes the treatment of that window
//! explicit instead of inheriting it by accident:
//!
//! | Convention | Window at 0 | Final window | `"0000…"` vs `"ffff…"` (16 chars) |
//! |------------|-------------|--------------|-----------------------------------|
//! | `Aligned` (default) | skipped | compared | `0.00 / 0.00` |
//! | `Legacy`   | counted as a match | never compared | `0.13 / 0.25` |
//!
//! `Legacy` reproduces the scores of the historical scanner so archived
//! thresholds stay comparable. It is a known discrepancy and should not be used
//! for new thresholds.

use crate::error::HashCompareError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How the degenerate window at position 0 is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowConvention {
    /// Windows end at `2, 4, …, len` (resp. `4, 8, …, len`). (default)
    #[default]
    Aligned,
    /// Windows end at `0, 2, …, len-2`; the zero-width window always matches.
    Legacy,
}

/// Similarity between two hashes. Every field lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashComparison {
    pub two_bit_matches: f64,
    pub four_bit_matches: f64,
    pub string_compare: f64,
}

/// Compare two hashes with the default [`WindowConvention::Aligned`].
///
/// # Errors
/// Hashes must be non-empty and of equal length ([`HashCompareError::Empty`],
/// [`HashCompareError::LengthMismatch`]). The length must also be a multiple
/// of 4 under either convention ([`HashCompareError::InvalidLength`]): a
/// partial trailing window would score a hash against itself below 1 with
/// `Aligned`, and above 1 with `Legacy`. Nothing is truncated.
///
/// # Example
/// ```rust
/// use cardscan::hash::compare_hash;
///
/// let r = compare_hash("abcd1234abcd1234", "abcd1234abcd1234").unwrap();
/// assert_eq!(r.two_bit_matches, 1.0);
/// assert_eq!(r.string_compare, 1.0);
/// ```
pub fn compare_hash(hash_one: &str, hash_two: &str) -> Result<HashComparison, HashCompareError> {
    compare_hash_with(hash_one, hash_two, WindowConvention::default())
}

/// Compare two hashes using an explicit window convention.
pub fn compare_hash_with(
    hash_one: &str,
    hash_two: &str,
    convention: WindowConvention,
) -> Result<HashComparison, HashCompareError> {
    let one: Vec<char> = hash_one.chars().collect();
    let two: Vec<char> = hash_two.chars().collect();

    if one.is_empty() || two.is_empty() {
        return Err(HashCompareError::Empty);
    }
    if one.len() != two.len() {
        return Err(HashCompareError::LengthMismatch {
            left: one.len(),
            right: two.len(),
        });
    }
    let len = one.len();
    if len % 4 != 0 {
        return Err(HashCompareError::InvalidLength { len });
    }

    let two_bit = count_window_matches(&one, &two, 2, convention);
    let four_bit = count_window_matches(&one, &two, 4, convention);

    let result = HashComparison {
        two_bit_matches: round2(two_bit as f64 / (len as f64 / 2.0)),
        four_bit_matches: round2(four_bit as f64 / (len as f64 / 4.0)),
        string_compare: round2(dice_coefficient(hash_one, hash_two)),
    };
    debug!(?convention, ?result, "Compared hashes {} {}", hash_one, hash_two);
    Ok(result)
}

/// Count equal `width`-wide windows between two equal-length sequences.
fn count_window_matches(
    one: &[char],
    two: &[char],
    width: usize,
    convention: WindowConvention,
) -> usize {
    let len = one.len();
    let (first_end, last_end) = match convention {
        WindowConvention::Aligned => (width, len),
        WindowConvention::Legacy => (0, len - 1),
    };

    (first_end..=last_end)
        .step_by(width)
        .filter(|&end| {
            // Zero-width window: both sides are empty and therefore equal.
            if end < width {
                return true;
            }
            one[end - width..end] == two[end - width..end]
        })
        .count()
}

/// Dice coefficient over character bigrams.
///
/// Whitespace is ignored. Identical strings score 1; a string with fewer than
/// two characters shares no bigrams and scores 0.
pub fn dice_coefficient(first: &str, second: &str) -> f64 {
    let first: Vec<char> = first.chars().filter(|c| !c.is_whitespace()).collect();
    let second: Vec<char> = second.chars().filter(|c| !c.is_whitespace()).collect();

    if first == second {
        return 1.0;
    }
    if first.len() < 2 || second.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in first.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_default() += 1;
    }

    let mut intersection = 0usize;
    for pair in second.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    (2 * intersection) as f64 / (first.len() + second.len() - 2) as f64
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
