//! Percent to device range mapping

use super::payload::Percent;

/// Map `percent` linearly onto `min..=max`
///
/// Computes `min + round((max - min) * percent / 100)` on the exact rational
/// value, rounding ties to the even neighbour. With `min <= max` the result is
/// always inside the range, `0%` yields `min` and `100%` yields `max`.
pub fn percent_to_range(min: i32, max: i32, percent: Percent) -> i32 {
    let span = i64::from(max) - i64::from(min);
    let scaled = span * i64::from(percent.value());

    let quotient = scaled.div_euclid(100);
    let remainder = scaled.rem_euclid(100);
    let rounded = match remainder.cmp(&50) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal if quotient % 2 == 0 => quotient,
        std::cmp::Ordering::Equal => quotient + 1,
    };

    (i64::from(min) + rounded) as i32
}
