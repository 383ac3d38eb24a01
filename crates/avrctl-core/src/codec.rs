//! Volume-style numeric codec.
//!
//! Receivers encode levels as unsigned offsets from a per-command zero
//! point: `MV80` is 0 dB when zero is 80, and a three-character value is in
//! tenths, so `MV805` is +0.5 dB. Levels are always snapped to half-dB
//! steps before encoding.

use crate::error::{Error, Result};

/// Zero point used when a command does not declare one.
pub const DEFAULT_ZERO: i32 = 80;

/// Decode a wire level into decibels relative to `zero`.
///
/// A three-character string is read as tenths (`"805"` is 80.5). Anything
/// else must be an integer strictly between -100 and 100, which also covers
/// short negative forms such as `"-10"`.
///
/// ```
/// use avrctl_core::codec::num_to_db;
///
/// assert_eq!(num_to_db("75", 80).unwrap(), -5.0);
/// assert_eq!(num_to_db("005", 80).unwrap(), -79.5);
/// assert!(num_to_db("3859", 80).is_err());
/// ```
pub fn num_to_db(raw: &str, zero: i32) -> Result<f64> {
    let unparsable = || Error::UnparsableValue(raw.to_string());

    let level = if raw.len() == 3 && !raw.starts_with('-') {
        let tenths: i32 = raw.parse().map_err(|_| unparsable())?;
        f64::from(tenths) / 10.0
    } else {
        let whole: i32 = raw.parse().map_err(|_| unparsable())?;
        if whole <= -100 || whole >= 100 {
            return Err(unparsable());
        }
        f64::from(whole)
    };

    Ok(level - f64::from(zero))
}

/// Encode decibels relative to `zero` as a wire level.
///
/// The value is snapped to the nearest 0.5 (ties to even), shifted by
/// `zero`, scaled by ten when a half step remains, and left-padded with
/// zeros to `width` characters. Negative output is never padded.
///
/// ```
/// use avrctl_core::codec::db_to_num;
///
/// assert_eq!(db_to_num(10.5, 0, 0), "105");
/// assert_eq!(db_to_num(-79.5, 80, 3), "005");
/// ```
pub fn db_to_num(value: f64, zero: i32, width: usize) -> String {
    let snapped = (value * 2.0).round_ties_even() / 2.0;
    let mut level = snapped + f64::from(zero);
    if level.fract() != 0.0 {
        level *= 10.0;
    }
    let out = (level.trunc() as i64).to_string();

    if out.starts_with('-') {
        out
    } else {
        format!("{out:0>width$}")
    }
}

/// Encode a level the way receivers expect it on the wire: whole steps use
/// `digits` characters and half steps one more (`MV05` vs `MV005`).
pub fn level_to_wire(value: f64, zero: i32, digits: usize) -> String {
    let half_steps = (value * 2.0).round_ties_even() as i64;
    let width = if digits > 0 && half_steps % 2 != 0 {
        digits + 1
    } else {
        digits
    };
    db_to_num(value, zero, width)
}
