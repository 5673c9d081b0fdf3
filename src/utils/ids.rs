// src/utils/ids.rs
use chrono::Utc;
use nanoid::nanoid;

use crate::utils::constants::{RECORD_PREFIX, RECORD_SUFFIX};

/// Alphanumeric only: generated names end up inside `-` delimited records.
const ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
    'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Broker-level job identifier.
pub fn job_id() -> String {
    nanoid!(10, &ALPHABET)
}

/// Name following the pattern `transmission_<timestamp>_<suffix>.log`.
///
/// The microsecond timestamp keeps names roughly chronological; the random
/// suffix keeps two workers writing in the same microsecond apart.
pub fn transmission_name() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%6f");
    format!("{RECORD_PREFIX}{timestamp}_{}{RECORD_SUFFIX}", nanoid!(6, &ALPHABET))
}
