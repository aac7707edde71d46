use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::{CaError, Result};

/// Largest serial this authority issues: 2^63 - 1.
pub const MAX_SERIAL: u64 = i64::MAX as u64;

/// Returns a new random serial number in the range [1, 2^63-1].
///
/// Draws uniformly from [0, 2^63-1) using the operating system entropy
/// source and adds one. An entropy failure is returned, never papered over
/// with a default serial.
pub fn new_serial_number() -> Result<u64> {
    let mut rng = OsRng;
    loop {
        let candidate = rng
            .try_next_u64()
            .map_err(|e| CaError::RandomSource(e.to_string()))?
            & MAX_SERIAL;
        // Rejecting the single top value keeps the draw uniform over [0, MAX_SERIAL).
        if candidate < MAX_SERIAL {
            return Ok(candidate + 1);
        }
    }
}

/// Minimal big-endian two's complement encoding of a positive serial, as
/// carried in the certificate's `serialNumber` INTEGER.
pub(crate) fn serial_to_der_bytes(serial: u64) -> Vec<u8> {
    let bytes = serial.to_be_bytes();
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);
    let mut encoded = Vec::with_capacity(9);
    if bytes[start] & 0x80 != 0 {
        encoded.push(0);
    }
    encoded.extend_from_slice(&bytes[start..]);
    encoded
}

/// Inverse of [`serial_to_der_bytes`]; `None` when the value does not fit in 64 bits.
pub(crate) fn serial_from_der_bytes(bytes: &[u8]) -> Option<u64> {
    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => return Some(0),
    };
    if significant.len() > 8 {
        return None;
    }
    Some(
        significant
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
    )
}
