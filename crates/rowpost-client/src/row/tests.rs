// crates/rowpost-client/src/row/tests.rs
// ============================================================================
// Module: Row Decoding Unit Tests
// Description: Unit tests for the binary numeric decoder.
// Purpose: Validate decimal rendering without a live database.
// ============================================================================

#![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

use super::numeric_to_string;

/// Encodes a numeric wire value from its header words and digits.
fn encode(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&ndigits.to_be_bytes());
    raw.extend_from_slice(&weight.to_be_bytes());
    raw.extend_from_slice(&sign.to_be_bytes());
    raw.extend_from_slice(&dscale.to_be_bytes());
    for digit in digits {
        raw.extend_from_slice(&digit.to_be_bytes());
    }
    raw
}

#[test]
fn decodes_zero() {
    let raw = encode(0, 0, 0, 0, &[]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "0");
}

#[test]
fn decodes_zero_with_scale() {
    let raw = encode(0, 0, 0, 3, &[]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "0.000");
}

#[test]
fn decodes_integer_spanning_words() {
    let raw = encode(2, 1, 0, 0, &[1234, 5678]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "12345678");
}

#[test]
fn decodes_fractional_value() {
    let raw = encode(2, 0, 0, 2, &[123, 4500]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "123.45");
}

#[test]
fn decodes_small_fraction_with_leading_zeros() {
    let raw = encode(1, -1, 0, 3, &[10]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "0.001");
}

#[test]
fn decodes_negative_value() {
    let raw = encode(2, 0, 0x4000, 1, &[7, 5000]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "-7.5");
}

#[test]
fn decodes_nan() {
    let raw = encode(0, 0, 0xC000, 0, &[]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "NaN");
}

#[test]
fn decodes_trailing_zero_scale() {
    let raw = encode(1, 0, 0, 2, &[5]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "5.00");
}

#[test]
fn rejects_truncated_buffers() {
    let raw = encode(2, 0, 0, 0, &[1]);
    assert!(numeric_to_string(&raw).is_err());
    assert!(numeric_to_string(&[0, 1]).is_err());
}

#[test]
fn decodes_value_smaller_than_word_gap() {
    // 0.00001 = digit 1000 at weight -2, scale 5.
    let raw = encode(1, -2, 0, 5, &[1000]);
    assert_eq!(numeric_to_string(&raw).expect("decode"), "0.00001");
}
