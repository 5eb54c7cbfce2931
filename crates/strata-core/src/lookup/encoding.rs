//! Memcomparable key encoding.
//!
//! Encodes [`Datum`]s into byte sequences that preserve sort order when
//! compared lexicographically, and that are self-delimiting so the
//! concatenation of several encoded values is unambiguous. Bucket
//! assignment hashes this encoding, so it must never change for a given
//! value: files written with one encoding are only reachable by lookups
//! that route with the same one.
//!
//! Encoding rules:
//! - **Null**: `0x00` (sorts before all non-null values)
//! - **Bool**: `0x01` + `0x00`/`0x01`
//! - **Int64**: `0x02` + big-endian bytes with sign bit flipped
//! - **Timestamp**: `0x03` + big-endian bytes with sign bit flipped
//! - **Float64**: `0x04` + IEEE 754 order-preserving encoding
//! - **Utf8**: `0x05` + escaped bytes + `0x00 0x00` terminator
//! - **Binary**: `0x06` + escaped bytes + `0x00 0x00` terminator

use crate::lookup::row::Datum;

/// Tag bytes for each type family.
const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT64: u8 = 0x02;
const TAG_TIMESTAMP: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_UTF8: u8 = 0x05;
const TAG_BINARY: u8 = 0x06;

/// Encodes a single [`Datum`] into a memcomparable byte sequence.
#[must_use]
pub fn encode_comparable(value: &Datum) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Encodes `values` back to back into one byte sequence.
#[must_use]
pub fn encode_key<'a>(values: impl IntoIterator<Item = &'a Datum>) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        encode_into(value, &mut out);
    }
    out
}

fn encode_into(value: &Datum, out: &mut Vec<u8>) {
    match value {
        Datum::Null => out.push(TAG_NULL),
        Datum::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Datum::Int64(v) => encode_signed(TAG_INT64, *v, out),
        Datum::Timestamp(v) => encode_signed(TAG_TIMESTAMP, *v, out),
        Datum::Float64(v) => encode_float64(*v, out),
        Datum::Utf8(s) => encode_bytes(TAG_UTF8, s.as_bytes(), out),
        Datum::Binary(b) => encode_bytes(TAG_BINARY, b, out),
    }
}

fn encode_signed(tag: u8, v: i64, out: &mut Vec<u8>) {
    out.push(tag);
    // Flip sign bit so negative values sort before positive
    let mut be = v.to_be_bytes();
    be[0] ^= 0x80;
    out.extend_from_slice(&be);
}

/// IEEE 754 order-preserving encoding:
/// - If positive (sign bit 0): flip sign bit -> all positive floats sort correctly
/// - If negative (sign bit 1): flip all bits -> negative floats sort in reverse
fn encode_float64(v: f64, out: &mut Vec<u8>) {
    let bits = v.to_bits();
    let encoded = if bits & (1u64 << 63) == 0 {
        bits ^ (1u64 << 63)
    } else {
        !bits
    };
    out.push(TAG_FLOAT);
    out.extend_from_slice(&encoded.to_be_bytes());
}

/// Null-terminated byte-stuffing escape for strings/binary:
/// - `0x00` in input -> `0x00 0xFF`
/// - End of data -> `0x00 0x00`
fn encode_bytes(tag: u8, data: &[u8], out: &mut Vec<u8>) {
    out.reserve(data.len() + 3);
    out.push(tag);
    for &b in data {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
}
