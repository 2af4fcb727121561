//! Minimal DER encode/decode primitives
//!
//! The response templates and the CRL stream parser only need a handful of
//! DER operations, all of them over caller-owned buffers or small slices.
//! This module keeps them in one place instead of pulling in a full ASN.1
//! framework for what is essentially fixed-shape byte surgery.
//!
//! The single most performance-sensitive operation is
//! [`write_generalized_time`]: OCSP response assembly overwrites the trailing
//! 17 bytes of a pre-encoded extension with the current instant, so it writes
//! digits directly into the caller's buffer without allocating.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// DER universal tags used across this crate.
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_OID: u8 = 0x06;
pub const TAG_ENUMERATED: u8 = 0x0a;
pub const TAG_UTF8_STRING: u8 = 0x0c;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_GENERALIZED_TIME: u8 = 0x18;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

/// Error for malformed DER input.
#[derive(Debug, thiserror::Error)]
#[error("malformed DER: {0}")]
pub struct DerError(pub &'static str);

/// Writes a DER `GeneralizedTime` for `time` (UTC, whole seconds) at
/// `buf[offset..offset + 17]`.
///
/// The encoding is always tag `0x18`, length `15`, then the ASCII form
/// `YYYYMMDDhhmmssZ` — exactly 17 bytes, no allocation. Callers bake the
/// surrounding structure into a template and only ever patch this window.
///
/// # Panics
///
/// Panics if `buf` has fewer than 17 bytes remaining at `offset`.
pub fn write_generalized_time(time: DateTime<Utc>, buf: &mut [u8], offset: usize) {
    let out = &mut buf[offset..offset + 17];
    out[0] = TAG_GENERALIZED_TIME;
    out[1] = 15;
    write_digits(&mut out[2..6], time.year() as u32);
    write_digits(&mut out[6..8], time.month());
    write_digits(&mut out[8..10], time.day());
    write_digits(&mut out[10..12], time.hour());
    write_digits(&mut out[12..14], time.minute());
    write_digits(&mut out[14..16], time.second());
    out[16] = b'Z';
}

/// Returns the 17-byte DER `GeneralizedTime` encoding of `time`.
pub fn generalized_time(time: DateTime<Utc>) -> [u8; 17] {
    let mut buf = [0u8; 17];
    write_generalized_time(time, &mut buf, 0);
    buf
}

fn write_digits(out: &mut [u8], mut value: u32) {
    for slot in out.iter_mut().rev() {
        *slot = b'0' + (value % 10) as u8;
        value /= 10;
    }
}

/// Encodes a definite-form DER length.
pub fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let mut out = Vec::with_capacity(1 + bytes.len() - skip);
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
    out
}

/// Encodes one TLV with the given tag and content.
pub fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = encode_len(content.len());
    let mut out = Vec::with_capacity(1 + len.len() + content.len());
    out.push(tag);
    out.extend_from_slice(&len);
    out.extend_from_slice(content);
    out
}

/// Encodes a DER INTEGER from an unsigned big-endian magnitude.
///
/// Leading zero octets are stripped; a zero-padding octet is re-inserted when
/// the high bit of the magnitude would otherwise flag the value as negative.
/// An empty magnitude encodes as INTEGER 0.
pub fn encode_uint_be(magnitude: &[u8]) -> Vec<u8> {
    let start = magnitude.iter().take_while(|b| **b == 0).count();
    let trimmed = &magnitude[start..];
    let mut content = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.is_empty() || trimmed[0] & 0x80 != 0 {
        content.push(0);
    }
    content.extend_from_slice(trimmed);
    encode_tlv(TAG_INTEGER, &content)
}

/// Encodes a DER OBJECT IDENTIFIER (full TLV) from its dotted form.
///
/// # Panics
///
/// Panics if `dotted` is not a well-formed OID with at least two arcs; OIDs
/// in this crate are compile-time constants.
pub fn encode_oid(dotted: &str) -> Vec<u8> {
    let arcs: Vec<u64> = dotted
        .split('.')
        .map(|a| a.parse().expect("invalid OID arc"))
        .collect();
    assert!(arcs.len() >= 2, "OID needs at least two arcs");
    let mut content = Vec::new();
    content.push((arcs[0] * 40 + arcs[1]) as u8);
    for &arc in &arcs[2..] {
        content.extend_from_slice(&encode_base128(arc));
    }
    encode_tlv(TAG_OID, &content)
}

fn encode_base128(mut value: u64) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        out.push(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    out.reverse();
    out
}

/// Splits a DER header off `input`, returning `(tag, content_len, header_len)`.
///
/// Indefinite lengths are rejected: everything this crate reads is DER.
pub fn split_header(input: &[u8]) -> Result<(u8, usize, usize), DerError> {
    if input.len() < 2 {
        return Err(DerError("truncated header"));
    }
    let tag = input[0];
    if tag & 0x1f == 0x1f {
        return Err(DerError("multi-byte tags are not supported"));
    }
    let first = input[1];
    if first < 0x80 {
        return Ok((tag, first as usize, 2));
    }
    if first == 0x80 {
        return Err(DerError("indefinite length is not DER"));
    }
    let n = (first & 0x7f) as usize;
    if n > 8 || input.len() < 2 + n {
        return Err(DerError("unsupported length-of-length"));
    }
    let mut len: usize = 0;
    for &b in &input[2..2 + n] {
        len = len
            .checked_mul(256)
            .and_then(|l| l.checked_add(b as usize))
            .ok_or(DerError("length overflow"))?;
    }
    Ok((tag, len, 2 + n))
}

/// Splits the first TLV off `input`, returning `(tag, content, rest)`.
pub fn split_tlv(input: &[u8]) -> Result<(u8, &[u8], &[u8]), DerError> {
    let (tag, len, hdr) = split_header(input)?;
    if input.len() < hdr + len {
        return Err(DerError("truncated content"));
    }
    Ok((tag, &input[hdr..hdr + len], &input[hdr + len..]))
}

/// Like [`split_tlv`] but also returns the raw TLV bytes (header included).
pub fn split_tlv_raw(input: &[u8]) -> Result<(u8, &[u8], &[u8], &[u8]), DerError> {
    let (tag, len, hdr) = split_header(input)?;
    if input.len() < hdr + len {
        return Err(DerError("truncated content"));
    }
    Ok((
        tag,
        &input[hdr..hdr + len],
        &input[..hdr + len],
        &input[hdr + len..],
    ))
}

/// Decodes OBJECT IDENTIFIER content octets into dotted form.
pub fn decode_oid_content(content: &[u8]) -> Result<String, DerError> {
    if content.is_empty() {
        return Err(DerError("empty OID"));
    }
    let first = content[0];
    let mut out = format!("{}.{}", first / 40, first % 40);
    let mut arc: u64 = 0;
    for &b in &content[1..] {
        arc = arc
            .checked_mul(128)
            .and_then(|a| a.checked_add((b & 0x7f) as u64))
            .ok_or(DerError("OID arc overflow"))?;
        if b & 0x80 == 0 {
            out.push('.');
            out.push_str(&arc.to_string());
            arc = 0;
        }
    }
    if content.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
        return Err(DerError("truncated OID arc"));
    }
    Ok(out)
}

/// Parses `GeneralizedTime` content octets (`YYYYMMDDhhmmssZ`).
pub fn parse_generalized_time(content: &[u8]) -> Result<DateTime<Utc>, DerError> {
    let s = std::str::from_utf8(content).map_err(|_| DerError("non-ASCII time"))?;
    if s.len() != 15 || !s.ends_with('Z') {
        return Err(DerError("unsupported GeneralizedTime form"));
    }
    parse_time_digits(&s[..14])
}

/// Parses `UTCTime` content octets (`YYMMDDhhmmssZ`), mapping two-digit years
/// per RFC 5280: `00..=49` to 20xx, `50..=99` to 19xx.
pub fn parse_utc_time(content: &[u8]) -> Result<DateTime<Utc>, DerError> {
    let s = std::str::from_utf8(content).map_err(|_| DerError("non-ASCII time"))?;
    if s.len() != 13 || !s.ends_with('Z') {
        return Err(DerError("unsupported UTCTime form"));
    }
    let yy: i32 = s[..2].parse().map_err(|_| DerError("bad UTCTime year"))?;
    let century = if yy < 50 { 20 } else { 19 };
    parse_time_digits(&format!("{century}{}", &s[..12]))
}

/// Parses exactly 14 digits, `YYYYMMDDhhmmss`.
fn parse_time_digits(s: &str) -> Result<DateTime<Utc>, DerError> {
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DerError("non-digit in time"));
    }
    let num = |range: std::ops::Range<usize>| -> u32 { s[range].parse().unwrap() };
    let year: i32 = s[..4].parse().unwrap();
    chrono::NaiveDate::from_ymd_opt(year, num(4..6), num(6..8))
        .and_then(|d| d.and_hms_opt(num(8..10), num(10..12), num(12..14)))
        .map(|dt| dt.and_utc())
        .ok_or(DerError("out-of-range time"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generalized_time_layout() {
        let t = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let encoded = generalized_time(t);
        assert_eq!(encoded[0], 0x18);
        assert_eq!(encoded[1], 15);
        assert_eq!(&encoded[2..], b"20240615120000Z");
    }

    #[test]
    fn generalized_time_at_offset() {
        let t = Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap();
        let mut buf = [0xffu8; 20];
        write_generalized_time(t, &mut buf, 3);
        assert_eq!(&buf[..3], &[0xff; 3]);
        assert_eq!(&buf[5..20], b"19991231235959Z");
    }

    #[test]
    fn generalized_time_round_trips() {
        let t = Utc.with_ymd_and_hms(2031, 1, 2, 3, 4, 5).unwrap();
        let encoded = generalized_time(t);
        assert_eq!(parse_generalized_time(&encoded[2..]).unwrap(), t);
    }

    #[test]
    fn utc_time_century_split() {
        let t = parse_utc_time(b"490101000000Z").unwrap();
        assert_eq!(t.year(), 2049);
        let t = parse_utc_time(b"500101000000Z").unwrap();
        assert_eq!(t.year(), 1950);
    }

    #[test]
    fn length_forms() {
        assert_eq!(encode_len(0x7f), vec![0x7f]);
        assert_eq!(encode_len(0x80), vec![0x81, 0x80]);
        assert_eq!(encode_len(0x1234), vec![0x82, 0x12, 0x34]);
    }

    #[test]
    fn tlv_round_trip() {
        let tlv = encode_tlv(TAG_OCTET_STRING, &[1, 2, 3]);
        let (tag, content, rest) = split_tlv(&tlv).unwrap();
        assert_eq!(tag, TAG_OCTET_STRING);
        assert_eq!(content, &[1, 2, 3]);
        assert!(rest.is_empty());
    }

    #[test]
    fn long_form_tlv_round_trip() {
        let content = vec![0xabu8; 300];
        let tlv = encode_tlv(TAG_SEQUENCE, &content);
        let (tag, parsed, _) = split_tlv(&tlv).unwrap();
        assert_eq!(tag, TAG_SEQUENCE);
        assert_eq!(parsed, &content[..]);
    }

    #[test]
    fn uint_encoding() {
        assert_eq!(encode_uint_be(&[]), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_uint_be(&[0x00, 0x00]), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_uint_be(&[0x01]), vec![0x02, 0x01, 0x01]);
        // high bit forces a sign-padding octet
        assert_eq!(encode_uint_be(&[0xde, 0xad]), vec![0x02, 0x03, 0x00, 0xde, 0xad]);
        assert_eq!(encode_uint_be(&[0x00, 0x7f]), vec![0x02, 0x01, 0x7f]);
    }

    #[test]
    fn oid_round_trip() {
        for dotted in ["1.3.36.8.3.13", "2.5.29.24", "1.3.6.1.5.5.7.48.1.6", "2.16.840.1.101.3.4.2.1"] {
            let tlv = encode_oid(dotted);
            let (tag, content, _) = split_tlv(&tlv).unwrap();
            assert_eq!(tag, TAG_OID);
            assert_eq!(decode_oid_content(content).unwrap(), dotted);
        }
    }

    #[test]
    fn rejects_indefinite_length() {
        assert!(split_header(&[0x30, 0x80, 0x00]).is_err());
    }
}
