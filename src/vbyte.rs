//! The variable-width signed integer encoding ("vbyte") used throughout
//! response payloads, plus the mantissa-style packed-float volume container.
//!
//! Decoding only: no outbound message uses vbyte, so there is no encoder.

/// Decodes the shortest vbyte-encoded prefix of `bytes`.
///
/// The high bit of each byte is a continuation flag. The second-highest bit
/// of the *first* byte is the sign (`1` = negative). Byte 0 contributes the
/// low 6 bits of magnitude; each subsequent byte contributes 7 bits, shifted
/// by `6 + 7*(i-1)`.
///
/// On empty input, or a sequence whose continuation bit never clears, this
/// returns `(bytes, 0)` unchanged, matching the reference decoder's
/// fail-soft behavior (malformed price fields should not abort an otherwise
/// decodable response).
pub fn decode(bytes: &[u8]) -> (&[u8], i64) {
    for (i, &b) in bytes.iter().enumerate() {
        if b & 0x80 == 0 {
            return (&bytes[i + 1..], decode_terminated(&bytes[..=i]));
        }
    }
    (bytes, 0)
}

/// Decodes a byte run already known to terminate (last byte's high bit clear).
fn decode_terminated(bytes: &[u8]) -> i64 {
    let mut data: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match i {
            0 => data += i64::from(b & 0x3F),
            _ => data += i64::from(b & 0x7F) << (6 + 7 * (i - 1)),
        }
    }
    if let Some(&first) = bytes.first() {
        if first & 0x40 != 0 {
            data = -data;
        }
    }
    data
}

/// Reverses a byte slice, converting between big-endian numeric literals
/// written in source and the little-endian order the wire actually uses.
pub fn reverse(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Reads a little-endian `u16` from the front of `bytes`.
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Reads a little-endian `u32` from the front of `bytes`.
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decodes the mantissa-style packed volume/amount field, primary reference
/// implementation (transcribed from the vendor's own `getVolume`).
///
/// The high byte `e` supplies an exponent `2e - 0x7f`; the remaining three
/// bytes are fractional mantissa bytes whose contribution depends on whether
/// the top bit of the mantissa's high byte implies a normalized
/// (leading-1) form. This is a direct transcription of a reverse-engineered
/// routine, not a from-first-principles IEEE decoder: keep it bit-for-bit
/// faithful rather than "simplifying" it.
#[must_use]
pub fn volume_mantissa(value: u32) -> f64 {
    let ivol = value as i32;
    let logpoint = ivol >> 24;
    let hleax = (ivol >> 16) & 0xff;
    let lheax = (ivol >> 8) & 0xff;
    let lleax = ivol & 0xff;

    let ecx = logpoint * 2 - 0x7f;
    let edx = logpoint * 2 - 0x86;
    let esi = logpoint * 2 - 0x8e;
    let eax = logpoint * 2 - 0x96;

    let mut xmm6 = 2f64.powi(ecx.abs());
    if ecx < 0 {
        xmm6 = 1.0 / xmm6;
    }

    let xmm4 = if hleax > 0x80 {
        2f64.powi(edx) * 128.0 + f64::from(hleax & 0x7f) * 2f64.powi(edx + 1)
    } else if edx >= 0 {
        2f64.powi(edx) * f64::from(hleax)
    } else {
        (1.0 / 2f64.powi(edx)) * f64::from(hleax)
    };

    let mut xmm3 = 2f64.powi(esi) * f64::from(lheax);
    let mut xmm1 = 2f64.powi(eax) * f64::from(lleax);
    if hleax & 0x80 > 0 {
        xmm3 *= 2.0;
        xmm1 *= 2.0;
    }

    xmm6 + xmm4 + xmm3 + xmm1
}

/// Decodes the mantissa-style packed volume/amount field, algebraically
/// simplified alternative implementation (the vendor's own `getVolume2`).
///
/// Kept alongside [`volume_mantissa`] deliberately: the two must agree to
/// within relative `1e-6` on every real input. Divergence is a bug to
/// report, not a discrepancy to paper over by deleting one of them.
#[must_use]
pub fn volume_mantissa_alt(value: u32) -> f64 {
    let ivol = value as i32;
    let logpoint = ivol >> 24;
    let hleax = (ivol >> 16) & 0xff;
    let lheax = (ivol >> 8) & 0xff;
    let lleax = ivol & 0xff;

    let ecx = logpoint * 2 - 0x7f;
    let xmm6 = 2f64.powi(ecx);

    let xmm4 = if hleax > 0x80 {
        xmm6 * (64.0 + f64::from(hleax & 0x7f)) / 64.0
    } else {
        xmm6 * f64::from(hleax) / 128.0
    };

    let scale = if hleax & 0x80 != 0 { 2.0 } else { 1.0 };

    const INV_32768: f64 = 1.0 / 32768.0;
    const INV_8388608: f64 = 1.0 / 8_388_608.0;

    let xmm3 = xmm6 * f64::from(lheax) * INV_32768 * scale;
    let xmm1 = xmm6 * f64::from(lleax) * INV_8388608 * scale;

    xmm6 + xmm4 + xmm3 + xmm1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_small_positive() {
        assert_eq!(decode(&[0x2F]), (&[][..], 47));
    }

    #[test]
    fn decode_small_negative() {
        assert_eq!(decode(&[0x7F]), (&[][..], -63));
    }

    #[test]
    fn decode_matches_reference_bytes() {
        assert_eq!(decode(&[0x7F, 0x3F, 0x40, 0x3F, 0x01]).1, -63);
        assert_eq!(decode(&[0x2F, 0x3F, 0x40, 0x3F, 0x01]).1, 47);
    }

    #[test]
    fn decode_empty_returns_zero() {
        assert_eq!(decode(&[]), (&[][..], 0));
    }

    #[test]
    fn decode_unterminated_returns_input_unchanged() {
        let bytes = [0x80, 0x81, 0x82];
        assert_eq!(decode(&bytes), (&bytes[..], 0));
    }

    #[test]
    fn decode_round_trips_corpus_values() {
        // Values from the spec's testable-properties corpus, each encoded by hand
        // using the continuation/sign-bit rules this module documents.
        let cases: &[(&[u8], i64)] = &[
            (&[0x00], 0),
            (&[0x3F], 63),
            (&[0x2F], 47),
            (&[0x7F, 0x3F, 0x40, 0x3F, 0x01], -63),
            (&[0xC0, 0x02], -128),
        ];
        for (bytes, expected) in cases {
            assert_eq!(decode(bytes).1, *expected, "bytes={bytes:?}");
        }
    }

    #[test]
    fn mantissa_references_agree() {
        let inputs = [1237966432u32, 0, 1, 0x7fff_ffff, 0x8000_0000, 42, 123_456];
        for v in inputs {
            let a = volume_mantissa(v);
            let b = volume_mantissa_alt(v);
            let scale = a.abs().max(b.abs()).max(1.0);
            assert!(
                (a - b).abs() / scale < 1e-6,
                "mantissa decoders diverged for {v}: {a} vs {b}"
            );
        }
    }
}
