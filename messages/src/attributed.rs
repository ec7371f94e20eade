//! Best-effort text recovery from archived rich-text message bodies.
//!
//! Message bodies without a plain `text` column carry an archived
//! `NSAttributedString` ("streamtyped") blob instead. There is no published
//! description of that encoding, so nothing here is authoritative: we look
//! for the `NSString` class marker, try to read a length-prefixed string
//! after it, and fall back to the longest printable run. Callers get `None`
//! for anything we cannot make sense of.
//!
//! The length-prefix scan can lock onto a byte run that merely looks like
//! text. [`extract_detailed`] reports which strategy produced the result so
//! callers can treat fallback output with suspicion.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Class name that precedes the string payload.
pub const CLASS_MARKER: &[u8] = b"NSString";

/// Bytes that introduce a length-prefixed string after the marker.
const LENGTH_MARKERS: [u8; 2] = [0x2B, 0x2A];

/// Escape byte announcing a two-byte little-endian length.
const WIDE_LENGTH: u8 = 0x81;

/// Runs this short or shorter are noise, not message text.
const MIN_RUN_BYTES: usize = 3;

/// How a body was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// A length prefix after the class marker pointed at printable bytes.
    LengthPrefixed,
    /// No usable prefix; the longest printable run was taken instead.
    LongestRun,
}

/// Recovered text and the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
}

/// Recover the plain text of an archived rich-text body.
pub fn extract(blob: &[u8]) -> Option<String> {
    extract_detailed(blob).map(|extraction| extraction.text)
}

/// Like [`extract`], but also reports how the text was found.
pub fn extract_detailed(blob: &[u8]) -> Option<Extraction> {
    if blob.is_empty() {
        return None;
    }

    let start = find(blob, CLASS_MARKER)? + CLASS_MARKER.len();

    if let Some(text) = length_prefixed(blob, start) {
        return Some(Extraction {
            text,
            method: ExtractionMethod::LengthPrefixed,
        });
    }

    let text = longest_run(blob, start)?;
    debug!(
        "Rich-text body recovered from longest printable run ({} bytes)",
        text.len()
    );
    Some(Extraction {
        text,
        method: ExtractionMethod::LongestRun,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Printable for payload validation: anything but ASCII control bytes,
/// with CR, LF and TAB allowed. Bytes >= 0x80 pass as UTF-8 sequences.
fn is_payload_byte(byte: u8) -> bool {
    match byte {
        b'\t' | b'\n' | b'\r' => true,
        0x00..=0x1F | 0x7F => false,
        _ => true,
    }
}

/// Printable for the fallback scan. TAB ends a run, CR/LF do not.
fn is_run_byte(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7E | 0x80..=0xFF | b'\n' | b'\r')
}

fn length_prefixed(blob: &[u8], start: usize) -> Option<String> {
    let mut i = start;
    while i + 1 < blob.len() {
        if LENGTH_MARKERS.contains(&blob[i])
            && let Some((from, len)) = read_length(blob, i + 1)
            && let Some(payload) = blob.get(from..from + len)
            && payload.iter().copied().all(is_payload_byte)
        {
            return Some(String::from_utf8_lossy(payload).into_owned());
        }
        i += 1;
    }
    None
}

/// Decode the length at `at`, returning the payload offset and its length.
fn read_length(blob: &[u8], at: usize) -> Option<(usize, usize)> {
    match *blob.get(at)? {
        len @ 0x01..=0x7F => Some((at + 1, usize::from(len))),
        WIDE_LENGTH => {
            let lo = *blob.get(at + 1)?;
            let hi = *blob.get(at + 2)?;
            let len = usize::from(u16::from_le_bytes([lo, hi]));
            (len >= 0x80).then_some((at + 3, len))
        }
        _ => None,
    }
}

fn longest_run(blob: &[u8], start: usize) -> Option<String> {
    let mut best: Option<(usize, usize)> = None;
    let mut run_start: Option<usize> = None;

    for (offset, byte) in blob.iter().enumerate().skip(start) {
        match (is_run_byte(*byte), run_start) {
            (true, None) => run_start = Some(offset),
            (false, Some(from)) => {
                keep_longer(&mut best, from, offset);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(from) = run_start {
        keep_longer(&mut best, from, blob.len());
    }

    let (from, to) = best?;
    let decoded = String::from_utf8_lossy(&blob[from..to]);
    let decoded: &str = decoded.as_ref();
    let clean = match decoded.find(is_trailing_garbage) {
        Some(cut) => &decoded[..cut],
        None => decoded,
    };
    let clean = clean.trim();
    (!clean.is_empty()).then(|| clean.to_string())
}

fn keep_longer(best: &mut Option<(usize, usize)>, from: usize, to: usize) {
    let len = to - from;
    if len > MIN_RUN_BYTES && best.is_none_or(|(s, e)| len > e - s) {
        *best = Some((from, to));
    }
}

fn is_trailing_garbage(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Bytes shaped like a real archived body around `payload`.
    fn archived(payload: &[u8]) -> Vec<u8> {
        let mut blob = b"\x04\x0bstreamtyped\x81\xe8\x03\x84\x01@\x84\x84\x84\x12NSAttributedString\x00\x84\x84\x08NSObject\x00\x85\x92\x84\x84\x84".to_vec();
        blob.extend_from_slice(CLASS_MARKER);
        blob.extend_from_slice(&[0x01, 0x94, 0x84, 0x01, 0x2B]);
        if payload.len() < 0x80 {
            blob.push(payload.len() as u8);
        } else {
            blob.push(WIDE_LENGTH);
            blob.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        }
        blob.extend_from_slice(payload);
        blob.extend_from_slice(b"\x86\x84\x02iI\x01\x05\x92\x84\x84\x84\x0cNSDictionary\x00");
        blob
    }

    #[test]
    fn test_empty_buffer_is_none() {
        assert_eq!(extract(&[]), None);
    }

    #[test]
    fn test_missing_marker_is_none() {
        assert_eq!(extract(b"just some bytes without a class name"), None);
    }

    #[test]
    fn test_length_prefixed_payload() {
        let blob = archived(b"Dinner in Vegas tonight?");
        assert_eq!(
            extract_detailed(&blob),
            Some(Extraction {
                text: "Dinner in Vegas tonight?".to_string(),
                method: ExtractionMethod::LengthPrefixed,
            })
        );
    }

    #[test]
    fn test_multibyte_payload_round_trips() {
        let text = "caf\u{e9} at 8? \u{1F44B}";
        let blob = archived(text.as_bytes());
        assert_eq!(extract(&blob).as_deref(), Some(text));
    }

    #[test]
    fn test_wide_length_payload() {
        let text = "a long message ".repeat(20);
        let blob = archived(text.as_bytes());
        assert_eq!(extract(&blob), Some(text));
    }

    #[test]
    fn test_fallback_to_longest_run() {
        let mut blob = CLASS_MARKER.to_vec();
        blob.extend_from_slice(&[0x01, 0x02, 0x03]);
        blob.extend_from_slice(b"ok");
        blob.push(0x00);
        blob.extend_from_slice(b"See you at the airport");
        blob.extend_from_slice(&[0x00, 0x05, 0x06]);

        let extraction = extract_detailed(&blob).unwrap();
        assert_eq!(extraction.method, ExtractionMethod::LongestRun);
        assert_eq!(extraction.text, "See you at the airport");
    }

    #[test]
    fn test_length_prefix_over_control_bytes_is_rejected() {
        let mut blob = CLASS_MARKER.to_vec();
        blob.extend_from_slice(&[0x2B, 0x04, 0x01, 0x02, 0x03, 0x04, 0x00]);
        blob.extend_from_slice(b"fallback text");
        assert_eq!(extract(&blob).as_deref(), Some("fallback text"));
    }

    #[test]
    fn test_short_runs_are_noise() {
        let mut blob = CLASS_MARKER.to_vec();
        blob.extend_from_slice(&[0x00, b'a', b'b', b'c', 0x00]);
        assert_eq!(extract(&blob), None);
    }

    #[test]
    fn test_truncated_length_prefix_does_not_panic() {
        let mut blob = CLASS_MARKER.to_vec();
        blob.extend_from_slice(&[0x2B, 0x7F, b'h', b'i']);
        // Prefix claims more bytes than exist; the run fallback still sees "+\x7fhi"
        // as too short once the DEL byte splits it.
        assert_eq!(extract(&blob), None);

        let mut blob = CLASS_MARKER.to_vec();
        blob.extend_from_slice(&[0x2B, WIDE_LENGTH, 0x10]);
        assert_eq!(extract(&blob), None);
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let mut state: u32 = 0x1234_5678;
        for len in 0..300 {
            let mut blob = Vec::with_capacity(len + CLASS_MARKER.len());
            if len % 2 == 0 {
                blob.extend_from_slice(CLASS_MARKER);
            }
            for _ in 0..len {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                blob.push((state >> 16) as u8);
            }
            let _ = extract(&blob);
        }
    }
}
