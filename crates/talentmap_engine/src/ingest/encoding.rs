//! Character encoding detection and strict decoding.
//!
//! Detection inspects a prefix of the buffer: a BOM always wins, then
//! strict UTF-8, then a null-byte heuristic for BOM-less UTF-16, then a
//! probabilistic detector, and finally Windows-1252 which accepts any
//! byte sequence. Decoding is strict for every candidate except the
//! final fallback: a malformed byte moves on to the next candidate
//! rather than being replaced.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use talentmap_protocol::{PipelineError, PipelineResult};
use unicode_bom::Bom;

/// Bytes inspected for detection; the full buffer is always decoded.
const SNIFF_WINDOW: usize = 10 * 1024;

/// Decode a byte buffer to UTF-8 text, returning the decoded text and
/// the name of the winning encoding.
pub fn decode(bytes: &[u8]) -> PipelineResult<(String, String)> {
    let sniff = &bytes[..bytes.len().min(SNIFF_WINDOW)];

    // A BOM is authoritative.
    let from_bom: Option<&'static Encoding> = match Bom::from(sniff) {
        Bom::Utf8 => Some(UTF_8),
        Bom::Utf16Be => Some(UTF_16BE),
        Bom::Utf16Le => Some(UTF_16LE),
        _ => None,
    };
    if let Some(encoding) = from_bom {
        let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
        if had_errors {
            return Err(PipelineError::EncodingError {
                message: format!(
                    "byte order mark declares {} but the content is not valid {}",
                    encoding.name(),
                    encoding.name()
                ),
            });
        }
        return Ok((text.into_owned(), encoding.name().to_string()));
    }

    // Strict UTF-8 over the whole buffer.
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), UTF_8.name().to_string()));
    }

    // BOM-less UTF-16 shows up as a null byte at every other position.
    if let Some(encoding) = guess_utf16(sniff) {
        let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
        if !had_errors {
            tracing::debug!(encoding = encoding.name(), "detected BOM-less UTF-16");
            return Ok((text.into_owned(), encoding.name().to_string()));
        }
    }

    // Probabilistic guess over the sniff window, validated strictly
    // against the full buffer.
    let mut detector = EncodingDetector::new();
    detector.feed(sniff, bytes.len() <= SNIFF_WINDOW);
    let guessed = detector.guess(None, true);
    if guessed != UTF_8 {
        let (text, had_errors) = guessed.decode_with_bom_removal(bytes);
        if !had_errors {
            tracing::debug!(encoding = guessed.name(), "probabilistic encoding guess accepted");
            return Ok((text.into_owned(), guessed.name().to_string()));
        }
    }

    // Windows-1252 decodes every byte; it doubles as the Latin-1 fallback.
    let (text, _) = WINDOWS_1252.decode_with_bom_removal(bytes);
    Ok((text.into_owned(), WINDOWS_1252.name().to_string()))
}

/// Even/odd null-byte distribution heuristic for UTF-16 without a BOM.
fn guess_utf16(sniff: &[u8]) -> Option<&'static Encoding> {
    if sniff.len() < 8 {
        return None;
    }
    let mut zeros_even = 0usize;
    let mut zeros_odd = 0usize;
    for (i, b) in sniff.iter().enumerate() {
        if *b == 0 {
            if i % 2 == 0 {
                zeros_even += 1;
            } else {
                zeros_odd += 1;
            }
        }
    }
    let half = sniff.len() / 2;
    // Mostly-ASCII text encoded as UTF-16 zeroes one of the two lanes.
    if zeros_odd > half / 2 && zeros_even < half / 8 {
        Some(UTF_16LE)
    } else if zeros_even > half / 2 && zeros_odd < half / 8 {
        Some(UTF_16BE)
    } else {
        None
    }
}
