//! Content-based MIME detection.
//!
//! Only runs when the caller did not declare a body type; a declared type
//! always wins.

use mime::Mime;

/// Guess the media type of a text payload.
pub(crate) fn sniff_text(text: &str) -> Mime {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') || is_json_primitive(trimmed) {
        return mime::APPLICATION_JSON;
    }
    let lowered = trimmed
        .get(..15.min(trimmed.len()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
        return mime::TEXT_HTML;
    }
    if trimmed.starts_with("<?xml") {
        return "application/xml".parse().unwrap_or(mime::TEXT_XML)
    }
    mime::TEXT_PLAIN
}

/// A payload that is a single bare JSON token.
fn is_json_primitive(trimmed: &str) -> bool {
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        return false;
    }
    if matches!(trimmed, "true" | "false" | "null") {
        return true;
    }
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        return true;
    }
    trimmed.parse::<f64>().is_ok()
}

/// Guess the media type of a binary payload from its magic prefix.
pub(crate) fn sniff_bytes(bytes: &[u8]) -> Mime {
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
    const GIF: &[u8] = &[0x47, 0x49, 0x46, 0x38];
    const PDF: &[u8] = b"%PDF-";

    if bytes.starts_with(PNG) {
        mime::IMAGE_PNG
    } else if bytes.starts_with(JPEG) {
        mime::IMAGE_JPEG
    } else if bytes.starts_with(GIF) {
        mime::IMAGE_GIF
    } else if bytes.starts_with(PDF) {
        mime::APPLICATION_PDF
    } else {
        mime::APPLICATION_OCTET_STREAM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payloads() {
        assert_eq!(sniff_text("  {\"a\": 1}"), mime::APPLICATION_JSON);
        assert_eq!(sniff_text("[1, 2]"), mime::APPLICATION_JSON);
        assert_eq!(sniff_text("true"), mime::APPLICATION_JSON);
        assert_eq!(sniff_text("42.5"), mime::APPLICATION_JSON);
    }

    #[test]
    fn html_payloads() {
        assert_eq!(sniff_text("<!DOCTYPE html><html>"), mime::TEXT_HTML);
        assert_eq!(sniff_text("<HTML lang=\"en\">"), mime::TEXT_HTML);
    }

    #[test]
    fn xml_payload() {
        assert_eq!(
            sniff_text("<?xml version=\"1.0\"?><root/>").essence_str(),
            "application/xml"
        );
    }

    #[test]
    fn plain_fallback() {
        assert_eq!(sniff_text("hello world"), mime::TEXT_PLAIN);
        assert_eq!(sniff_text("<div>fragment</div>"), mime::TEXT_PLAIN);
    }

    #[test]
    fn magic_prefixes() {
        assert_eq!(
            sniff_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00]),
            mime::IMAGE_PNG
        );
        assert_eq!(sniff_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), mime::IMAGE_JPEG);
        assert_eq!(sniff_bytes(b"GIF89a..."), mime::IMAGE_GIF);
        assert_eq!(sniff_bytes(b"%PDF-1.7"), mime::APPLICATION_PDF);
        assert_eq!(sniff_bytes(b"random"), mime::APPLICATION_OCTET_STREAM);
    }
}
