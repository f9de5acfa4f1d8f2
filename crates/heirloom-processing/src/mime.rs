//! Content sniffing for staged parts.
//!
//! Magic bytes win; the file extension is only consulted when the content is unrecognised,
//! so a truncated `3.jpg` still routes to the image path (and is skipped there).

use heirloom_core::models::MimeKind;

const PDF_MAGIC: &[u8] = b"%PDF-";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Readers accept a PDF header anywhere in the first KiB.
const PDF_HEADER_WINDOW: usize = 1024;

pub fn detect_mime_kind(key: &str, data: &[u8]) -> MimeKind {
    if data.starts_with(JPEG_MAGIC) {
        return MimeKind::Jpeg;
    }
    if data.starts_with(PNG_MAGIC) {
        return MimeKind::Png;
    }
    let window = &data[..data.len().min(PDF_HEADER_WINDOW)];
    if window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return MimeKind::Pdf;
    }

    let extension = key
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => MimeKind::Pdf,
        Some("jpg") | Some("jpeg") => MimeKind::Jpeg,
        Some("png") => MimeKind::Png,
        _ => MimeKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes_win_over_extension() {
        assert_eq!(detect_mime_kind("1.pdf", b"\x89PNG\r\n\x1a\nrest"), MimeKind::Png);
        assert_eq!(detect_mime_kind("1.png", &[0xFF, 0xD8, 0xFF, 0xE0]), MimeKind::Jpeg);
        assert_eq!(detect_mime_kind("scan", b"%PDF-1.7\n"), MimeKind::Pdf);
    }

    #[test]
    fn test_pdf_header_after_junk() {
        let mut data = vec![b' '; 100];
        data.extend_from_slice(b"%PDF-1.4\n");
        assert_eq!(detect_mime_kind("1.bin", &data), MimeKind::Pdf);
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(detect_mime_kind("staging/u1/3.JPG", b"garbage"), MimeKind::Jpeg);
        assert_eq!(detect_mime_kind("staging/u1/notes.txt", b"hello"), MimeKind::Other);
        assert_eq!(detect_mime_kind("staging/u1.d/readme", b"hello"), MimeKind::Other);
    }
}
