//! File kind detection from a fixed signature table.
//!
//! Magic bytes win; the extension is only consulted when no signature
//! matches. References: https://www.garykessler.net/library/file_sigs.html

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Image formats the perceptual stage can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Image(ImageKind),
    Video,
    Audio,
    Archive,
    Document,
    Other,
}

impl FileKind {
    pub fn is_image(&self) -> bool {
        matches!(self, FileKind::Image(_))
    }
}

/// `None` is a wildcard byte.
type Pattern = &'static [Option<u8>];

struct Signature {
    offset: usize,
    bytes: Pattern,
    kind: FileKind,
}

const fn sig(offset: usize, bytes: Pattern, kind: FileKind) -> Signature {
    Signature {
        offset,
        bytes,
        kind,
    }
}

const HEADER_LEN: usize = 16;

#[rustfmt::skip]
static SIGNATURES: &[Signature] = &[
    sig(0, &[Some(0x89), Some(0x50), Some(0x4E), Some(0x47), Some(0x0D), Some(0x0A), Some(0x1A), Some(0x0A)], FileKind::Image(ImageKind::Png)),
    sig(0, &[Some(0xFF), Some(0xD8), Some(0xFF)], FileKind::Image(ImageKind::Jpeg)),
    sig(0, &[Some(0x47), Some(0x49), Some(0x46), Some(0x38), None, Some(0x61)], FileKind::Image(ImageKind::Gif)),
    sig(0, &[Some(0x52), Some(0x49), Some(0x46), Some(0x46), None, None, None, None, Some(0x57), Some(0x45), Some(0x42), Some(0x50)], FileKind::Image(ImageKind::Webp)),
    sig(0, &[Some(0x49), Some(0x49), Some(0x2A), Some(0x00)], FileKind::Image(ImageKind::Tiff)),
    sig(0, &[Some(0x4D), Some(0x4D), Some(0x00), Some(0x2A)], FileKind::Image(ImageKind::Tiff)),
    sig(0, &[Some(0x42), Some(0x4D)], FileKind::Image(ImageKind::Bmp)),
    sig(0, &[Some(0x52), Some(0x49), Some(0x46), Some(0x46), None, None, None, None, Some(0x41), Some(0x56), Some(0x49), Some(0x20)], FileKind::Video),
    sig(0, &[Some(0x52), Some(0x49), Some(0x46), Some(0x46), None, None, None, None, Some(0x57), Some(0x41), Some(0x56), Some(0x45)], FileKind::Audio),
    sig(0, &[Some(0x1A), Some(0x45), Some(0xDF), Some(0xA3)], FileKind::Video),
    sig(4, &[Some(0x66), Some(0x74), Some(0x79), Some(0x70)], FileKind::Video),
    sig(0, &[Some(0x49), Some(0x44), Some(0x33)], FileKind::Audio),
    sig(0, &[Some(0x66), Some(0x4C), Some(0x61), Some(0x43)], FileKind::Audio),
    sig(0, &[Some(0x4F), Some(0x67), Some(0x67), Some(0x53)], FileKind::Audio),
    sig(0, &[Some(0x25), Some(0x50), Some(0x44), Some(0x46)], FileKind::Document),
    sig(0, &[Some(0x50), Some(0x4B), Some(0x03), Some(0x04)], FileKind::Archive),
    sig(0, &[Some(0x1F), Some(0x8B), Some(0x08)], FileKind::Archive),
    sig(0, &[Some(0x37), Some(0x7A), Some(0xBC), Some(0xAF), Some(0x27), Some(0x1C)], FileKind::Archive),
    sig(0, &[Some(0x52), Some(0x61), Some(0x72), Some(0x21), Some(0x1A), Some(0x07)], FileKind::Archive),
    sig(0, &[Some(0xFD), Some(0x37), Some(0x7A), Some(0x58), Some(0x5A), Some(0x00)], FileKind::Archive),
];

static EXTENSIONS: &[(&str, FileKind)] = &[
    ("jpg", FileKind::Image(ImageKind::Jpeg)),
    ("jpeg", FileKind::Image(ImageKind::Jpeg)),
    ("png", FileKind::Image(ImageKind::Png)),
    ("gif", FileKind::Image(ImageKind::Gif)),
    ("bmp", FileKind::Image(ImageKind::Bmp)),
    ("tif", FileKind::Image(ImageKind::Tiff)),
    ("tiff", FileKind::Image(ImageKind::Tiff)),
    ("webp", FileKind::Image(ImageKind::Webp)),
    ("mp4", FileKind::Video),
    ("mkv", FileKind::Video),
    ("mov", FileKind::Video),
    ("avi", FileKind::Video),
    ("webm", FileKind::Video),
    ("mp3", FileKind::Audio),
    ("flac", FileKind::Audio),
    ("wav", FileKind::Audio),
    ("ogg", FileKind::Audio),
    ("m4a", FileKind::Audio),
    ("zip", FileKind::Archive),
    ("gz", FileKind::Archive),
    ("7z", FileKind::Archive),
    ("rar", FileKind::Archive),
    ("tar", FileKind::Archive),
    ("pdf", FileKind::Document),
    ("doc", FileKind::Document),
    ("docx", FileKind::Document),
    ("txt", FileKind::Document),
    ("md", FileKind::Document),
    ("odt", FileKind::Document),
];

fn matches_at(header: &[u8], signature: &Signature) -> bool {
    let end = signature.offset + signature.bytes.len();
    if header.len() < end {
        return false;
    }
    header[signature.offset..end]
        .iter()
        .zip(signature.bytes)
        .all(|(byte, expected)| expected.map_or(true, |e| e == *byte))
}

pub fn kind_from_header(header: &[u8]) -> Option<FileKind> {
    SIGNATURES
        .iter()
        .find(|signature| matches_at(header, signature))
        .map(|signature| signature.kind)
}

pub fn kind_from_extension(path: &Path) -> FileKind {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return FileKind::Other,
    };
    EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, kind)| *kind)
        .unwrap_or(FileKind::Other)
}

/// Read the first bytes of `path` and classify it. An unreadable file
/// falls back to its extension.
pub fn detect(path: &Path) -> FileKind {
    let mut header = [0u8; HEADER_LEN];
    let read = File::open(path).and_then(|mut f| {
        let mut filled = 0;
        while filled < HEADER_LEN {
            match f.read(&mut header[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    });

    match read {
        Ok(n) => kind_from_header(&header[..n]).unwrap_or_else(|| kind_from_extension(path)),
        Err(_) => kind_from_extension(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_header_signatures() {
        assert_eq!(
            kind_from_header(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            Some(FileKind::Image(ImageKind::Png))
        );
        assert_eq!(
            kind_from_header(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(FileKind::Image(ImageKind::Jpeg))
        );
        assert_eq!(
            kind_from_header(b"GIF89a"),
            Some(FileKind::Image(ImageKind::Gif))
        );
        assert_eq!(
            kind_from_header(b"RIFF\x10\0\0\0WEBPVP8 "),
            Some(FileKind::Image(ImageKind::Webp))
        );
        assert_eq!(kind_from_header(b"RIFF\x10\0\0\0WAVEfmt "), Some(FileKind::Audio));
        assert_eq!(kind_from_header(b"%PDF-1.7"), Some(FileKind::Document));
        assert_eq!(kind_from_header(b"hello"), None);
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(
            kind_from_extension(Path::new("/x/Photo.JPG")),
            FileKind::Image(ImageKind::Jpeg)
        );
        assert_eq!(kind_from_extension(Path::new("/x/notes")), FileKind::Other);
        assert_eq!(kind_from_extension(Path::new("/x/a.xyz")), FileKind::Other);
    }

    #[test]
    fn test_signature_beats_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actually_png.txt");
        fs::write(&path, b"\x89PNG\r\n\x1a\nrest").unwrap();
        assert_eq!(detect(&path), FileKind::Image(ImageKind::Png));

        let text = dir.path().join("plain.jpg");
        fs::write(&text, b"just text").unwrap();
        assert_eq!(detect(&text), FileKind::Image(ImageKind::Jpeg));
        assert!(detect(&dir.path().join("missing.pdf")) == FileKind::Document);
    }
}
