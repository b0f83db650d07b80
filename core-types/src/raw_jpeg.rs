//! Scavenging helpers for JPEG previews embedded in RAW camera files.
//!
//! Most RAW formats carry at least one full JPEG somewhere in the byte
//! stream. Renditions and EXIF fallback both lean on that: find the largest
//! SOI..EOI span and treat it as the preview.

use std::fs;
use std::io;
use std::path::Path;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Returns the largest embedded JPEG (by byte length) found inside the file.
pub fn find_embedded_jpeg(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let data = fs::read(path)?;
    Ok(find_embedded_jpeg_in_data(&data))
}

fn find_embedded_jpeg_in_data(data: &[u8]) -> Option<Vec<u8>> {
    let mut best: Option<(usize, usize)> = None;
    let mut idx = 0;
    while idx + 1 < data.len() {
        if data[idx..idx + 2] == SOI {
            let Some(end) = find_jpeg_end(data, idx + 2) else {
                break;
            };
            let len = end - idx;
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((idx, len));
            }
            idx = end;
        } else {
            idx += 1;
        }
    }
    best.map(|(start, len)| data[start..start + len].to_vec())
}

fn find_jpeg_end(data: &[u8], mut idx: usize) -> Option<usize> {
    while idx + 1 < data.len() {
        if data[idx..idx + 2] == EOI {
            return Some(idx + 2);
        }
        idx += 1;
    }
    None
}

/// Extracts the APP1 Exif payload from a JPEG buffer, excluding the
/// leading `Exif\0\0` header bytes.
pub fn extract_exif_segment(jpeg_bytes: &[u8]) -> Option<Vec<u8>> {
    if jpeg_bytes.len() < 4 || jpeg_bytes[..2] != SOI {
        return None;
    }
    let mut idx = 2;
    while idx + 3 < jpeg_bytes.len() {
        if jpeg_bytes[idx] != 0xFF {
            idx += 1;
            continue;
        }
        let marker = jpeg_bytes[idx + 1];
        idx += 2;
        // EOI or start-of-scan: no APP1 left to find.
        if marker == 0xD9 || marker == 0xDA {
            break;
        }
        if idx + 2 > jpeg_bytes.len() {
            break;
        }
        let len = u16::from_be_bytes([jpeg_bytes[idx], jpeg_bytes[idx + 1]]) as usize;
        if len < 2 || idx + len > jpeg_bytes.len() {
            break;
        }
        let payload = &jpeg_bytes[idx + 2..idx + len];
        if marker == 0xE1 && payload.starts_with(b"Exif\0\0") {
            return Some(payload[6..].to_vec());
        }
        idx += len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_largest_embedded_jpeg() {
        let mut blob = vec![0u8; 8];
        blob.extend_from_slice(&[0xFF, 0xD8, 1, 2, 0xFF, 0xD9]);
        blob.extend_from_slice(&[0u8; 4]);
        blob.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 4, 5, 6, 0xFF, 0xD9]);

        let found = find_embedded_jpeg_in_data(&blob).expect("embedded jpeg");
        assert_eq!(found.len(), 10);
        assert_eq!(&found[..2], &SOI);
        assert_eq!(&found[found.len() - 2..], &EOI);
    }

    #[test]
    fn exif_segment_requires_app1_header() {
        let mut jpeg = vec![0xFF, 0xD8];
        // APP1 with Exif header and a two-byte payload.
        jpeg.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x0A]);
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&[0xAB, 0xCD]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        assert_eq!(extract_exif_segment(&jpeg), Some(vec![0xAB, 0xCD]));
        assert_eq!(extract_exif_segment(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
    }
}
