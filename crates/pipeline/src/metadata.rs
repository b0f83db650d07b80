//! Embedded metadata extraction for import.
//!
//! The EXIF path mirrors the rendition decoder's fallback chain: parse the
//! container directly, and when that fails scavenge the embedded JPEG
//! preview that RAW formats carry and parse its Exif segment instead.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use core_types::raw_jpeg::{extract_exif_segment, find_embedded_jpeg};
use exif::{Reader, Tag, Value as ExifValue};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cancel::CancellationFlag;
use crate::error::ImportError;

/// How many files one metadata chunk covers. Cancellation is observed
/// between chunks, so this bounds how much work a cancel can waste.
pub const METADATA_CHUNK_SIZE: usize = 50;

/// Everything we could learn about a file without decoding its pixels.
#[derive(Debug, Clone, Default)]
pub struct ParsedMetadata {
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub orientation: Option<i64>,
    pub captured_at: Option<DateTime<Utc>>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<f64>,
    pub iso: Option<i64>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub raw_properties: Option<Value>,
}

/// Extraction seam so import and render tests can run without real media
/// files on disk.
pub trait MetadataReader: Send + Sync {
    /// Returns `None` when the file has no readable metadata. That is an
    /// expected outcome, not an error.
    fn read(&self, path: &Path) -> Option<ParsedMetadata>;
}

/// EXIF-backed reader used in production.
#[derive(Debug, Default)]
pub struct ExifMetadataReader;

impl MetadataReader for ExifMetadataReader {
    fn read(&self, path: &Path) -> Option<ParsedMetadata> {
        let exif = parse_exif_container(path)?;
        Some(summarize(&exif))
    }
}

fn parse_exif_container(path: &Path) -> Option<exif::Exif> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Some(exif),
        Err(err) => {
            debug!(path = %path.display(), %err, "direct EXIF parse failed, trying embedded preview");
            let bytes = find_embedded_jpeg(path).ok().flatten()?;
            if let Some(segment) = extract_exif_segment(&bytes) {
                Reader::new().read_raw(segment).ok()
            } else {
                let mut cursor = Cursor::new(bytes);
                Reader::new().read_from_container(&mut cursor).ok()
            }
        }
    }
}

fn summarize(exif: &exif::Exif) -> ParsedMetadata {
    let mut meta = ParsedMetadata::default();
    let mut json = Map::new();
    let mut gps_lat_value: Option<[f64; 3]> = None;
    let mut gps_lat_ref: Option<String> = None;
    let mut gps_lon_value: Option<[f64; 3]> = None;
    let mut gps_lon_ref: Option<String> = None;
    let mut gps_alt_value: Option<f64> = None;
    let mut gps_alt_ref: Option<u8> = None;

    for field in exif.fields() {
        let key = format!("{:?}.{:?}", field.ifd_num, field.tag);
        json.insert(
            key,
            Value::String(field.display_value().with_unit(exif).to_string()),
        );

        match field.tag {
            Tag::PixelXDimension | Tag::ImageWidth => {
                if meta.width.is_none() {
                    meta.width = int_value(&field.value);
                }
            }
            Tag::PixelYDimension | Tag::ImageLength => {
                if meta.height.is_none() {
                    meta.height = int_value(&field.value);
                }
            }
            Tag::DateTimeOriginal | Tag::DateTimeDigitized | Tag::DateTime => {
                if meta.captured_at.is_none() {
                    meta.captured_at = parse_exif_datetime(&field.value);
                }
            }
            Tag::Make => {
                if meta.camera_make.is_none() {
                    meta.camera_make = exif_string(&field.value);
                }
            }
            Tag::Model => {
                if meta.camera_model.is_none() {
                    meta.camera_model = exif_string(&field.value);
                }
            }
            Tag::LensModel => {
                if meta.lens_model.is_none() {
                    meta.lens_model = exif_string(&field.value);
                }
            }
            Tag::FocalLength => {
                if meta.focal_length.is_none() {
                    meta.focal_length = rational_value(&field.value);
                }
            }
            Tag::FNumber => {
                if meta.aperture.is_none() {
                    meta.aperture = rational_value(&field.value);
                }
            }
            Tag::ExposureTime => {
                if meta.shutter_speed.is_none() {
                    meta.shutter_speed = rational_value(&field.value);
                }
            }
            Tag::PhotographicSensitivity | Tag::ISOSpeed => {
                if meta.iso.is_none() {
                    meta.iso = int_value(&field.value);
                }
            }
            Tag::Orientation => {
                if meta.orientation.is_none() {
                    meta.orientation = int_value(&field.value);
                }
            }
            Tag::ImageDescription => {
                if meta.caption.is_none() {
                    meta.caption = exif_string(&field.value);
                }
            }
            Tag::GPSLatitude => {
                gps_lat_value = gps_triplet(&field.value).or(gps_lat_value);
            }
            Tag::GPSLatitudeRef => {
                gps_lat_ref = exif_string(&field.value);
            }
            Tag::GPSLongitude => {
                gps_lon_value = gps_triplet(&field.value).or(gps_lon_value);
            }
            Tag::GPSLongitudeRef => {
                gps_lon_ref = exif_string(&field.value);
            }
            Tag::GPSAltitude => {
                if let ExifValue::Rational(values) = &field.value {
                    if let Some(raw) = values.first() {
                        gps_alt_value = Some(raw.to_f64());
                    }
                }
            }
            Tag::GPSAltitudeRef => {
                if let Some(value) = int_value(&field.value) {
                    gps_alt_ref = Some(value as u8);
                }
            }
            _ => {}
        }
    }

    meta.gps_latitude = gps_coordinate(gps_lat_value, gps_lat_ref.as_deref());
    meta.gps_longitude = gps_coordinate(gps_lon_value, gps_lon_ref.as_deref());
    meta.gps_altitude = gps_altitude(gps_alt_value, gps_alt_ref);

    if !json.is_empty() {
        meta.raw_properties = Some(Value::Object(json));
    }

    meta
}

/// Reads metadata for a set of files in fixed-size chunks, reporting
/// progress after each chunk and honoring cancellation between chunks.
pub struct MetadataBatchReader<'a> {
    reader: &'a dyn MetadataReader,
}

impl<'a> MetadataBatchReader<'a> {
    pub fn new(reader: &'a dyn MetadataReader) -> Self {
        Self { reader }
    }

    /// Returns whatever was extracted per path. Files that yield nothing
    /// are simply absent from the map. `on_progress` receives (done, total)
    /// after every chunk.
    pub fn read_batch(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationFlag,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<HashMap<PathBuf, ParsedMetadata>, ImportError> {
        let total = paths.len();
        let mut out = HashMap::new();
        let mut done = 0;

        for chunk in paths.chunks(METADATA_CHUNK_SIZE) {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            for path in chunk {
                if let Some(meta) = self.reader.read(path) {
                    out.insert(path.clone(), meta);
                }
            }
            done += chunk.len();
            on_progress(done, total);
        }

        on_progress(total, total);
        Ok(out)
    }
}

fn exif_string(value: &ExifValue) -> Option<String> {
    match value {
        ExifValue::Ascii(values) => values
            .first()
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .map(|s| s.trim_matches('\u{0}').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn parse_exif_datetime(value: &ExifValue) -> Option<DateTime<Utc>> {
    let raw = exif_string(value)?;
    NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn rational_value(value: &ExifValue) -> Option<f64> {
    match value {
        ExifValue::Rational(values) if !values.is_empty() => Some(values[0].to_f64()),
        ExifValue::SRational(values) if !values.is_empty() => Some(values[0].to_f64()),
        _ => None,
    }
}

fn int_value(value: &ExifValue) -> Option<i64> {
    match value {
        ExifValue::Byte(values) => values.first().map(|v| *v as i64),
        ExifValue::Short(values) => values.first().map(|v| *v as i64),
        ExifValue::Long(values) => values.first().map(|v| *v as i64),
        ExifValue::SByte(values) => values.first().map(|v| *v as i64),
        ExifValue::SShort(values) => values.first().map(|v| *v as i64),
        ExifValue::SLong(values) => values.first().map(|v| *v as i64),
        _ => None,
    }
}

fn gps_triplet(value: &ExifValue) -> Option<[f64; 3]> {
    match value {
        ExifValue::Rational(values) if values.len() >= 3 => Some([
            values[0].to_f64(),
            values[1].to_f64(),
            values[2].to_f64(),
        ]),
        _ => None,
    }
}

fn gps_coordinate(values: Option<[f64; 3]>, reference: Option<&str>) -> Option<f64> {
    let [degrees, minutes, seconds] = values?;
    let mut sign = 1.0;
    if let Some(reference) = reference {
        if matches!(reference.trim().to_ascii_uppercase().as_str(), "S" | "W") {
            sign = -1.0;
        }
    }
    Some(sign * (degrees + minutes / 60.0 + seconds / 3600.0))
}

fn gps_altitude(value: Option<f64>, reference: Option<u8>) -> Option<f64> {
    let mut result = value?;
    if matches!(reference, Some(1)) {
        result = -result;
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        calls: AtomicUsize,
    }

    impl MetadataReader for CountingReader {
        fn read(&self, path: &Path) -> Option<ParsedMetadata> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.extension().map(|e| e == "skip").unwrap_or(false) {
                return None;
            }
            Some(ParsedMetadata {
                width: Some(100),
                height: Some(80),
                ..Default::default()
            })
        }
    }

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("/m/{i}.jpg"))).collect()
    }

    #[test]
    fn reads_every_path_and_reports_chunked_progress() {
        let reader = CountingReader { calls: AtomicUsize::new(0) };
        let batch = MetadataBatchReader::new(&reader);
        let inputs = paths(120);

        let mut updates = Vec::new();
        let result = batch
            .read_batch(&inputs, &CancellationFlag::default(), |done, total| {
                updates.push((done, total));
            })
            .unwrap();

        assert_eq!(result.len(), 120);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 120);
        // Three chunks of fifty plus the final completion report.
        assert_eq!(updates, vec![(50, 120), (100, 120), (120, 120), (120, 120)]);
    }

    #[test]
    fn cancellation_stops_before_the_next_chunk() {
        let reader = CountingReader { calls: AtomicUsize::new(0) };
        let batch = MetadataBatchReader::new(&reader);
        let inputs = paths(150);
        let cancel = CancellationFlag::default();

        let cancel_for_cb = cancel.clone();
        let result = batch.read_batch(&inputs, &cancel, |done, _| {
            if done >= 50 {
                cancel_for_cb.cancel();
            }
        });

        assert!(matches!(result, Err(ImportError::Cancelled)));
        // Only the first chunk ran.
        assert_eq!(reader.calls.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn unreadable_files_are_absent_from_the_result() {
        let reader = CountingReader { calls: AtomicUsize::new(0) };
        let batch = MetadataBatchReader::new(&reader);
        let inputs = vec![PathBuf::from("/m/good.jpg"), PathBuf::from("/m/bad.skip")];

        let result = batch
            .read_batch(&inputs, &CancellationFlag::default(), |_, _| {})
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key(Path::new("/m/good.jpg")));
    }
}
