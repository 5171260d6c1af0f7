// src/geotag.rs
//! GPS position embedded in photo evidence (EXIF GPS IFD).

use std::io::Cursor;

use exif::{Exif, In, Reader, Tag, Value};

use crate::incident::GeoPoint;

/// Read GPSLatitude/GPSLongitude and their N/S/E/W refs from JPEG, TIFF, PNG,
/// HEIF or WebP bytes.
///
/// Returns `None` when the image has no usable GPS tags. A fix at exactly (0, 0)
/// is treated as absent; cameras write it when they had no signal.
pub fn gps_from_image(bytes: &[u8]) -> Option<GeoPoint> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let latitude = signed_degrees(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let longitude = signed_degrees(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;

    let point = GeoPoint::new(latitude, longitude);
    if !point.is_valid() || (latitude == 0.0 && longitude == 0.0) {
        return None;
    }
    Some(point)
}

fn signed_degrees(exif: &Exif, value: Tag, reference: Tag, negative: u8) -> Option<f64> {
    let degrees = match &exif.get_field(value, In::PRIMARY)?.value {
        Value::Rational(dms) if dms.len() >= 3 => {
            dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0
        }
        _ => return None,
    };
    if !degrees.is_finite() {
        return None;
    }
    let flip = match exif.get_field(reference, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Ascii(parts)) => parts
            .first()
            .and_then(|p| p.first())
            .is_some_and(|c| c.to_ascii_uppercase() == negative),
        _ => false,
    };
    Some(if flip { -degrees } else { degrees })
}
