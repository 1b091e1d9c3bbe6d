//! Polyline geometry codec at 1e-6 coordinate precision (the "polyline6"
//! convention used by the routing service).
//!
//! Coordinates are encoded as signed lat/lng deltas, each delta zigzagged
//! and split into 5-bit chunks with a continuation bit, offset by 63 into
//! printable ASCII.

use thiserror::Error;

use crate::geo::GeoPoint;

const SCALE: f64 = 1e6;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("truncated or malformed polyline at byte {0}")]
pub struct DecodeError(pub usize);

/// Decode a polyline6 string into coordinates.
pub fn decode(encoded: &str) -> Result<Vec<GeoPoint>, DecodeError> {
    let bytes = encoded.as_bytes();
    let mut idx = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();
    while idx < bytes.len() {
        lat += read_delta(bytes, &mut idx)?;
        lng += read_delta(bytes, &mut idx)?;
        points.push(GeoPoint::new(lat as f64 / SCALE, lng as f64 / SCALE));
    }
    Ok(points)
}

/// Encode coordinates into a polyline6 string.
pub fn encode(points: &[GeoPoint]) -> String {
    let mut out = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;
    for point in points {
        let lat = (point.lat * SCALE).round() as i64;
        let lng = (point.lng * SCALE).round() as i64;
        write_delta(&mut out, lat - prev_lat);
        write_delta(&mut out, lng - prev_lng);
        prev_lat = lat;
        prev_lng = lng;
    }
    out
}

fn read_delta(bytes: &[u8], idx: &mut usize) -> Result<i64, DecodeError> {
    let mut shift = 0u32;
    let mut accum: u64 = 0;
    loop {
        let Some(&byte) = bytes.get(*idx) else {
            return Err(DecodeError(*idx));
        };
        if byte < 63 || shift > 60 {
            return Err(DecodeError(*idx));
        }
        *idx += 1;
        let chunk = u64::from(byte - 63);
        accum |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    // Undo zigzag: negative values were stored as bitwise complement.
    if accum & 1 == 1 {
        Ok(!(accum >> 1) as i64)
    } else {
        Ok((accum >> 1) as i64)
    }
}

fn write_delta(out: &mut String, delta: i64) {
    let mut value = if delta < 0 {
        !((delta as u64) << 1)
    } else {
        (delta as u64) << 1
    };
    while value >= 0x20 {
        out.push(((0x20 | (value & 0x1f)) as u8 + 63) as char);
        value >>= 5;
    }
    out.push((value as u8 + 63) as char);
}
