//! Baseline JPEG marker parsing used by the capture and packetization
//! stages. This module never decodes pixels — it only reads/writes marker
//! segments (SOI, SOF0, DHT, DQT, EOI) well enough to validate a frame,
//! classify its chroma subsampling, and trim/splice bytes around it.
//! Actual pixel compression/decompression is an external collaborator's
//! job, not this crate's.

use thiserror::Error;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOF0: u8 = 0xC0;
const DHT: u8 = 0xC4;
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JpegError {
    #[error("missing SOI marker")]
    MissingSoi,
    #[error("missing EOI marker")]
    MissingEoi,
    #[error("missing SOF0 (baseline) marker")]
    MissingSof0,
    #[error("truncated marker segment")]
    TruncatedSegment,
    #[error("unsupported chroma subsampling")]
    UnsupportedSampling,
}

/// One component entry from a SOF0 segment.
#[derive(Debug, Clone, Copy)]
pub struct Component {
    pub id: u8,
    pub h_sampling: u8,
    pub v_sampling: u8,
    pub quant_table_id: u8,
}

/// Parsed SOF0 (baseline frame header) information.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub components: Vec<Component>,
}

/// Scan `bytes` for the SOF0 segment and parse its dimensions/components.
pub fn probe(bytes: &[u8]) -> Result<FrameInfo, JpegError> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
        return Err(JpegError::MissingSoi);
    }

    for_each_marker(bytes, |marker, segment| {
        if marker == SOF0 {
            return Some(parse_sof0(segment));
        }
        None
    })
    .unwrap_or(Err(JpegError::MissingSof0))
}

fn parse_sof0(segment: &[u8]) -> Result<FrameInfo, JpegError> {
    // precision(1) height(2) width(2) ncomponents(1) then 3 bytes/component
    if segment.len() < 6 {
        return Err(JpegError::TruncatedSegment);
    }
    let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
    let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
    let ncomponents = segment[5] as usize;

    if segment.len() < 6 + ncomponents * 3 {
        return Err(JpegError::TruncatedSegment);
    }

    let mut components = Vec::with_capacity(ncomponents);
    for i in 0..ncomponents {
        let base = 6 + i * 3;
        let id = segment[base];
        let sampling = segment[base + 1];
        components.push(Component {
            id,
            h_sampling: sampling >> 4,
            v_sampling: sampling & 0x0F,
            quant_table_id: segment[base + 2],
        });
    }

    Ok(FrameInfo {
        width,
        height,
        components,
    })
}

/// RFC 2435 `Type` byte (0 = 4:2:2, 1 = 4:2:0, 3 = 4:4:4/grayscale) derived
/// from a SOF0's component sampling factors.
pub fn classify_subsampling(components: &[Component]) -> Result<u8, JpegError> {
    match components.len() {
        1 => Ok(3),
        3 => {
            let y = components[0];
            let chroma_is_1x1 = components[1..]
                .iter()
                .all(|c| c.h_sampling == 1 && c.v_sampling == 1);
            if !chroma_is_1x1 {
                return Err(JpegError::UnsupportedSampling);
            }
            match (y.h_sampling, y.v_sampling) {
                (2, 2) => Ok(1),
                (2, 1) => Ok(0),
                (1, 1) => Ok(3),
                _ => Err(JpegError::UnsupportedSampling),
            }
        }
        _ => Err(JpegError::UnsupportedSampling),
    }
}

/// Returns `true` if a DHT segment appears anywhere before the first SOS.
fn dht_present(bytes: &[u8]) -> bool {
    let mut found = false;
    let _ = for_each_marker(bytes, |marker, _segment| {
        if marker == DHT {
            found = true;
        }
        if marker == SOS {
            return Some(());
        }
        None
    });
    found
}

/// Canonical default Huffman tables (ITU-T T.81 Annex K.3), packaged as a
/// complete DHT marker segment ready to splice into a frame missing one.
pub fn default_dht_segment() -> Vec<u8> {
    // Four tables: DC luma, DC chroma, AC luma, AC chroma — the standard
    // tables every baseline JPEG encoder without custom tables reuses.
    const DC_LUMA_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
    const DC_LUMA_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
    const DC_CHROMA_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
    const DC_CHROMA_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
    const AC_LUMA_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
    const AC_CHROMA_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];

    let ac_luma_vals: Vec<u8> = AC_LUMA_VALUES.to_vec();
    let ac_chroma_vals: Vec<u8> = AC_CHROMA_VALUES.to_vec();

    let mut tables: Vec<(u8, &[u8], Vec<u8>)> = Vec::new();
    tables.push((0x00, &DC_LUMA_BITS, DC_LUMA_VALS.to_vec()));
    tables.push((0x01, &DC_CHROMA_BITS, DC_CHROMA_VALS.to_vec()));
    tables.push((0x10, &AC_LUMA_BITS, ac_luma_vals));
    tables.push((0x11, &AC_CHROMA_BITS, ac_chroma_vals));

    let body_len: usize = tables.iter().map(|(_, _bits, vals)| 1 + 16 + vals.len()).sum();
    let mut out = Vec::with_capacity(4 + body_len);
    out.push(0xFF);
    out.push(DHT);
    out.extend_from_slice(&((body_len + 2) as u16).to_be_bytes());
    for (class_and_id, bits, vals) in tables {
        out.push(class_and_id);
        out.extend_from_slice(bits);
        out.extend_from_slice(&vals);
    }
    out
}

// Standard AC luma/chroma Huffman value tables (ITU-T T.81 Annex K.3.4).
const AC_LUMA_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61,
    0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52,
    0xd1, 0xf0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25,
    0x26, 0x27, 0x28, 0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45,
    0x46, 0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64,
    0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83,
    0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99,
    0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3,
    0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8,
    0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa,
];
const AC_CHROMA_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61,
    0x71, 0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33,
    0x52, 0xf0, 0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18,
    0x19, 0x1a, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44,
    0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63,
    0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a,
    0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97,
    0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca,
    0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7,
    0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa,
];

/// Trim `bytes` to end right after the last EOI marker, discarding any
/// trailing garbage past it.
pub fn trim_to_last_eoi(bytes: &[u8]) -> Result<&[u8], JpegError> {
    if bytes.len() < 2 {
        return Err(JpegError::MissingEoi);
    }
    for end in (1..bytes.len()).rev() {
        if bytes[end - 1] == 0xFF && bytes[end] == EOI {
            return Ok(&bytes[..=end]);
        }
    }
    Err(JpegError::MissingEoi)
}

/// Validate SOI/EOI, splice a default DHT segment before SOF0 if the frame
/// carries none, and trim to the last EOI. Pure byte manipulation — never
/// re-encodes pixel data.
pub fn normalize_frame(bytes: &[u8]) -> Result<Vec<u8>, JpegError> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
        return Err(JpegError::MissingSoi);
    }
    let trimmed = trim_to_last_eoi(bytes)?;

    if dht_present(trimmed) {
        return Ok(trimmed.to_vec());
    }

    let sof0_offset = find_marker_offset(trimmed, SOF0).ok_or(JpegError::MissingSof0)?;
    let mut out = Vec::with_capacity(trimmed.len() + 64);
    out.extend_from_slice(&trimmed[..sof0_offset]);
    out.extend_from_slice(&default_dht_segment());
    out.extend_from_slice(&trimmed[sof0_offset..]);
    Ok(out)
}

fn find_marker_offset(bytes: &[u8], target: u8) -> Option<usize> {
    let mut found = None;
    let _ = for_each_marker_with_offset(bytes, |marker, offset, _segment| {
        if marker == target {
            found = Some(offset);
            return Some(());
        }
        None
    });
    found
}

/// Walk marker segments starting right after SOI, calling `f(marker_byte,
/// segment_bytes)` for each one with a length field. Stops and returns
/// `f`'s result as soon as `f` returns `Some`.
fn for_each_marker<T>(bytes: &[u8], mut f: impl FnMut(u8, &[u8]) -> Option<T>) -> Option<T> {
    for_each_marker_with_offset(bytes, |marker, _offset, segment| f(marker, segment))
}

fn for_each_marker_with_offset<T>(
    bytes: &[u8],
    mut f: impl FnMut(u8, usize, &[u8]) -> Option<T>,
) -> Option<T> {
    let mut pos = 2; // past SOI
    while pos + 1 < bytes.len() {
        if bytes[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF || marker == 0x00 {
            pos += 1;
            continue;
        }
        if marker == EOI {
            break;
        }
        // Markers with no length field: TEM and RSTn.
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        if pos + 3 >= bytes.len() {
            break;
        }
        let seg_len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if seg_len < 2 || pos + 2 + seg_len > bytes.len() {
            break;
        }
        let segment = &bytes[pos + 4..pos + 2 + seg_len];
        if let Some(result) = f(marker, pos, segment) {
            return Some(result);
        }
        if marker == SOS {
            // entropy-coded data follows; we never scan past SOS here.
            break;
        }
        pos += 2 + seg_len;
    }
    None
}

/// RFC 2435 Q ≥ 128 inline-DQT support: zigzag permutation and the 16→8
/// bit quantization value conversion. Kept independent of the default
/// embedded-tables packetization path (see `normalize_frame`) — never
/// called from it.
pub mod qtable {
    use super::{DQT, for_each_marker};

    /// RFC 2435 §3.1.8 zigzag reordering of an 8x8 quantization table.
    pub const ZIGZAG: [u8; 64] = [
        0, 1, 5, 6, 14, 15, 27, 28, 2, 4, 7, 13, 16, 26, 29, 42, 3, 8, 12, 17, 25, 30, 41, 43, 9,
        11, 18, 24, 31, 40, 44, 53, 10, 19, 23, 32, 39, 45, 52, 54, 20, 22, 33, 38, 46, 51, 55,
        60, 21, 34, 37, 47, 50, 56, 59, 61, 35, 36, 48, 49, 57, 58, 62, 63,
    ];

    /// Convert a 16-bit quantization value to its 8-bit RFC 2435 form:
    /// zero maps to 1, otherwise `((v + 0x80) >> 8)`, clamped away from
    /// zero back to 1.
    pub fn qt_to_8bit(v16: u16) -> u8 {
        if v16 == 0 {
            return 1;
        }
        let v8 = (((v16 as u32) + 0x80) >> 8) as u8;
        if v8 == 0 { 1 } else { v8 }
    }

    /// Replace any zero entry in an 8-bit table with 1.
    pub fn sanitize_qt_8bit(table: &mut [u8; 64]) {
        for v in table.iter_mut() {
            if *v == 0 {
                *v = 1;
            }
        }
    }

    /// Reorder a natural-order table into zigzag order, sanitizing zeros.
    pub fn to_zigzag(natural: &[u8; 64]) -> [u8; 64] {
        let mut out = [0u8; 64];
        for i in 0..64 {
            out[i] = natural[ZIGZAG[i] as usize];
        }
        sanitize_qt_8bit(&mut out);
        out
    }

    /// Extract and cache the luma (id 0) and chroma (id 1) quantization
    /// tables from a JPEG's DQT segments, already converted to 8-bit and
    /// zigzag order.
    pub fn extract_and_cache(bytes: &[u8]) -> (Option<[u8; 64]>, Option<[u8; 64]>) {
        let mut luma = None;
        let mut chroma = None;

        let _ = for_each_marker(bytes, |marker, segment| -> Option<()> {
            if marker != DQT {
                return None;
            }
            let mut offset = 0;
            while offset < segment.len() {
                let pq_tq = segment[offset];
                let precision16 = (pq_tq >> 4) != 0;
                let table_id = pq_tq & 0x0F;
                offset += 1;

                let mut natural = [0u8; 64];
                if precision16 {
                    for i in 0..64 {
                        if offset + 1 >= segment.len() {
                            return None;
                        }
                        let v16 = u16::from_be_bytes([segment[offset], segment[offset + 1]]);
                        natural[i] = qt_to_8bit(v16);
                        offset += 2;
                    }
                } else {
                    for i in 0..64 {
                        if offset >= segment.len() {
                            return None;
                        }
                        natural[i] = segment[offset];
                        offset += 1;
                    }
                    sanitize_qt_8bit(&mut natural);
                }

                let zigzagged = to_zigzag(&natural);
                match table_id {
                    0 => luma = Some(zigzagged),
                    1 => chroma = Some(zigzagged),
                    _ => {}
                }
            }
            None
        });

        (luma, chroma)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn zero_maps_to_one() {
            assert_eq!(qt_to_8bit(0), 1);
        }

        #[test]
        fn typical_value_converts() {
            // 0x0100 -> (0x0100 + 0x80) >> 8 = 0x01
            assert_eq!(qt_to_8bit(0x0100), 1);
            // 0x4000 -> (0x4000 + 0x80) >> 8 = 0x40
            assert_eq!(qt_to_8bit(0x4000), 0x40);
        }

        #[test]
        fn sanitize_replaces_zeros() {
            let mut t = [0u8; 64];
            t[5] = 3;
            sanitize_qt_8bit(&mut t);
            assert_eq!(t[5], 3);
            assert!(t.iter().all(|&v| v != 0));
        }

        #[test]
        fn zigzag_is_a_permutation() {
            let mut seen = [false; 64];
            for &idx in ZIGZAG.iter() {
                assert!(!seen[idx as usize], "duplicate index in zigzag table");
                seen[idx as usize] = true;
            }
            assert!(seen.iter().all(|&s| s));
        }

        #[test]
        fn to_zigzag_reorders_natural_table() {
            let mut natural = [0u8; 64];
            for (i, v) in natural.iter_mut().enumerate() {
                *v = (i + 1) as u8;
            }
            let zig = to_zigzag(&natural);
            for i in 0..64 {
                assert_eq!(zig[i], natural[ZIGZAG[i] as usize]);
            }
        }
    }
}

/// Byte-level JPEG fixtures for tests in sibling modules (capture, mjpeg).
#[cfg(test)]
pub mod tests_support {
    use super::*;

    /// Build a minimal, syntactically valid baseline JPEG with the given
    /// dimensions and 4:2:0 sampling — enough for marker parsing, not a
    /// real displayable image.
    pub fn minimal_baseline_jpeg(width: u16, height: u16) -> Vec<u8> {
        minimal_baseline_jpeg_with_sampling(width, height, (2, 2), true)
    }

    pub fn minimal_baseline_jpeg_with_sampling(
        width: u16,
        height: u16,
        y_sampling: (u8, u8),
        include_dht: bool,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0xFF, SOI]);

        // Trivial DQT with two all-1 tables so parsing has something to read.
        let mut dqt = vec![0xFF, DQT];
        let body_len: u16 = 2 + (1 + 64) * 2;
        dqt.extend_from_slice(&body_len.to_be_bytes());
        dqt.push(0x00);
        dqt.extend_from_slice(&[1u8; 64]);
        dqt.push(0x01);
        dqt.extend_from_slice(&[1u8; 64]);
        out.extend_from_slice(&dqt);

        if include_dht {
            out.extend_from_slice(&default_dht_segment());
        }

        // SOF0: precision height width ncomponents, 3 components.
        let mut sof0 = vec![0xFF, SOF0];
        let sof0_len: u16 = 2 + 1 + 2 + 2 + 1 + 3 * 3;
        sof0.extend_from_slice(&sof0_len.to_be_bytes());
        sof0.push(8);
        sof0.extend_from_slice(&height.to_be_bytes());
        sof0.extend_from_slice(&width.to_be_bytes());
        sof0.push(3);
        sof0.push(1);
        sof0.push((y_sampling.0 << 4) | y_sampling.1);
        sof0.push(0);
        sof0.push(2);
        sof0.push(0x11);
        sof0.push(1);
        sof0.push(3);
        sof0.push(0x11);
        sof0.push(1);
        out.extend_from_slice(&sof0);

        // SOS header (trivial) + dummy entropy-coded bytes.
        let mut sos = vec![0xFF, SOS];
        let sos_len: u16 = 2 + 1 + 3 * 2 + 3;
        sos.extend_from_slice(&sos_len.to_be_bytes());
        sos.push(3);
        sos.extend_from_slice(&[1, 0x00, 2, 0x11, 3, 0x11]);
        sos.extend_from_slice(&[0, 63, 0]);
        out.extend_from_slice(&sos);

        out.extend_from_slice(&[0xAB, 0xCD, 0xEF, 0x01, 0x02]);
        out.extend_from_slice(&[0xFF, EOI]);
        out
    }
}
