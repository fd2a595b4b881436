//! MJPEG RTP packetizer — RFC 2435.
//!
//! Simpler than H.264: a JPEG frame has no NAL concept, so fragmentation is
//! a flat byte split of the trimmed frame, each fragment carrying an 8-byte
//! RTP-JPEG header ahead of its chunk. Static payload type 26:
//! `a=rtpmap:26 JPEG/90000`.

use super::Packetizer;
use super::jpeg::{self, JpegError};
use super::rtp::RtpHeader;

/// Conservative fragment size safe under both a 1400-byte UDP MTU (minus
/// the 20-byte IP + 8-byte UDP header, i.e. MTU−28) and the 8164-byte cap
/// for TCP-interleaved delivery. The Stream Pump packetizes a frame once
/// and shares the fragments across every destination session regardless of
/// its transport, so a single size that satisfies the tighter UDP bound is
/// used everywhere; TCP sessions simply receive more, smaller fragments.
pub const DEFAULT_FRAGMENT_SIZE: usize = 1400 - 28;

const JPEG_QUALITY: u8 = 75;

/// External, out-of-scope re-encoder seam. The packetizer never implements
/// this itself — it only invokes whatever is supplied, for sources that
/// are not already baseline JPEG with embedded tables.
pub trait JpegTranscoder: Send {
    fn transcode(&mut self, payload: &[u8]) -> Result<Vec<u8>, JpegError>;
}

/// RFC 2435 RTP-JPEG packetizer.
///
/// Accepts baseline JPEG bytes (normalized by the Capture Producer, see
/// `media::jpeg::normalize_frame`) and produces RTP packets carrying the
/// 8-byte JPEG-specific header (type-specific byte, 24-bit fragment
/// offset, Type, Q, Width/8, Height/8) ahead of each fragment.
pub struct MjpegPacketizer {
    header: RtpHeader,
    fragment_size: usize,
    transcoder: Option<Box<dyn JpegTranscoder>>,
    last_width: u32,
    last_height: u32,
}

impl MjpegPacketizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            transcoder: None,
            last_width: 640,
            last_height: 480,
        }
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            transcoder: None,
            last_width: 640,
            last_height: 480,
        }
    }

    pub fn with_transcoder(mut self, transcoder: Box<dyn JpegTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size.max(1);
        self
    }

    /// Last width/height successfully packetized, for SDP caching.
    pub fn last_dimensions(&self) -> (u32, u32) {
        (self.last_width, self.last_height)
    }
}

impl Packetizer for MjpegPacketizer {
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        if encoded_data.is_empty() {
            tracing::warn!("empty JPEG payload, dropping frame");
            return Vec::new();
        }

        let transcoded;
        let source: &[u8] = if let Some(transcoder) = self.transcoder.as_mut() {
            match transcoder.transcode(encoded_data) {
                Ok(bytes) => {
                    transcoded = bytes;
                    &transcoded
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transcoder rejected frame, dropping");
                    return Vec::new();
                }
            }
        } else {
            encoded_data
        };

        let info = match jpeg::probe(source) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "failed to probe JPEG header, dropping frame");
                return Vec::new();
            }
        };

        if info.width == 0 || info.height == 0 || info.width % 8 != 0 || info.height % 8 != 0 {
            tracing::warn!(
                width = info.width,
                height = info.height,
                "JPEG dimensions not divisible by 8, dropping frame"
            );
            return Vec::new();
        }

        let jpeg_type = match jpeg::classify_subsampling(&info.components) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "unsupported chroma subsampling, dropping frame");
                return Vec::new();
            }
        };

        let trimmed = match jpeg::trim_to_last_eoi(source) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to locate EOI, dropping frame");
                return Vec::new();
            }
        };

        let width_units = (info.width / 8) as u8;
        let height_units = (info.height / 8) as u8;

        let mut packets = Vec::new();
        let total = trimmed.len();
        let mut offset = 0usize;

        while offset < total {
            let chunk_len = std::cmp::min(self.fragment_size, total - offset);
            let chunk = &trimmed[offset..offset + chunk_len];
            let is_last = offset + chunk_len >= total;

            let mut jpeg_header = [0u8; 8];
            let offset_bytes = (offset as u32).to_be_bytes();
            jpeg_header[1..4].copy_from_slice(&offset_bytes[1..4]);
            jpeg_header[4] = jpeg_type;
            jpeg_header[5] = JPEG_QUALITY;
            jpeg_header[6] = width_units;
            jpeg_header[7] = height_units;

            let rtp_hdr = self.header.write(is_last);
            let mut packet = Vec::with_capacity(12 + 8 + chunk_len);
            packet.extend_from_slice(&rtp_hdr);
            packet.extend_from_slice(&jpeg_header);
            packet.extend_from_slice(chunk);
            packets.push(packet);

            offset += chunk_len;
        }

        self.last_width = info.width;
        self.last_height = info.height;
        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            fragments = packets.len(),
            frame_bytes = trimmed.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "JPEG frame packetized"
        );

        packets
    }

    fn codec_name(&self) -> &'static str {
        "JPEG"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn sdp_attributes(&self) -> Vec<String> {
        vec![
            format!(
                "a=rtpmap:{} {}/{}",
                self.payload_type(),
                self.codec_name(),
                self.clock_rate()
            ),
            format!(
                "a=fmtp:{} width={};height={}",
                self.payload_type(),
                self.last_width,
                self.last_height
            ),
            "a=control:track1".to_string(),
        ]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}
