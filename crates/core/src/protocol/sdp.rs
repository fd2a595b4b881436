//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses. The MJPEG mount
//! always emits the same fixed shape (payload type 26, JPEG/90000), so
//! unlike a multi-codec server this module doesn't need to branch on the
//! mount's codec — only the width/height/framerate vary per mount:
//!
//! ```text
//! v=0
//! o=- <sess-id> <sess-id> IN IP4 <server-ip>
//! s=MJPG-Streamer Stream
//! t=0 0
//! a=tool:MJPG-Streamer
//! m=video 0 RTP/AVP 26
//! c=IN IP4 0.0.0.0
//! b=AS:5000
//! a=control:track1
//! a=rtpmap:26 JPEG/90000
//! a=fmtp:26 width=<W>;height=<H>
//! a=framesize:26 <W>x<H>
//! a=framerate:<fps>
//! ```
//!
//! `c=IN IP4 0.0.0.0` is a fixed placeholder, not the advertised server
//! address — RTP delivery addresses are negotiated per-session in SETUP,
//! not announced in SDP, matching the original implementation's behavior.

use crate::mount::Mount;

/// Generate an SDP session description for the given mount.
///
/// `session_id` fills both origin-line timestamps (`o=- <id> <id> ...`);
/// callers typically pass a value derived from the server's start time.
/// `fps` is the capture source's nominal frame rate, used only for the
/// advertised `a=framerate` line.
pub fn generate_sdp(mount: &Mount, server_ip: &str, session_id: &str, fps: f64) -> String {
    let (width, height) = mount.dims();
    let pt = mount.payload_type();

    let sdp = vec![
        "v=0".to_string(),
        format!("o=- {session_id} {session_id} IN IP4 {server_ip}"),
        "s=MJPG-Streamer Stream".to_string(),
        "t=0 0".to_string(),
        "a=tool:MJPG-Streamer".to_string(),
        format!("m=video 0 RTP/AVP {pt}"),
        "c=IN IP4 0.0.0.0".to_string(),
        "b=AS:5000".to_string(),
        "a=control:track1".to_string(),
        format!("a=rtpmap:{pt} JPEG/90000"),
        format!("a=fmtp:{pt} width={width};height={height}"),
        format!("a=framesize:{pt} {width}x{height}"),
        format!("a=framerate:{fps}"),
    ];

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::mjpeg::MjpegPacketizer;

    #[test]
    fn generates_literal_mjpeg_sdp_shape() {
        let mount = Mount::new("/stream", Box::new(MjpegPacketizer::new(26, 0x1234)));
        mount.update_dims(1920, 1080);
        let sdp = generate_sdp(&mount, "192.168.1.100", "1234567890", 15.0);

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 1234567890 1234567890 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("s=MJPG-Streamer Stream\r\n"));
        assert!(sdp.contains("t=0 0\r\n"));
        assert!(sdp.contains("a=tool:MJPG-Streamer\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 26\r\n"));
        assert!(
            sdp.contains("c=IN IP4 0.0.0.0\r\n"),
            "c= line is a fixed placeholder, not the server address"
        );
        assert!(sdp.contains("b=AS:5000\r\n"));
        assert!(sdp.contains("a=control:track1\r\n"));
        assert!(sdp.contains("a=rtpmap:26 JPEG/90000\r\n"));
        assert!(sdp.contains("a=fmtp:26 width=1920;height=1080\r\n"));
        assert!(sdp.contains("a=framesize:26 1920x1080\r\n"));
        assert!(sdp.contains("a=framerate:15\r\n"));
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn uses_default_dimensions_before_any_frame_published() {
        let mount = Mount::new("/stream", Box::new(MjpegPacketizer::new(26, 0x1234)));
        let sdp = generate_sdp(&mount, "10.0.0.1", "1", 30.0);
        assert!(sdp.contains("width=640;height=480"));
        assert!(sdp.contains("a=framesize:26 640x480\r\n"));
    }

    #[test]
    fn ordering_matches_the_fixed_template() {
        let mount = Mount::new("/stream", Box::new(MjpegPacketizer::new(26, 0x1234)));
        let sdp = generate_sdp(&mount, "10.0.0.1", "1", 30.0);
        let idx = |needle: &str| sdp.find(needle).unwrap();
        assert!(idx("m=video") < idx("c=IN IP4"));
        assert!(idx("c=IN IP4") < idx("b=AS:5000"));
        assert!(idx("b=AS:5000") < idx("a=control"));
        assert!(idx("a=control") < idx("a=rtpmap"));
        assert!(idx("a=rtpmap") < idx("a=fmtp"));
        assert!(idx("a=fmtp") < idx("a=framesize"));
        assert!(idx("a=framesize") < idx("a=framerate"));
    }
}
