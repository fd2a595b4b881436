//! Plain-HTTP sink served on the same TCP port as RTSP: a single JPEG
//! snapshot and a blocking MJPEG multipart stream.
//!
//! Both endpoints read from the same [`FrameSlot`] the RTSP/RTP path
//! reads from — this is a read-only side channel, not a second producer.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;

use crate::frame::{FrameSlot, WaitOutcome};

pub const MULTIPART_BOUNDARY: &str = "mjpegboundary";

/// Dispatch a plain-HTTP GET request (the only method this sink serves)
/// for `path` onto `stream`. Blocks for the lifetime of `/stream`
/// requests; returns once the response (or stream) is complete or the
/// client disconnects.
pub fn handle(path: &str, stream: &mut TcpStream, slot: &Arc<FrameSlot>) {
    match path {
        "/snapshot" => handle_snapshot(stream, slot),
        "/stream" => handle_stream(stream, slot),
        _ => {
            let body = b"Not Found";
            let _ = write!(
                stream,
                "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(body);
        }
    }
}

fn handle_snapshot(stream: &mut TcpStream, slot: &Arc<FrameSlot>) {
    match slot.snapshot() {
        Some(frame) => {
            let header = format!(
                "HTTP/1.1 200 OK\r\n\
                 Content-Type: image/jpeg\r\n\
                 Content-Length: {}\r\n\
                 Cache-Control: no-store, no-cache, must-revalidate, max-age=0\r\n\
                 Pragma: no-cache\r\n\r\n",
                frame.payload.len()
            );
            if stream.write_all(header.as_bytes()).is_err() {
                return;
            }
            let _ = stream.write_all(&frame.payload);
        }
        None => {
            tracing::debug!("GET /snapshot before any frame published");
            let _ = stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n");
        }
    }
}

fn handle_stream(stream: &mut TcpStream, slot: &Arc<FrameSlot>) {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace;boundary={MULTIPART_BOUNDARY}\r\n\r\n"
    );
    if stream.write_all(header.as_bytes()).is_err() {
        return;
    }

    let mut last_seen = 0u32;
    loop {
        let deadline = slot.default_deadline();
        let frame = match slot.wait_fresh(last_seen, deadline) {
            WaitOutcome::Fresh(frame) => frame,
            WaitOutcome::Timeout => continue,
            WaitOutcome::Shutdown => return,
        };
        last_seen = frame.sequence;

        let part_header = format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.payload.len()
        );
        if stream.write_all(part_header.as_bytes()).is_err() {
            return;
        }
        if stream.write_all(&frame.payload).is_err() {
            return;
        }
        if stream.write_all(b"\r\n").is_err() {
            return;
        }
    }
}
