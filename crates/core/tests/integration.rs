//! Integration tests: full RTSP handshakes (UDP and TCP-interleaved) and
//! the plain-HTTP snapshot/stream sink, each against a server bound to a
//! real TCP port.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use rtsp::{Frame, PixelFormat, Server};

fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
        && len > 0
    {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        response.push_str(&String::from_utf8_lossy(&body));
    }

    Ok(response)
}

fn session_id_from(response: &str) -> String {
    response
        .lines()
        .find(|l| l.to_lowercase().starts_with("session:"))
        .and_then(|l| l.split(':').nth(1))
        .map(|v| v.trim().split(';').next().unwrap_or("").trim().to_string())
        .unwrap_or_default()
}

fn connect(bind: &str) -> TcpStream {
    let addr = bind.to_socket_addrs().unwrap().next().unwrap();
    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

fn minimal_jpeg_frame() -> Frame {
    Frame {
        payload: std::sync::Arc::from(
            jpeg_bytes().into_boxed_slice(),
        ),
        width: 16,
        height: 16,
        pixel_format: PixelFormat::Jpeg,
        capture_timestamp: std::time::SystemTime::now(),
        sequence: 0,
    }
}

/// A minimal but structurally valid baseline JPEG: SOI, a single-component
/// (grayscale) SOF0 segment declaring 16x16, then EOI. Enough for marker
/// parsing and RTP-JPEG packetization, not a real displayable image.
fn jpeg_bytes() -> Vec<u8> {
    vec![
        0xFF, 0xD8, // SOI
        0xFF, 0xC0, 0x00, 0x0B, // SOF0, length 11
        0x08, // precision
        0x00, 0x10, // height 16
        0x00, 0x10, // width 16
        0x01, // 1 component
        0x01, 0x11, 0x00, // id=1, sampling 1x1, qtable 0
        0xFF, 0xD9, // EOI
    ]
}

#[test]
fn full_handshake_options_describe_setup_play_udp() {
    const BIND: &str = "127.0.0.1:18554";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let base_uri = format!("rtsp://{}/stream", BIND);

    let opt_resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS {base_uri} RTSP/1.0\r\nCSeq: 1\r\n\r\n"),
    )
    .unwrap();
    assert!(opt_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(opt_resp.contains("Public:"));

    let desc_resp = rtsp_request(
        &mut stream,
        &format!("DESCRIBE {base_uri} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n"),
    )
    .unwrap();
    assert!(desc_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(desc_resp.contains("Content-Type: application/sdp"));
    assert!(desc_resp.contains("v=0"));
    assert!(desc_resp.contains("m=video 0 RTP/AVP 26"));
    assert!(desc_resp.contains("a=rtpmap:26 JPEG/90000"));

    let setup_resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {base_uri}/track1 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n"
        ),
    )
    .unwrap();
    assert!(setup_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(setup_resp.contains("Session:"));
    assert!(setup_resp.contains("Transport:"));
    assert!(setup_resp.contains("server_port="));

    let session_id = session_id_from(&setup_resp);
    assert!(!session_id.is_empty());

    let play_resp = rtsp_request(
        &mut stream,
        &format!("PLAY {base_uri} RTSP/1.0\r\nCSeq: 4\r\nSession: {session_id}\r\n\r\n"),
    )
    .unwrap();
    assert!(play_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(play_resp.contains("RTP-Info:"));

    // A second PLAY on an already-playing session is idempotent, not an error.
    let replay_resp = rtsp_request(
        &mut stream,
        &format!("PLAY {base_uri} RTSP/1.0\r\nCSeq: 5\r\nSession: {session_id}\r\n\r\n"),
    )
    .unwrap();
    assert!(replay_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(replay_resp.contains("RTP-Info:"));

    // SETUP naming a Playing session's ID must fail rather than rebind.
    let setup_while_playing_resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {base_uri}/track1 RTSP/1.0\r\nCSeq: 6\r\nSession: {session_id}\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n"
        ),
    )
    .unwrap();
    assert!(setup_while_playing_resp.starts_with("RTSP/1.0 455"));

    let teardown_resp = rtsp_request(
        &mut stream,
        &format!("TEARDOWN {base_uri} RTSP/1.0\r\nCSeq: 7\r\nSession: {session_id}\r\n\r\n"),
    )
    .unwrap();
    assert!(teardown_resp.starts_with("RTSP/1.0 200 OK"));

    server.stop();
}

#[test]
fn setup_rebinds_transport_on_existing_ready_session() {
    const BIND: &str = "127.0.0.1:18559";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let base_uri = format!("rtsp://{}/stream", BIND);

    let first_setup = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {base_uri}/track1 RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n"
        ),
    )
    .unwrap();
    assert!(first_setup.starts_with("RTSP/1.0 200 OK"));
    let session_id = session_id_from(&first_setup);

    // Re-SETUP on the same (still Ready, not Playing) session rebinds
    // transport rather than creating an orphaned second session.
    let second_setup = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {base_uri}/track1 RTSP/1.0\r\nCSeq: 2\r\nSession: {session_id}\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n"
        ),
    )
    .unwrap();
    assert!(second_setup.starts_with("RTSP/1.0 200 OK"));
    assert_eq!(session_id_from(&second_setup), session_id);
    assert!(second_setup.contains("client_port=6000-6001"));

    server.stop();
}

#[test]
fn setup_with_interleaved_transport_negotiates_tcp_channels() {
    const BIND: &str = "127.0.0.1:18555";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let base_uri = format!("rtsp://{}/stream", BIND);

    let setup_resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {base_uri}/track1 RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP/TCP;interleaved=0-1\r\n\r\n"
        ),
    )
    .unwrap();
    assert!(setup_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(setup_resp.contains("RTP/AVP/TCP;interleaved=0-1"));

    let session_id = session_id_from(&setup_resp);
    let play_resp = rtsp_request(
        &mut stream,
        &format!("PLAY {base_uri} RTSP/1.0\r\nCSeq: 2\r\nSession: {session_id}\r\n\r\n"),
    )
    .unwrap();
    assert!(play_resp.starts_with("RTSP/1.0 200 OK"));

    // Publish a frame and confirm the pump writes at least one interleaved
    // RTP packet (`$` + channel 0) back onto this same connection.
    let slot = server.frame_slot();
    slot.publish(minimal_jpeg_frame());

    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut marker = [0u8; 1];
    stream.read_exact(&mut marker).expect("interleaved frame marker");
    assert_eq!(marker[0], b'$');

    server.stop();
}

#[test]
fn setup_with_garbled_transport_header_returns_461() {
    const BIND: &str = "127.0.0.1:18556";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let base_uri = format!("rtsp://{}/stream", BIND);

    let setup_resp = rtsp_request(
        &mut stream,
        &format!("SETUP {base_uri}/track1 RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast\r\n\r\n"),
    )
    .unwrap();
    assert!(setup_resp.starts_with("RTSP/1.0 461"));

    server.stop();
}

#[test]
fn http_snapshot_returns_503_then_200_after_publish() {
    const BIND: &str = "127.0.0.1:18557";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    stream
        .write_all(b"GET /snapshot HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    assert!(String::from_utf8_lossy(&buf).starts_with("HTTP/1.1 503"));

    server.frame_slot().publish(minimal_jpeg_frame());

    let mut stream2 = connect(BIND);
    stream2
        .write_all(b"GET /snapshot HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let mut buf2 = Vec::new();
    stream2.read_to_end(&mut buf2).unwrap();
    let text = String::from_utf8_lossy(&buf2);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("image/jpeg"));
    assert!(buf2.ends_with(&jpeg_bytes()));

    server.stop();
}

#[test]
fn http_stream_emits_multipart_chunk() {
    const BIND: &str = "127.0.0.1:18558";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    server.frame_slot().publish(minimal_jpeg_frame());

    let mut stream = connect(BIND);
    stream
        .write_all(b"GET /stream HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).expect("read multipart header/chunk");
    let text = String::from_utf8_lossy(&buf[..n]);
    assert!(text.contains("multipart/x-mixed-replace"));
    assert!(text.contains("--mjpegboundary"));

    server.stop();
}
