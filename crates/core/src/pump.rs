//! Stream Pump: turns fresh frames into RTP delivery to every playing
//! session of a mount.
//!
//! Runs on its own thread, one per server. Each cycle: wait for a fresh
//! frame, update the mount's cached SDP dimensions, packetize once, then
//! fan the resulting fragments out to every `Playing` session — UDP
//! unicast or TCP-interleaved, depending on what each session negotiated
//! in SETUP. A session whose send fails is simply skipped for this
//! frame; it is never retried and its RTP state is untouched, so a
//! dropped send never desyncs a session that is still alive.
//!
//! The mount owns a single shared packetizer (one RTP sequence/timestamp
//! timeline per mount, not per session) — every subscriber of a mount
//! sees the same RTP stream, matching a broadcast-style MJPEG server
//! rather than one independent encoder per viewer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::frame::{FrameSlot, WaitOutcome};
use crate::mount::Mount;
use crate::session::{Session, SessionManager, TransportKind};
use crate::transport::UdpTransport;

const DEFAULT_CLOCK_RATE: f64 = 90_000.0;

pub fn run(
    slot: Arc<FrameSlot>,
    mount: Arc<Mount>,
    sessions: SessionManager,
    udp: Arc<UdpTransport>,
    running: Arc<AtomicBool>,
) {
    let mut last_seen = 0u32;
    let mut cached_fps = 0.0_f64;
    let mut ts_increment = (DEFAULT_CLOCK_RATE / 15.0) as u32;

    while running.load(Ordering::SeqCst) {
        let deadline = slot.default_deadline();
        let frame = match slot.wait_fresh(last_seen, deadline) {
            WaitOutcome::Fresh(frame) => frame,
            WaitOutcome::Timeout => continue,
            WaitOutcome::Shutdown => break,
        };
        last_seen = frame.sequence;

        mount.update_dims(frame.width, frame.height);

        let fps = slot.fps_hint();
        if fps != cached_fps {
            cached_fps = fps;
            ts_increment = if fps > 0.0 {
                (DEFAULT_CLOCK_RATE / fps).round() as u32
            } else {
                ts_increment
            };
        }

        let packets = mount.packetize(&frame.payload, ts_increment);
        if packets.is_empty() {
            tracing::warn!(sequence = frame.sequence, "frame produced no RTP fragments, dropping");
            continue;
        }

        let playing = sessions.get_playing_sessions();
        let mut sent = 0usize;
        for session in &playing {
            if deliver(session, &packets, &udp) {
                sent += 1;
            }
        }
        tracing::debug!(
            sequence = frame.sequence,
            fragments = packets.len(),
            sessions = playing.len(),
            delivered = sent,
            "pump cycle complete"
        );
    }

    tracing::info!("stream pump stopped");
}

/// Send every fragment of this cycle's frame to one session. Returns
/// `false` on the first failed fragment, at which point the remaining
/// fragments for this session are abandoned — the session simply missed
/// this frame.
fn deliver(session: &Arc<Session>, packets: &[Vec<u8>], udp: &UdpTransport) -> bool {
    let Some(transport) = session.get_transport() else {
        return false;
    };

    match transport.kind {
        TransportKind::UdpUnicast { .. } => {
            for packet in packets {
                if let Err(e) = udp.send_to(packet, transport.client_addr) {
                    tracing::warn!(session_id = %session.id, error = %e, "UDP send failed, dropping session's frame");
                    return false;
                }
            }
            true
        }
        TransportKind::TcpInterleaved { channel_rtp, .. } => {
            for packet in packets {
                if let Err(e) = session.send_interleaved(channel_rtp, packet) {
                    tracing::warn!(session_id = %session.id, error = %e, "interleaved send failed, dropping session's frame");
                    return false;
                }
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, PixelFormat};
    use crate::session::Transport;
    use std::net::SocketAddr;
    use std::time::SystemTime;

    fn test_frame() -> Frame {
        Frame {
            payload: Arc::from(
                crate::media::jpeg::tests_support::minimal_baseline_jpeg(16, 16).into_boxed_slice(),
            ),
            width: 16,
            height: 16,
            pixel_format: PixelFormat::Jpeg,
            capture_timestamp: SystemTime::now(),
            sequence: 0,
        }
    }

    #[test]
    fn deliver_to_udp_session_succeeds_against_a_real_socket() {
        let udp = UdpTransport::bind().unwrap();
        let target = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = target.local_addr().unwrap();

        let session = Arc::new(crate::session::Session::new("rtsp://host/stream"));
        session.set_transport(Transport {
            client_addr: addr,
            kind: TransportKind::UdpUnicast {
                client_rtp_port: addr.port(),
                client_rtcp_port: addr.port() + 1,
                server_rtp_port: 5000,
                server_rtcp_port: 5001,
            },
        });

        let packets = vec![vec![1, 2, 3], vec![4, 5, 6]];
        assert!(deliver(&session, &packets, &udp));

        let mut buf = [0u8; 16];
        let (n, _) = target.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[test]
    fn deliver_without_transport_configured_fails() {
        let udp = UdpTransport::bind().unwrap();
        let session = Arc::new(crate::session::Session::new("rtsp://host/stream"));
        let packets = vec![vec![1, 2, 3]];
        assert!(!deliver(&session, &packets, &udp));
    }

    #[test]
    fn deliver_interleaved_without_writer_fails() {
        let udp = UdpTransport::bind().unwrap();
        let addr: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        let session = Arc::new(crate::session::Session::new("rtsp://host/stream"));
        session.set_transport(Transport {
            client_addr: addr,
            kind: TransportKind::TcpInterleaved {
                channel_rtp: 0,
                channel_rtcp: 1,
            },
        });
        let packets = vec![vec![1, 2, 3]];
        assert!(!deliver(&session, &packets, &udp));
    }

    #[test]
    fn pump_updates_mount_dims_from_published_frame() {
        let slot = Arc::new(FrameSlot::new(1000.0));
        let mount = Arc::new(Mount::new(
            "/stream",
            Box::new(crate::media::mjpeg::MjpegPacketizer::new(26, 1)),
        ));
        let sessions = SessionManager::new();
        let udp = Arc::new(UdpTransport::bind().unwrap());
        let running = Arc::new(AtomicBool::new(true));

        slot.publish(test_frame());

        let handle = {
            let slot = slot.clone();
            let mount = mount.clone();
            let running = running.clone();
            std::thread::spawn(move || run(slot, mount, sessions, udp, running))
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        running.store(false, Ordering::SeqCst);
        slot.shutdown();
        handle.join().unwrap();

        assert_eq!(mount.dims(), (16, 16));
    }
}
