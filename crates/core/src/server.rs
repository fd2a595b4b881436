use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::error::{Result, RtspError};
use crate::frame::FrameSlot;
use crate::media::mjpeg::MjpegPacketizer;
use crate::mount::{DEFAULT_MOUNT_PATH, Mount, MountRegistry};
use crate::pump;
use crate::session::SessionManager;
use crate::transport::UdpTransport;
use crate::transport::tcp;

/// Server-level configuration used by protocol handlers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public host advertised in SDP `o=` lines.
    /// When `None`, host is inferred from request URI/client address.
    pub public_host: Option<String>,
    /// Public RTSP port for future URL-based headers (e.g. RTP-Info).
    pub public_port: Option<u16>,
    /// SDP origin session id field (`o=- <id> <id> ...`).
    pub sdp_session_id: String,
    /// Nominal capture frame rate, advertised in SDP `a=framerate` and
    /// used to seed the frame slot's wait-deadline and the Stream Pump's
    /// `ts_increment` (90000 / fps).
    pub fps_hint: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            public_port: None,
            sdp_session_id: "0".to_string(),
            fps_hint: 15.0,
        }
    }
}

/// High-level RTSP/HTTP server orchestrator.
///
/// Owns the session manager, mount registry, frame slot, and transport
/// layer. A separate [`crate::capture::CaptureProducer`] (constructed by
/// the caller — this crate has no device I/O of its own) publishes into
/// the same [`FrameSlot`] returned by [`Server::frame_slot`].
pub struct Server {
    session_manager: SessionManager,
    mounts: MountRegistry,
    frame_slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    bind_addr: String,
    udp: Option<Arc<UdpTransport>>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    /// Create a server with custom protocol/SDP configuration. Registers
    /// a single default MJPEG mount at [`DEFAULT_MOUNT_PATH`].
    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        let mounts = MountRegistry::new();
        mounts.add(
            DEFAULT_MOUNT_PATH,
            Box::new(MjpegPacketizer::with_random_ssrc(26)),
        );
        mounts.set_default(DEFAULT_MOUNT_PATH);

        Self {
            session_manager: SessionManager::new(),
            mounts,
            frame_slot: Arc::new(FrameSlot::new(config.fps_hint)),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            udp: None,
            config: Arc::new(config),
        }
    }

    /// The frame bus this server's mount reads from. Hand this to a
    /// [`crate::capture::CaptureProducer`] (or publish into it directly)
    /// before or after calling [`start`](Self::start).
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        self.frame_slot.clone()
    }

    /// The shutdown flag this server checks at every suspension point.
    /// Share this with an externally-owned capture thread so one signal
    /// handler can stop everything by flipping a single atomic.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn default_mount(&self) -> Arc<Mount> {
        self.mounts
            .get(DEFAULT_MOUNT_PATH)
            .expect("default mount registered in with_config")
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let udp = Arc::new(UdpTransport::bind()?);
        self.udp = Some(udp.clone());

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let session_manager = self.session_manager.clone();
        let mounts = self.mounts.clone();
        let config = self.config.clone();

        tracing::info!(addr = %self.bind_addr, "RTSP/HTTP server listening");

        {
            let running = running.clone();
            let frame_slot = self.frame_slot.clone();
            thread::spawn(move || {
                tcp::accept_loop(listener, session_manager, mounts, config, frame_slot, running);
            });
        }

        {
            let running = running.clone();
            let frame_slot = self.frame_slot.clone();
            let mount = self.default_mount();
            let session_manager = self.session_manager.clone();
            thread::spawn(move || {
                pump::run(frame_slot, mount, session_manager, udp, running);
            });
        }

        Ok(())
    }

    /// Flip the shutdown flag and wake every blocked frame-slot waiter.
    /// Cleanup of sessions/threads happens at their next suspension
    /// point, never here.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.frame_slot.shutdown();
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    pub fn mounts(&self) -> &MountRegistry {
        &self.mounts
    }

    /// Returns the server's protocol configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}
