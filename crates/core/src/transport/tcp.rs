use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use socket2::Socket;

use crate::frame::FrameSlot;
use crate::http;
use crate::mount::MountRegistry;
use crate::protocol::MethodHandler;
use crate::protocol::RtspRequest;
use crate::server::ServerConfig;
use crate::session::SessionManager;

/// Minimum send buffer size set on every accepted connection, matching
/// the per-connection discipline of buffering several RTP-JPEG fragments
/// without blocking the Stream Pump's delivery loop.
const MIN_SEND_BUFFER_BYTES: usize = 256 * 1024;

/// Inactivity timeout for a read on the RTSP control connection. Bounds
/// how long a dead/idle peer can keep a thread (and its shutdown-flag
/// check) from observing a server stop request.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
pub fn accept_loop(
    listener: TcpListener,
    session_manager: SessionManager,
    mounts: MountRegistry,
    config: Arc<ServerConfig>,
    frame_slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                if let Err(e) = tune_socket(&stream) {
                    tracing::warn!(error = %e, "failed to tune accepted socket, continuing anyway");
                }
                let sm = session_manager.clone();
                let r = running.clone();
                let m = mounts.clone();
                let c = config.clone();
                let fs = frame_slot.clone();
                thread::spawn(move || {
                    Connection::handle(stream, sm, m, c, fs, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Set `TCP_NODELAY` and a send buffer of at least [`MIN_SEND_BUFFER_BYTES`]
/// on a freshly accepted connection, before any RTSP/HTTP data is
/// exchanged on it.
fn tune_socket(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let sock = Socket::from(stream.try_clone()?);
    let current = sock.send_buffer_size()?;
    if current < MIN_SEND_BUFFER_BYTES {
        sock.set_send_buffer_size(MIN_SEND_BUFFER_BYTES)?;
    }
    std::mem::forget(sock); // `Socket` would otherwise close the fd on drop
    Ok(())
}

/// A single RTSP/HTTP client connection with its own lifecycle.
///
/// Serves both RTSP signaling and the plain-HTTP `/snapshot`/`/stream`
/// endpoints on the same port, dispatching on the first line of each
/// request; inbound `$`-framed interleaved binary data (which this
/// server never expects from a client) is recognized and discarded
/// rather than misparsed as a malformed RTSP request line.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    handler: MethodHandler,
    peer_addr: SocketAddr,
    frame_slot: Arc<FrameSlot>,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        stream: TcpStream,
        session_manager: SessionManager,
        mounts: MountRegistry,
        config: Arc<ServerConfig>,
        frame_slot: Arc<FrameSlot>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        let handler_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let handler = MethodHandler::new(
            session_manager.clone(),
            peer_addr,
            mounts.clone(),
            config,
            Some(handler_stream),
        );

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer: stream,
            handler,
            peer_addr,
            frame_slot,
        };

        let reason = conn.run(&running);
        conn.cleanup(&session_manager, &mounts);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/response loop. Returns the reason for exiting.
    ///
    /// The first byte of each request is peeked off the raw byte stream
    /// (never through `read_line`) so a `$`-framed interleaved packet can be
    /// recognized and consumed byte-exact, before any UTF-8 validation or
    /// newline-scanning touches its binary payload.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let first_byte = match self.reader.fill_buf() {
                Ok(buf) if buf.is_empty() => return "connection closed by client",
                Ok(buf) => buf[0],
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(_) => return "read error",
            };

            if first_byte == b'$' {
                self.reader.consume(1);
                if self.discard_interleaved_frame().is_err() {
                    return "read error while discarding interleaved frame";
                }
                continue;
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return "connection closed by client",
                Ok(_) => {}
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(_) => return "read error",
            }

            if line.starts_with("GET ") {
                let path = line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                // Drain the rest of the HTTP request's headers before responding.
                self.drain_headers();
                http::handle(&path, &mut self.writer, &self.frame_slot);
                return "HTTP connection served";
            }

            let mut request_text = line;
            loop {
                let mut next = String::new();
                match self.reader.read_line(&mut next) {
                    Ok(0) => return "connection closed by client",
                    Ok(_) => {
                        request_text.push_str(&next);
                        if next == "\r\n" || next == "\n" {
                            break;
                        }
                    }
                    Err(_) => return "read error",
                }
            }

            if request_text.trim().is_empty() {
                continue;
            }

            match RtspRequest::parse(&request_text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        uri = %request.uri,
                        version = %request.version,
                        "request"
                    );

                    let response = self.handler.handle(&request);

                    tracing::debug!(
                        peer = %self.peer_addr,
                        status = response.status_code,
                        "response"
                    );

                    if self
                        .writer
                        .write_all(response.serialize().as_bytes())
                        .is_err()
                    {
                        return "write error";
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                }
            }
        }

        "server shutting down"
    }

    /// The leading `$` has already been consumed; next comes a 1-byte
    /// channel, a 2-byte big-endian length, then that many bytes of
    /// payload (RFC 2326 §10.12). Read entirely via `read_exact` on the
    /// raw byte stream — never through a UTF-8 line reader — since the
    /// payload is arbitrary binary RTP/RTCP data that may contain bytes
    /// that aren't valid UTF-8 or that happen to equal `\n`. This server
    /// never expects inbound RTP/RTCP on the control connection, so the
    /// frame is read and dropped, not handed anywhere.
    fn discard_interleaved_frame(&mut self) -> std::io::Result<()> {
        let mut header = [0u8; 3];
        self.reader.read_exact(&mut header)?;
        let length = u16::from_be_bytes([header[1], header[2]]) as usize;
        let mut discard = vec![0u8; length];
        self.reader.read_exact(&mut discard)?;
        Ok(())
    }

    /// Read and ignore HTTP header lines up to the blank line terminator.
    fn drain_headers(&mut self) {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return,
                Ok(_) if line == "\r\n" || line == "\n" => return,
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    }

    /// Clean up sessions owned by this connection and unsubscribe from mounts.
    fn cleanup(&self, session_manager: &SessionManager, mounts: &MountRegistry) {
        let orphaned = self.handler.session_ids().to_vec();
        if !orphaned.is_empty() {
            for id in &orphaned {
                mounts.unsubscribe_all(id);
            }
            let removed = session_manager.remove_sessions(&orphaned);
            tracing::info!(peer = %self.peer_addr, removed, "cleaned up sessions on disconnect");
        }
    }
}
