use crate::mount::MountRegistry;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::server::ServerConfig;
use crate::session::transport::{ParsedTransport, Transport, TransportKind};
use crate::session::{SessionManager, SessionState};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

/// Handles RTSP method requests for a single TCP connection.
///
/// Tracks which sessions were created on this connection so they
/// can be cleaned up when the connection drops.
pub struct MethodHandler {
    session_manager: SessionManager,
    mounts: MountRegistry,
    client_addr: SocketAddr,
    config: Arc<ServerConfig>,
    /// Cloned control-connection socket, handed to sessions that negotiate
    /// TCP-interleaved transport so the Stream Pump can write RTP data onto
    /// this same connection.
    conn_stream: Option<TcpStream>,
    /// Session IDs created during this connection, for cleanup on disconnect.
    session_ids: Vec<String>,
}

impl MethodHandler {
    pub fn new(
        session_manager: SessionManager,
        client_addr: SocketAddr,
        mounts: MountRegistry,
        config: Arc<ServerConfig>,
        conn_stream: Option<TcpStream>,
    ) -> Self {
        MethodHandler {
            session_manager,
            mounts,
            client_addr,
            config,
            conn_stream,
            session_ids: Vec::new(),
        }
    }

    /// Returns session IDs owned by this connection (for cleanup on disconnect).
    pub fn session_ids(&self) -> &[String] {
        &self.session_ids
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq().unwrap_or("0");

        match request.method.as_str() {
            "OPTIONS" => self.handle_options(cseq),
            "DESCRIBE" => self.handle_describe(cseq, &request.uri),
            "SETUP" => self.handle_setup(cseq, request),
            "PLAY" => self.handle_play(cseq, request),
            "PAUSE" => self.handle_pause(cseq, request),
            "TEARDOWN" => self.handle_teardown(cseq, request),
            "GET_PARAMETER" => self.handle_get_parameter(cseq, request),
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                RtspResponse::new(501, "Not Implemented").add_header("CSeq", cseq)
            }
        }
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok().add_header("CSeq", cseq).add_header(
            "Public",
            "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER",
        )
    }

    /// Parses host from an RTSP URI (e.g. rtsp://host:8554/path -> host). Falls back to client IP if invalid.
    fn host_from_uri_or_client(&self, uri: &str) -> String {
        if let Some(host) = &self.config.public_host {
            return host.clone();
        }

        if let Some(after_scheme) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            let host = after_scheme
                .split('/')
                .next()
                .and_then(|host_port| host_port.split(':').next())
                .unwrap_or("")
                .trim();
            if !host.is_empty() {
                return host.to_string();
            }
        }
        self.client_addr.ip().to_string()
    }

    fn handle_describe(&self, cseq: &str, uri: &str) -> RtspResponse {
        tracing::debug!(%cseq, uri, "DESCRIBE");

        let mount = match self.mounts.resolve_from_uri(uri) {
            Some(m) => m,
            None => {
                tracing::warn!(uri, "DESCRIBE for unknown mount");
                return RtspResponse::not_found().add_header("CSeq", cseq);
            }
        };

        let host = self.host_from_uri_or_client(uri);
        let sdp = sdp::generate_sdp(
            &mount,
            &host,
            &self.config.sdp_session_id,
            self.config.fps_hint,
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", uri)
            .with_body(sdp)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let mount = match self.mounts.resolve_from_uri(&request.uri) {
            Some(m) => m,
            None => {
                tracing::warn!(uri = %request.uri, "SETUP for unknown mount");
                return RtspResponse::not_found().add_header("CSeq", cseq);
            }
        };

        let transport_header = match request.get_header("Transport") {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, "SETUP missing Transport header");
                return RtspResponse::bad_request().add_header("CSeq", cseq);
            }
        };

        let parsed = match ParsedTransport::parse(transport_header) {
            Some(p) => p,
            None => {
                tracing::warn!(%cseq, transport = %transport_header, "SETUP names neither client_port= nor interleaved=");
                return RtspResponse::new(461, "Unsupported Transport")
                    .add_header("CSeq", cseq)
                    .add_header(
                        "Unsupported",
                        "Transport header must specify client_port= (UDP) or interleaved= (TCP)",
                    );
            }
        };

        // A second SETUP on an existing session rebinds transport as long as
        // playback hasn't started; once Playing, the transport is in active
        // use and a re-SETUP must fail rather than silently replace it.
        let (session, is_rebind) = match self.extract_session_id(request) {
            Some(existing_id) => match self.session_manager.get_session(&existing_id) {
                Some(session) => {
                    if session.get_state() == SessionState::Playing {
                        tracing::warn!(session_id = existing_id, "SETUP on a Playing session rejected");
                        return RtspResponse::new(455, "Method Not Valid In This State")
                            .add_header("CSeq", cseq);
                    }
                    (session, true)
                }
                None => {
                    tracing::warn!(session_id = existing_id, "SETUP named an unknown session");
                    return RtspResponse::new(454, "Session Not Found").add_header("CSeq", cseq);
                }
            },
            None => (self.session_manager.create_session(&request.uri), false),
        };
        let session_id = session.id.clone();

        let transport_response = match parsed {
            ParsedTransport::Udp {
                client_rtp_port,
                client_rtcp_port,
            } => {
                let (server_rtp_port, server_rtcp_port) =
                    match self.session_manager.allocate_server_ports() {
                        Ok(ports) => ports,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to allocate server ports");
                            self.session_manager.remove_session(&session_id);
                            return RtspResponse::new(500, "Internal Server Error")
                                .add_header("CSeq", cseq);
                        }
                    };

                let client_addr = SocketAddr::new(self.client_addr.ip(), client_rtp_port);
                session.set_transport(Transport {
                    client_addr,
                    kind: TransportKind::UdpUnicast {
                        client_rtp_port,
                        client_rtcp_port,
                        server_rtp_port,
                        server_rtcp_port,
                    },
                });

                tracing::info!(
                    session_id,
                    mount = %mount.path(),
                    uri = %request.uri,
                    client_rtp = %client_addr,
                    server_rtp_port,
                    is_rebind,
                    "transport bound via SETUP (UDP)"
                );

                format!(
                    "RTP/AVP;unicast;client_port={client_rtp_port}-{client_rtcp_port};server_port={server_rtp_port}-{server_rtcp_port}"
                )
            }
            ParsedTransport::Interleaved {
                channel_rtp,
                channel_rtcp,
            } => {
                session.set_transport(Transport {
                    client_addr: self.client_addr,
                    kind: TransportKind::TcpInterleaved {
                        channel_rtp,
                        channel_rtcp,
                    },
                });

                if let Some(stream) = self.conn_stream.as_ref() {
                    match stream.try_clone() {
                        Ok(cloned) => session.set_tcp_writer(cloned),
                        Err(e) => {
                            tracing::error!(error = %e, "failed to clone control connection for interleaved delivery");
                            self.session_manager.remove_session(&session_id);
                            return RtspResponse::new(500, "Internal Server Error")
                                .add_header("CSeq", cseq);
                        }
                    }
                }

                tracing::info!(
                    session_id,
                    mount = %mount.path(),
                    uri = %request.uri,
                    channel_rtp,
                    channel_rtcp,
                    is_rebind,
                    "transport bound via SETUP (TCP interleaved)"
                );

                format!("RTP/AVP/TCP;interleaved={channel_rtp}-{channel_rtcp}")
            }
        };

        session.set_state(SessionState::Ready);
        mount.subscribe(&session_id);
        if !is_rebind {
            self.session_ids.push(session_id.clone());
        }

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport_response)
            .add_header("Session", &session.session_header_value())
    }

    fn handle_play(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session_id = match self.extract_session_id(request) {
            Some(id) => id,
            None => {
                tracing::warn!(%cseq, "PLAY missing Session header");
                return RtspResponse::new(454, "Session Not Found").add_header("CSeq", cseq);
            }
        };

        match self.session_manager.get_session(&session_id) {
            Some(session) => {
                let state = session.get_state();
                if !matches!(
                    state,
                    SessionState::Ready | SessionState::Paused | SessionState::Playing
                ) {
                    tracing::warn!(session_id, ?state, "PLAY invalid in current state");
                    return RtspResponse::new(455, "Method Not Valid In This State")
                        .add_header("CSeq", cseq);
                }

                session.mark_rtp_state_initialized_if_first_play();
                session.set_state(SessionState::Playing);
                if state == SessionState::Playing {
                    tracing::debug!(session_id, "PLAY on already-playing session, resending RTP-Info");
                } else {
                    tracing::info!(session_id, "session started playing");
                }

                let mut resp = RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session.session_header_value())
                    .add_header("Range", "npt=0.000-");

                if let Some(mount) = self.mounts.resolve_from_uri(&session.uri) {
                    let rtp_info = format!(
                        "url={};seq={};rtptime={}",
                        session.uri,
                        mount.next_sequence(),
                        mount.next_rtp_timestamp()
                    );
                    resp = resp.add_header("RTP-Info", &rtp_info);
                }

                resp
            }
            None => {
                tracing::warn!(session_id, "PLAY for unknown session");
                RtspResponse::new(454, "Session Not Found").add_header("CSeq", cseq)
            }
        }
    }

    fn handle_pause(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session_id = match self.extract_session_id(request) {
            Some(id) => id,
            None => {
                tracing::warn!(%cseq, "PAUSE missing Session header");
                return RtspResponse::new(454, "Session Not Found").add_header("CSeq", cseq);
            }
        };

        match self.session_manager.get_session(&session_id) {
            Some(session) => {
                if session.get_state() != SessionState::Playing {
                    tracing::warn!(session_id, state = ?session.get_state(), "PAUSE invalid in current state");
                    return RtspResponse::new(455, "Method Not Valid In This State")
                        .add_header("CSeq", cseq);
                }

                session.set_state(SessionState::Paused);
                tracing::info!(session_id, "session paused");
                RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session.session_header_value())
            }
            None => {
                tracing::warn!(session_id, "PAUSE for unknown session");
                RtspResponse::new(454, "Session Not Found").add_header("CSeq", cseq)
            }
        }
    }

    fn handle_teardown(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session_id = match self.extract_session_id(request) {
            Some(id) => id,
            None => {
                tracing::warn!(%cseq, "TEARDOWN missing Session header");
                return RtspResponse::new(454, "Session Not Found").add_header("CSeq", cseq);
            }
        };

        match self.session_manager.remove_session(&session_id) {
            Some(_) => {
                self.mounts.unsubscribe_all(&session_id);
                self.session_ids.retain(|id| id != &session_id);
                tracing::info!(session_id, "session terminated via TEARDOWN");
                RtspResponse::ok().add_header("CSeq", cseq)
            }
            None => {
                tracing::warn!(session_id, "TEARDOWN for unknown session");
                RtspResponse::new(454, "Session Not Found").add_header("CSeq", cseq)
            }
        }
    }

    /// GET_PARAMETER is used by clients (e.g. VLC) as a keepalive (RFC 2326 §10.8).
    fn handle_get_parameter(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        tracing::trace!(%cseq, "GET_PARAMETER keepalive");

        let mut resp = RtspResponse::ok().add_header("CSeq", cseq);

        if let Some(id) = self.extract_session_id(request)
            && self.session_manager.get_session(&id).is_some()
        {
            resp = resp.add_header("Session", &id);
        }

        resp
    }

    /// Extract session ID from the Session header.
    /// Handles timeout suffix: "SESSIONID;timeout=60" -> "SESSIONID"
    fn extract_session_id(&self, request: &RtspRequest) -> Option<String> {
        request
            .get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
    }
}
