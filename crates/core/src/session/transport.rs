use std::net::SocketAddr;

/// Negotiated RTP/RTCP transport for a session (RFC 2326 §12.39), either
/// UDP unicast (server sends to client-negotiated ports) or TCP
/// interleaved (RTP/RTCP multiplexed over the RTSP control connection
/// itself, `$`-framed per RFC 2326 §10.12).
#[derive(Debug, Clone)]
pub struct Transport {
    /// Client address the `Transport` header (or the connecting socket,
    /// for interleaved delivery) was negotiated against.
    pub client_addr: SocketAddr,
    pub kind: TransportKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    UdpUnicast {
        client_rtp_port: u16,
        client_rtcp_port: u16,
        server_rtp_port: u16,
        server_rtcp_port: u16,
    },
    TcpInterleaved {
        channel_rtp: u8,
        channel_rtcp: u8,
    },
}

/// Parsed client-side transport request from the RTSP `Transport` header
/// (RFC 2326 §12.39): either `client_port=N-M` (UDP unicast) or
/// `interleaved=N-M` (TCP, framed on the control connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTransport {
    Udp { client_rtp_port: u16, client_rtcp_port: u16 },
    Interleaved { channel_rtp: u8, channel_rtcp: u8 },
}

impl ParsedTransport {
    /// Parse the `Transport` header value. Returns `None` if it names
    /// neither `client_port=` nor `interleaved=` — the caller maps that to
    /// `461 Unsupported Transport`.
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();

            if let Some(ports) = part.strip_prefix("client_port=") {
                let (rtp, rtcp) = parse_port_pair(ports)?;
                return Some(ParsedTransport::Udp {
                    client_rtp_port: rtp,
                    client_rtcp_port: rtcp,
                });
            }

            if let Some(channels) = part.strip_prefix("interleaved=") {
                let parts: Vec<&str> = channels.split('-').collect();
                let rtp: u8 = parts.first()?.parse().ok()?;
                let rtcp: u8 = match parts.get(1) {
                    Some(s) => s.parse().ok()?,
                    None => rtp.saturating_add(1),
                };
                return Some(ParsedTransport::Interleaved {
                    channel_rtp: rtp,
                    channel_rtcp: rtcp,
                });
            }
        }
        None
    }
}

fn parse_port_pair(s: &str) -> Option<(u16, u16)> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 2 {
        return None;
    }
    let rtp: u16 = parts[0].parse().ok()?;
    let rtcp: u16 = parts[1].parse().ok()?;
    Some((rtp, rtcp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_udp_client_port() {
        let t = ParsedTransport::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(
            t,
            ParsedTransport::Udp {
                client_rtp_port: 5000,
                client_rtcp_port: 5001
            }
        );
    }

    #[test]
    fn parse_tcp_interleaved() {
        let t = ParsedTransport::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
        assert_eq!(
            t,
            ParsedTransport::Interleaved {
                channel_rtp: 0,
                channel_rtcp: 1
            }
        );
    }

    #[test]
    fn parse_interleaved_single_channel_defaults_rtcp_to_next() {
        let t = ParsedTransport::parse("RTP/AVP/TCP;interleaved=4").unwrap();
        assert_eq!(
            t,
            ParsedTransport::Interleaved {
                channel_rtp: 4,
                channel_rtcp: 5
            }
        );
    }

    #[test]
    fn parse_neither_returns_none() {
        assert!(ParsedTransport::parse("RTP/AVP;unicast").is_none());
    }
}
