//! Network transport layer for RTSP/HTTP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling, the
//!   plain-HTTP snapshot/stream sink, and — for clients that negotiate
//!   `interleaved=` in SETUP (RFC 2326 §10.12) — RTP data multiplexed
//!   onto the same connection using `$` framing. One TCP connection per
//!   client, with a thread per connection.
//!
//! - **UDP** ([`udp`]): carries RTP media packets for clients that
//!   negotiate unicast `client_port=` in SETUP. A single ephemeral
//!   socket is shared for all outbound RTP delivery.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
