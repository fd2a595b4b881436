//! # rtsp — MJPEG frame bus and RTSP/RTP-JPEG server library
//!
//! A Rust library for publishing a live MJPEG stream over the Real-Time
//! Streaming Protocol (RTSP), with a plain-HTTP snapshot/multipart sink
//! served on the same port.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP | Packet header format, SSRC generation, sequence/timestamp semantics |
//! | [RFC 2435](https://tools.ietf.org/html/rfc2435) | RTP-JPEG | JPEG payload fragmentation, restart markers, quantization table headers |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) / [RFC 8866](https://tools.ietf.org/html/rfc8866) | SDP | Session description generation for DESCRIBE responses |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  CLI                                      │
//! ├──────────────────────────────────────────┤
//! │  Server        — public API, orchestrator│
//! │  MountRegistry — named stream endpoints  │
//! │  Capture       — CaptureSource → FrameSlot│
//! ├──────────────────────────────────────────┤
//! │  FrameSlot     — fresh-frame bus          │
//! │  Stream Pump   — frame → RTP fan-out      │
//! │  HTTP          — /snapshot, /stream sink │
//! ├──────────────────────────────────────────┤
//! │  Protocol      — RTSP parsing, SDP, etc. │
//! │  Session       — state machine, transport│
//! ├──────────────────────────────────────────┤
//! │  Transport     — TCP signaling, UDP data │
//! │  Media         — RTP header, packetizers │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use rtsp::Server;
//!
//! let mut server = Server::new("0.0.0.0:8554");
//! server.start().unwrap();
//!
//! // A capture producer publishes frames into the same frame slot the
//! // server reads from:
//! let slot = server.frame_slot();
//! // slot.publish(frame);
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — High-level [`Server`] orchestrator and [`ServerConfig`].
//! - [`mount`] — [`Mount`] (stream endpoint) and [`MountRegistry`].
//! - [`frame`] — [`frame::FrameSlot`], the single-producer/many-consumer frame bus.
//! - [`capture`] — [`capture::CaptureSource`] trait and [`capture::CaptureProducer`].
//! - [`pump`] — Stream Pump: frame slot to RTP fan-out.
//! - [`http`] — plain-HTTP `/snapshot` and `/stream` sink.
//! - [`protocol`] — RTSP request/response parsing, method handling, SDP generation.
//! - [`session`] — RTSP session state machine and transport negotiation.
//! - [`transport`] — TCP listener for RTSP/HTTP signaling, UDP sender for RTP delivery.
//! - [`media`] — [`Packetizer`] trait, RTP header builder, RTP-JPEG payload format.
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod capture;
pub mod error;
pub mod frame;
pub mod http;
pub mod media;
pub mod mount;
pub mod protocol;
pub mod pump;
pub mod server;
pub mod session;
pub mod transport;

pub use capture::{CaptureProducer, CaptureSource, DirectoryCaptureSource};
pub use error::{Result, RtspError};
pub use frame::{Frame, FrameSlot, PixelFormat};
pub use media::Packetizer;
pub use mount::{DEFAULT_MOUNT_PATH, Mount, MountRegistry};
pub use server::{Server, ServerConfig};
