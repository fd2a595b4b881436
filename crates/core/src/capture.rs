//! Capture input stage: reads raw frames from an external device and
//! publishes them into a [`FrameSlot`].
//!
//! The actual device (V4L2, a network camera, a test-pattern generator) is
//! an external collaborator behind the [`CaptureSource`] trait — this
//! module only owns the retry/validation/publish loop around it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::frame::{Frame, FrameSlot, PixelFormat};
use crate::media::jpeg;

/// A raw frame as handed over by a [`CaptureSource`], before SOI/EOI
/// validation or Huffman-table normalization.
pub struct RawFrame {
    pub payload: Vec<u8>,
    pub pixel_format: PixelFormat,
}

/// Transient failures are retried; persistent failures end the capture
/// loop and shut down the [`FrameSlot`].
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("transient capture failure: {0}")]
    Transient(String),
    #[error("persistent capture failure: {0}")]
    Persistent(String),
}

/// External device boundary. Implementations own whatever I/O is needed
/// (ioctl calls, a socket, a file) to produce one frame per call.
///
/// This crate does not implement V4L2/camera access itself — that lives
/// outside this crate's scope. [`CaptureProducer`] only requires that a
/// source exist; production binaries supply their own.
pub trait CaptureSource: Send {
    fn next_frame(&mut self) -> Result<RawFrame, CaptureError>;
}

/// Drives a [`CaptureSource`] in a loop, validating and normalizing each
/// frame before publishing it to a [`FrameSlot`].
pub struct CaptureProducer<S: CaptureSource> {
    source: S,
    slot: Arc<FrameSlot>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl<S: CaptureSource> CaptureProducer<S> {
    pub fn new(source: S, slot: Arc<FrameSlot>, running: Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self {
            source,
            slot,
            running,
        }
    }

    /// Run the capture loop on the calling thread until a persistent
    /// error occurs or `running` is cleared.
    pub fn run(mut self) {
        use std::sync::atomic::Ordering;

        while self.running.load(Ordering::SeqCst) {
            match self.source.next_frame() {
                Ok(raw) => self.handle_raw_frame(raw),
                Err(CaptureError::Transient(msg)) => {
                    tracing::warn!(error = %msg, "transient capture error, retrying");
                    thread::sleep(Duration::from_millis(50));
                }
                Err(CaptureError::Persistent(msg)) => {
                    tracing::error!(error = %msg, "persistent capture error, shutting down");
                    break;
                }
            }
        }

        self.slot.shutdown();
        tracing::info!("capture producer stopped");
    }

    fn handle_raw_frame(&mut self, raw: RawFrame) {
        let payload = match raw.pixel_format {
            PixelFormat::Mjpeg | PixelFormat::Jpeg => match jpeg::normalize_frame(&raw.payload) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed JPEG frame");
                    return;
                }
            },
            _ => raw.payload,
        };

        let (width, height) = match raw.pixel_format {
            PixelFormat::Mjpeg | PixelFormat::Jpeg => match jpeg::probe(&payload) {
                Ok(info) => (info.width, info.height),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping frame with unreadable header");
                    return;
                }
            },
            _ => (0, 0),
        };

        self.slot.publish(Frame {
            payload: Arc::from(payload.into_boxed_slice()),
            width,
            height,
            pixel_format: raw.pixel_format,
            capture_timestamp: std::time::SystemTime::now(),
            sequence: 0,
        });
    }
}

/// A development/test [`CaptureSource`] that cycles through the `.jpg`
/// files in a directory, sleeping between frames to approximate a fixed
/// frame rate. Not a substitute for a real device driver — useful for
/// running this crate's server end to end without camera hardware.
pub struct DirectoryCaptureSource {
    paths: Vec<std::path::PathBuf>,
    index: usize,
    frame_interval: Duration,
}

impl DirectoryCaptureSource {
    pub fn open(dir: &std::path::Path, fps: f64) -> std::io::Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jpg" || ext == "jpeg"))
            .collect();
        paths.sort();

        let interval = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::from_millis(100)
        };

        Ok(Self {
            paths,
            index: 0,
            frame_interval: interval,
        })
    }
}

impl CaptureSource for DirectoryCaptureSource {
    fn next_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.paths.is_empty() {
            return Err(CaptureError::Persistent(
                "no .jpg files found in capture directory".to_string(),
            ));
        }

        let path = &self.paths[self.index % self.paths.len()];
        self.index = self.index.wrapping_add(1);

        let payload = std::fs::read(path)
            .map_err(|e| CaptureError::Transient(format!("read {}: {}", path.display(), e)))?;

        thread::sleep(self.frame_interval);

        Ok(RawFrame {
            payload,
            pixel_format: PixelFormat::Jpeg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedSource {
        frames: Vec<Vec<u8>>,
        index: usize,
    }

    impl CaptureSource for FixedSource {
        fn next_frame(&mut self) -> Result<RawFrame, CaptureError> {
            if self.index >= self.frames.len() {
                return Err(CaptureError::Persistent("exhausted".to_string()));
            }
            let payload = self.frames[self.index].clone();
            self.index += 1;
            Ok(RawFrame {
                payload,
                pixel_format: PixelFormat::Jpeg,
            })
        }
    }

    fn minimal_jpeg() -> Vec<u8> {
        crate::media::jpeg::tests_support::minimal_baseline_jpeg(16, 16)
    }

    #[test]
    fn producer_publishes_valid_frames_then_shuts_down_slot() {
        let slot = Arc::new(FrameSlot::new(30.0));
        let running = Arc::new(AtomicBool::new(true));
        let source = FixedSource {
            frames: vec![minimal_jpeg(), minimal_jpeg()],
            index: 0,
        };
        let producer = CaptureProducer::new(source, slot.clone(), running);
        producer.run();

        assert!(slot.is_shutdown());
        assert!(slot.snapshot().is_some());
    }

    #[test]
    fn producer_drops_malformed_frame_without_shutting_down() {
        let slot = Arc::new(FrameSlot::new(30.0));
        let running = Arc::new(AtomicBool::new(true));
        let source = FixedSource {
            frames: vec![vec![0x00, 0x01, 0x02], minimal_jpeg()],
            index: 0,
        };
        let producer = CaptureProducer::new(source, slot.clone(), running);
        producer.run();

        // The malformed frame was dropped, but the valid one still published
        // before the source was exhausted (persistent error at the end).
        assert!(slot.snapshot().is_some());
    }
}
