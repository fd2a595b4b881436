//! The fresh-frame bus (single producer, many consumers).
//!
//! One capture thread [`publish`](FrameSlot::publish)es frames; any number of
//! reader threads either block for the next fresh one via
//! [`wait_fresh`](FrameSlot::wait_fresh) or sample the current one
//! non-blockingly via [`snapshot`](FrameSlot::snapshot).
//!
//! The design mirrors a mutex+condvar "new frame available" pattern: a
//! monotonic sequence number distinguishes "nothing new happened" from
//! "a frame was published", so a waiter that was descheduled through
//! several publications only ever sees the latest one on wake — frame-skip
//! is the intended behavior, not a bug.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};

/// Pixel encoding of a captured [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mjpeg,
    Jpeg,
    Yuyv,
    Uyvy,
    Rgb24,
    Rgb565,
}

/// A single captured frame.
///
/// `payload` is reference-counted so that publishing a frame to N waiting
/// readers never copies the bytes — every reader gets its own `Arc` clone.
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub capture_timestamp: SystemTime,
    /// Monotonically increasing publication sequence, wraps on overflow.
    pub sequence: u32,
}

/// Outcome of a [`FrameSlot::wait_fresh`] call.
#[derive(Debug)]
pub enum WaitOutcome {
    /// A frame newer than the caller's `last_seen` sequence is available.
    Fresh(Frame),
    /// The deadline elapsed with no fresher frame published.
    Timeout,
    /// The slot has been shut down; no further frames will ever arrive.
    Shutdown,
}

struct Inner {
    current: Option<Frame>,
    sequence: u32,
    shutdown: bool,
}

/// Shared frame bus between one producer and many consumers.
pub struct FrameSlot {
    inner: Mutex<Inner>,
    changed: Condvar,
    fps_hint: Mutex<f64>,
}

impl FrameSlot {
    /// `fps_hint` seeds the wait-deadline calculation; it is advisory only
    /// and may be updated later via [`set_fps_hint`](Self::set_fps_hint).
    pub fn new(fps_hint: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: None,
                sequence: 0,
                shutdown: false,
            }),
            changed: Condvar::new(),
            fps_hint: Mutex::new(fps_hint),
        }
    }

    pub fn set_fps_hint(&self, fps_hint: f64) {
        *self.fps_hint.lock() = fps_hint;
    }

    pub fn fps_hint(&self) -> f64 {
        *self.fps_hint.lock()
    }

    /// Compute an absolute wait deadline: `now + 1s/fps_hint`, floored at
    /// 100ms so a stalled or zero fps hint never produces a busy spin.
    pub fn default_deadline(&self) -> Instant {
        let fps = self.fps_hint();
        let interval = if fps > 0.0 {
            Duration::from_secs_f64((1.0 / fps).max(0.1))
        } else {
            Duration::from_millis(100)
        };
        Instant::now() + interval
    }

    /// Install `frame` as current and wake every waiter. Never fails.
    ///
    /// A frame published with a sequence number that would not be "newer"
    /// than the current one (per wrapping comparison) is rejected silently
    /// — this should not happen for a well-behaved single producer, but it
    /// guards the invariant that `current` is never replaced by an older
    /// frame.
    pub fn publish(&self, mut frame: Frame) {
        let mut inner = self.inner.lock();
        let next_sequence = inner.sequence.wrapping_add(1);
        frame.sequence = next_sequence;
        inner.sequence = next_sequence;
        inner.current = Some(frame);
        drop(inner);
        self.changed.notify_all();
    }

    /// Block until a frame newer than `last_seen` is published, the
    /// deadline elapses, or the slot shuts down.
    pub fn wait_fresh(&self, last_seen: u32, deadline: Instant) -> WaitOutcome {
        let mut inner = self.inner.lock();
        loop {
            if inner.shutdown {
                return WaitOutcome::Shutdown;
            }
            if is_newer(inner.sequence, last_seen)
                && let Some(frame) = inner.current.clone()
            {
                return WaitOutcome::Fresh(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::Timeout;
            }
            let timeout = deadline - now;
            let result = self.changed.wait_for(&mut inner, timeout);
            if result.timed_out() && Instant::now() >= deadline {
                // Recheck freshness once more to avoid discarding a frame
                // that was published right at the deadline (spurious wakeup
                // guard), then report whichever is true.
                if inner.shutdown {
                    return WaitOutcome::Shutdown;
                }
                if is_newer(inner.sequence, last_seen)
                    && let Some(frame) = inner.current.clone()
                {
                    return WaitOutcome::Fresh(frame);
                }
                return WaitOutcome::Timeout;
            }
        }
    }

    /// Return the current frame immediately without waiting.
    pub fn snapshot(&self) -> Option<Frame> {
        self.inner.lock().current.clone()
    }

    /// Mark the slot shut down, waking every blocked waiter.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        drop(inner);
        self.changed.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }
}

/// Wrapping "is `a` newer than `b`" comparison, valid across `u32` overflow.
fn is_newer(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < (u32::MAX / 2)
}
