//! Video frame marshaling.
//!
//! Send side: captured frames are downscaled to the transport cap and
//! converted to the planar YUV420 layout the transport consumes. Receive
//! side: [`VideoSource`] is the display-facing sink a session owns; the
//! transport callback pushes decoded frames into it and the application
//! subscribes for rendering. A source can be stopped and restarted while
//! the call stays up, mirroring the peer pausing its video.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

/// Largest frame sent to the transport; bigger captures are downscaled.
pub const VIDEO_MAX_WIDTH: u16 = 1920;
/// See [`VIDEO_MAX_WIDTH`].
pub const VIDEO_MAX_HEIGHT: u16 = 1080;

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, tightly packed planes
    Yuv420,
    /// Interleaved 8-bit RGB rows
    Rgb24,
}

/// A frame handed to the engine by a capture pipeline.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Packed pixel data
    pub data: Bytes,
}

/// A planar YUV420 frame in the transport's wire layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvFrame {
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Luma plane
    pub y: Bytes,
    /// Blue-difference chroma plane
    pub u: Bytes,
    /// Red-difference chroma plane
    pub v: Bytes,
    /// Row stride of the luma plane
    pub y_stride: u32,
    /// Row stride of the blue-difference plane
    pub u_stride: u32,
    /// Row stride of the red-difference plane
    pub v_stride: u32,
}

impl CapturedFrame {
    /// Convert to planar YUV420, downscaling to `max` when larger.
    ///
    /// Returns `None` for frames whose data does not match the declared
    /// geometry; the caller aborts the send silently in that case.
    pub fn to_yuv420(&self, max: (u16, u16)) -> Option<YuvFrame> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let (mut dw, mut dh) = if self.width > max.0 || self.height > max.1 {
            (max.0, max.1)
        } else {
            (self.width, self.height)
        };
        // Chroma subsampling needs even dimensions.
        dw &= !1;
        dh &= !1;
        if dw == 0 || dh == 0 {
            return None;
        }

        match self.format {
            PixelFormat::Yuv420 => self.yuv_to_yuv420(dw, dh),
            PixelFormat::Rgb24 => self.rgb_to_yuv420(dw, dh),
        }
    }

    fn yuv_to_yuv420(&self, dw: u16, dh: u16) -> Option<YuvFrame> {
        let (sw, sh) = (self.width as usize, self.height as usize);
        let (cw, ch) = (sw.div_ceil(2), sh.div_ceil(2));
        let y_len = sw * sh;
        let c_len = cw * ch;
        if self.data.len() != y_len + 2 * c_len {
            return None;
        }

        let y_src = &self.data[..y_len];
        let u_src = &self.data[y_len..y_len + c_len];
        let v_src = &self.data[y_len + c_len..];

        let (dwu, dhu) = (dw as usize, dh as usize);
        let y = scale_plane(y_src, sw, sh, dwu, dhu);
        let u = scale_plane(u_src, cw, ch, dwu / 2, dhu / 2);
        let v = scale_plane(v_src, cw, ch, dwu / 2, dhu / 2);

        Some(YuvFrame {
            width: dw,
            height: dh,
            y: Bytes::from(y),
            u: Bytes::from(u),
            v: Bytes::from(v),
            y_stride: dw as u32,
            u_stride: (dw / 2) as u32,
            v_stride: (dw / 2) as u32,
        })
    }

    fn rgb_to_yuv420(&self, dw: u16, dh: u16) -> Option<YuvFrame> {
        let (sw, sh) = (self.width as usize, self.height as usize);
        if self.data.len() != sw * sh * 3 {
            return None;
        }
        let (dwu, dhu) = (dw as usize, dh as usize);

        // Nearest-neighbor sample the source while converting (BT.601).
        let mut y_plane = vec![0u8; dwu * dhu];
        let mut u_plane = vec![0u8; (dwu / 2) * (dhu / 2)];
        let mut v_plane = vec![0u8; (dwu / 2) * (dhu / 2)];

        for dy in 0..dhu {
            let sy = dy * sh / dhu;
            for dx in 0..dwu {
                let sx = dx * sw / dwu;
                let p = (sy * sw + sx) * 3;
                let (r, g, b) = (
                    self.data[p] as i32,
                    self.data[p + 1] as i32,
                    self.data[p + 2] as i32,
                );
                y_plane[dy * dwu + dx] =
                    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;
                if dy % 2 == 0 && dx % 2 == 0 {
                    let ci = (dy / 2) * (dwu / 2) + dx / 2;
                    u_plane[ci] =
                        (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
                    v_plane[ci] =
                        (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
                }
            }
        }

        Some(YuvFrame {
            width: dw,
            height: dh,
            y: Bytes::from(y_plane),
            u: Bytes::from(u_plane),
            v: Bytes::from(v_plane),
            y_stride: dw as u32,
            u_stride: (dw / 2) as u32,
            v_stride: (dw / 2) as u32,
        })
    }
}

fn scale_plane(src: &[u8], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<u8> {
    if sw == dw && sh == dh {
        return src.to_vec();
    }
    let mut out = vec![0u8; dw * dh];
    for dy in 0..dh {
        let sy = dy * sh / dh;
        for dx in 0..dw {
            let sx = dx * sw / dw;
            out[dy * dw + dx] = src[sy * sw + sx];
        }
    }
    out
}

/// Display-facing sink for one call's incoming video.
pub struct VideoSource {
    stopped: AtomicBool,
    frame_tx: mpsc::UnboundedSender<YuvFrame>,
    frame_rx: Mutex<Option<mpsc::UnboundedReceiver<YuvFrame>>>,
}

impl VideoSource {
    /// Create a running source.
    pub fn new() -> Self {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        Self {
            stopped: AtomicBool::new(false),
            frame_tx,
            frame_rx: Mutex::new(Some(frame_rx)),
        }
    }

    /// Deliver a decoded frame. Dropped while the source is stopped.
    pub fn push_frame(&self, frame: YuvFrame) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        // A closed channel only means the display went away.
        let _ = self.frame_tx.send(frame);
    }

    /// Stop emitting frames; frames pushed while stopped are discarded.
    pub fn stop(&self) {
        debug!("video source stopped");
        self.stopped.store(true, Ordering::Release);
    }

    /// Resume emitting frames.
    pub fn restart(&self) {
        debug!("video source restarted");
        self.stopped.store(false, Ordering::Release);
    }

    /// Whether the source is currently stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Take the frame receiver. Returns `None` after the first call.
    pub fn take_frames(&self) -> Option<mpsc::UnboundedReceiver<YuvFrame>> {
        self.frame_rx.lock().ok().and_then(|mut rx| rx.take())
    }
}

impl Default for VideoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
