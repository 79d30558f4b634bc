//! V4L2 capture via the `v4l` crate.

use crate::camera::{CameraBackend, CameraError, CameraStream};
use crate::pixel::{self, PixelFormat};
use rollcall_core::{Frame, PixelLayout};
use std::path::PathBuf;
use std::time::Duration;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const MMAP_BUFFERS: u32 = 4;
const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;

/// Opens a V4L2 device node per acquisition.
pub struct V4lBackend {
    device_path: PathBuf,
    read_timeout: Duration,
}

impl V4lBackend {
    pub fn new(device_path: PathBuf, read_timeout: Duration) -> Self {
        Self {
            device_path,
            read_timeout,
        }
    }
}

/// Open device with an active mmap stream. The stream shares the device
/// handle, so the device closes once both are dropped.
struct V4lStream {
    stream: MmapStream<'static>,
    _device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl CameraBackend for V4lBackend {
    fn open(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        let path = self.device_path.display().to_string();
        if !self.device_path.exists() {
            return Err(CameraError::DeviceNotFound(path));
        }

        let device = Device::with_path(&self.device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, MMAP_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        stream.set_timeout(self.read_timeout);

        tracing::debug!(
            device = %path,
            driver = %caps.driver,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "camera opened"
        );

        Ok(Box::new(V4lStream {
            stream,
            _device: device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        }))
    }
}

impl CameraStream for V4lStream {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;

        let gray = pixel::to_grayscale(self.pixel_format, buf, self.width, self.height)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let mut frame = Frame::new(gray, self.width, self.height, PixelLayout::Gray8)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        frame.sequence = sequence;
        Ok(frame)
    }
}
