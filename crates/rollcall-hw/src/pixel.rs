//! Raw V4L2 buffer conversion to 8-bit grayscale.

/// Negotiated pixel format for a V4L2 device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

#[derive(Debug, thiserror::Error)]
pub enum PixelError {
    #[error("{format:?} buffer too short: expected {expected}, got {actual}")]
    TooShort {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Convert one raw buffer of `width * height` pixels to grayscale.
pub fn to_grayscale(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, PixelError> {
    let pixels = width as usize * height as usize;
    let expected = match format {
        PixelFormat::Grey => pixels,
        PixelFormat::Yuyv | PixelFormat::Y16 => pixels * 2,
    };
    if buf.len() < expected {
        return Err(PixelError::TooShort {
            format,
            expected,
            actual: buf.len(),
        });
    }

    let gray = match format {
        PixelFormat::Grey => buf[..pixels].to_vec(),
        // YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; luma is every even byte.
        PixelFormat::Yuyv => buf[..expected].iter().step_by(2).copied().collect(),
        // Keep the high byte of each little-endian sample.
        PixelFormat::Y16 => buf[..expected].chunks_exact(2).map(|px| px[1]).collect(),
    };
    Ok(gray)
}
