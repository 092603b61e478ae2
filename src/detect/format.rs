use std::io::Cursor;

use image::{ImageFormat, ImageReader};

/// Detect image format from the first bytes of a resource.
pub fn detect_format(header: &[u8]) -> Option<ImageFormat> {
    image::guess_format(header).ok()
}

/// Read `(width, height)` from the image header without decoding pixels.
/// Returns `None` for unknown formats or unreadable headers.
pub fn read_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
