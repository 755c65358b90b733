//! Patch codec — lossless compression of rectangular RGBA patches.
//!
//! History entries store the edited region of a layer twice (before / after),
//! so a long brush session on a large canvas would be ruinously expensive as
//! raw pixels. Patches are therefore held as PNG-compressed byte buffers and
//! only decoded when an undo or redo actually replays them.

use image::RgbaImage;
use std::io::Cursor;

/// Error type for patch encode/decode operations.
#[derive(Debug)]
pub enum CodecError {
    /// The byte buffer is not a valid patch encoding. Fatal to the single
    /// undo/redo operation that needed it; surfaced to the caller rather
    /// than papered over with a blank raster.
    CorruptPatch(String),
    /// The raster could not be encoded (e.g. a degenerate zero-size patch).
    Encode(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::CorruptPatch(e) => write!(f, "corrupt patch data: {}", e),
            CodecError::Encode(e) => write!(f, "patch encode error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<png::DecodingError> for CodecError {
    fn from(e: png::DecodingError) -> Self {
        CodecError::CorruptPatch(e.to_string())
    }
}

impl From<png::EncodingError> for CodecError {
    fn from(e: png::EncodingError) -> Self {
        CodecError::Encode(e.to_string())
    }
}

/// Compress a raster to a compact byte buffer (RGBA8 PNG, best compression).
/// Lossless: [`decode_patch`] reconstructs it bit-for-bit on all four
/// channels.
pub fn encode_patch(raster: &RgbaImage) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let mut encoder = png::Encoder::new(&mut buf, raster.width(), raster.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Best);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(raster.as_raw())?;
    writer.finish()?;
    Ok(buf)
}

/// Reconstruct a raster from a buffer produced by [`encode_patch`].
///
/// Any deviation from the encoder's own output shape (wrong color type,
/// wrong bit depth, truncation, garbage) is a [`CodecError::CorruptPatch`].
pub fn decode_patch(bytes: &[u8]) -> Result<RgbaImage, CodecError> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let mut reader = decoder.read_info()?;
    let mut data = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut data)?;

    if info.color_type != png::ColorType::Rgba || info.bit_depth != png::BitDepth::Eight {
        return Err(CodecError::CorruptPatch(format!(
            "unexpected pixel format {:?}/{:?}",
            info.color_type, info.bit_depth
        )));
    }

    data.truncate(info.buffer_size());
    RgbaImage::from_raw(info.width, info.height, data)
        .ok_or_else(|| CodecError::CorruptPatch("pixel buffer shorter than header claims".into()))
}
