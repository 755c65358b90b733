//! Raster file I/O: decode any supported image into an RGBA raster, encode
//! a flattened composite back out. Format choice follows the file
//! extension; dialogs and path handling belong to the shell.

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Baseline JPEG has no alpha channel, so saves flatten to RGB at this
/// quality.
const JPEG_QUALITY: u8 = 90;

/// Raster formats the save path can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

impl SaveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }
}

/// Error type for raster file operations.
#[derive(Debug)]
pub enum ImageIoError {
    Io(std::io::Error),
    Decode(String),
    Encode(String),
    UnsupportedFormat(String),
}

impl std::fmt::Display for ImageIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIoError::Io(e) => write!(f, "I/O error: {}", e),
            ImageIoError::Decode(e) => write!(f, "decode error: {}", e),
            ImageIoError::Encode(e) => write!(f, "encode error: {}", e),
            ImageIoError::UnsupportedFormat(ext) => {
                write!(f, "unsupported image format: {}", ext)
            }
        }
    }
}

impl std::error::Error for ImageIoError {}

impl From<std::io::Error> for ImageIoError {
    fn from(e: std::io::Error) -> Self {
        ImageIoError::Io(e)
    }
}

/// Decode an image file to an RGBA raster, whatever its on-disk pixel
/// format.
pub fn load_image(path: &Path) -> Result<RgbaImage, ImageIoError> {
    let img = image::open(path).map_err(|e| ImageIoError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

/// Encode a raster to the format implied by the path's extension.
pub fn save_image(path: &Path, image: &RgbaImage) -> Result<(), ImageIoError> {
    let format = SaveFormat::from_path(path).ok_or_else(|| {
        ImageIoError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "<none>".to_string()),
        )
    })?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let (w, h) = image.dimensions();
    let err_map = |e: image::ImageError| ImageIoError::Encode(e.to_string());

    match format {
        SaveFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            encoder
                .write_image(image.as_raw(), w, h, ColorType::Rgba8)
                .map_err(err_map)?;
        }
        SaveFormat::Jpeg => {
            // Flatten alpha away; JPEG cannot carry it.
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            encoder
                .encode(rgb.as_raw(), w, h, ColorType::Rgb8)
                .map_err(err_map)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder
                .encode(image.as_raw(), w, h, ColorType::Rgba8)
                .map_err(err_map)?;
        }
        SaveFormat::Tiff => {
            let tiff_err = |e: tiff::TiffError| ImageIoError::Encode(e.to_string());
            let mut tiff_enc = tiff::encoder::TiffEncoder::new(&mut writer).map_err(tiff_err)?;
            tiff_enc
                .write_image::<tiff::encoder::colortype::RGBA8>(w, h, image.as_raw())
                .map_err(tiff_err)?;
        }
    }

    Ok(())
}
