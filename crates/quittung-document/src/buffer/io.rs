// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image buffer I/O. Loading distinguishes a missing file from an undecodable
// one; saving picks the encoder from the output extension.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use quittung_core::{QuittungError, Result};
use tracing::{debug, info, instrument};

/// JPEG quality used for every written output.
pub const JPEG_QUALITY: u8 = 95;

/// Load an image from disk.
///
/// The format is sniffed from the content, so a mislabelled extension still
/// decodes.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn open(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(QuittungError::InputNotFound(path.to_path_buf()));
    }
    let image = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|err| {
            QuittungError::Decode(format!("failed to decode {}: {}", path.display(), err))
        })?;
    info!(
        width = image.width(),
        height = image.height(),
        channels = channel_count(&image),
        "Image loaded"
    );
    Ok(image)
}

/// Decode an in-memory encoded image.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    if data.is_empty() {
        return Err(QuittungError::Decode("input buffer is empty".into()));
    }
    let image = image::load_from_memory(data)
        .map_err(|err| QuittungError::Decode(format!("failed to decode image: {}", err)))?;
    debug!(
        width = image.width(),
        height = image.height(),
        "Image decoded from bytes"
    );
    Ok(image)
}

/// Encode `image` in `format`.
///
/// JPEG output is written at [`JPEG_QUALITY`]. Gray buffers of any depth are
/// written as 8-bit single channel, everything else is flattened to RGB.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if format == ImageFormat::Jpeg {
        let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
        let written = match image {
            DynamicImage::ImageLuma8(gray) => gray.write_with_encoder(encoder),
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                image.to_luma8().write_with_encoder(encoder)
            }
            other => other.to_rgb8().write_with_encoder(encoder),
        };
        written.map_err(|err| QuittungError::Encode(format!("JPEG encoding failed: {}", err)))?;
    } else {
        image
            .write_to(&mut Cursor::new(&mut buffer), format)
            .map_err(|err| {
                QuittungError::Encode(format!("{:?} encoding failed: {}", format, err))
            })?;
    }
    Ok(buffer)
}

/// Write `image` to `path`, choosing the format from its extension.
#[instrument(skip(image), fields(path = %path.display()))]
pub fn save(image: &DynamicImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path).map_err(|err| {
        QuittungError::Encode(format!("cannot pick a format for {}: {}", path.display(), err))
    })?;
    let bytes = encode(image, format)?;
    std::fs::write(path, &bytes)?;
    info!(bytes = bytes.len(), "Output written");
    Ok(())
}

/// `<dir>/<stem><suffix>.<ext>` next to `input`.
pub fn output_path_for(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}{suffix}");
    if let Some(ext) = input.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    input.with_file_name(name)
}

pub fn channel_count(image: &DynamicImage) -> u8 {
    image.color().channel_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, LumaA, Rgb, RgbImage};

    #[test]
    fn output_path_keeps_directory_and_extension() {
        let out = output_path_for(Path::new("/tmp/scans/receipt.jpg"), "_enhanced");
        assert_eq!(out, PathBuf::from("/tmp/scans/receipt_enhanced.jpg"));

        let out = output_path_for(Path::new("shop.v2.png"), "_preprocessed");
        assert_eq!(out, PathBuf::from("shop.v2_preprocessed.png"));

        let out = output_path_for(Path::new("noext"), "_aggressive");
        assert_eq!(out, PathBuf::from("noext_aggressive"));
    }

    #[test]
    fn empty_buffer_is_a_decode_error() {
        assert!(matches!(decode(&[]), Err(QuittungError::Decode(_))));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let result = decode(b"definitely not an image");
        assert!(matches!(result, Err(QuittungError::Decode(_))));
    }

    #[test]
    fn missing_file_is_input_not_found() {
        let result = open(Path::new("/nonexistent/receipt.jpg"));
        assert!(matches!(result, Err(QuittungError::InputNotFound(_))));
    }

    #[test]
    fn grayscale_jpeg_stays_single_channel() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 16, Luma([200])));
        let bytes = encode(&gray, ImageFormat::Jpeg).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(channel_count(&back), 1);
        assert_eq!((back.width(), back.height()), (32, 16));
    }

    #[test]
    fn deep_and_alpha_gray_jpeg_stays_single_channel() {
        let deep = DynamicImage::ImageLuma16(ImageBuffer::from_pixel(8, 8, Luma([50_000u16])));
        let with_alpha = DynamicImage::ImageLumaA8(ImageBuffer::from_pixel(8, 8, LumaA([90u8, 255])));
        for image in [deep, with_alpha] {
            let back = decode(&encode(&image, ImageFormat::Jpeg).unwrap()).unwrap();
            assert_eq!(channel_count(&back), 1);
        }
    }

    #[test]
    fn save_then_open_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])));
        save(&img, &path).unwrap();

        let back = open(&path).unwrap();
        assert_eq!(back.to_rgb8().get_pixel(4, 3), &Rgb([1, 2, 3]));
    }

    #[test]
    fn unknown_extension_is_an_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let result = save(&img, &dir.path().join("out.unknownext"));
        assert!(matches!(result, Err(QuittungError::Encode(_))));
    }
}
