// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode, resize, rotate, and re-encode raster images using
// the `image` and `imageproc` crates.

use image::{DynamicImage, ImageFormat, RgbaImage};
use imageproc::geometric_transformations::{self, Interpolation};
use tracing::{debug, info, instrument};
use wandelwerk_core::error::WandelwerkError;
use wandelwerk_core::types::Format;

/// JPEG quality used when the caller gives none.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Largest image a resize may produce, in pixels.
pub const MAX_RESIZED_PIXELS: u64 = 40_000_000;

/// Image processing pipeline operating on a single in-memory image.
///
/// Each transformation consumes `self` and returns the transformed processor,
/// so operations chain:
///
/// ```ignore
/// let bytes = ImageProcessor::from_bytes(&png)?
///     .resize(800, 600)?
///     .rotate(90.0)
///     .encode(Format::Jpeg, Some(80))?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Create a processor from raw encoded bytes (JPEG, PNG, WebP, BMP, TIFF).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, WandelwerkError> {
        let img = image::load_from_memory(data).map_err(|err| {
            WandelwerkError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Width and height from the image header, without decoding pixels.
    pub fn dimensions_of(data: &[u8]) -> Result<(u32, u32), WandelwerkError> {
        image::ImageReader::new(std::io::Cursor::new(data))
            .with_guessed_format()
            .map_err(|err| WandelwerkError::ImageError(format!("cannot read image header: {}", err)))?
            .into_dimensions()
            .map_err(|err| WandelwerkError::ImageError(format!("cannot read image header: {}", err)))
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    // -- Transformations ------------------------------------------------------

    /// Resize the image to fit within `max_width` x `max_height`, preserving
    /// aspect ratio. Uses Lanczos3 filtering for high-quality scaling.
    ///
    /// Fails with `InputTooLarge` when the result would exceed
    /// [`MAX_RESIZED_PIXELS`].
    #[instrument(skip(self), fields(max_width, max_height))]
    pub fn resize(self, max_width: u32, max_height: u32) -> Result<Self, WandelwerkError> {
        check_resize_budget(self.image.width(), self.image.height(), max_width, max_height)?;
        info!(
            from_w = self.image.width(),
            from_h = self.image.height(),
            max_width,
            max_height,
            "Resizing image"
        );
        let resized = self
            .image
            .resize(max_width, max_height, image::imageops::FilterType::Lanczos3);
        debug!(
            new_w = resized.width(),
            new_h = resized.height(),
            "Resize complete"
        );
        Ok(Self { image: resized })
    }

    /// Rotate the image by an arbitrary angle in degrees (clockwise).
    ///
    /// Multiples of 90 use lossless rotation. Other angles use an affine
    /// transformation with bilinear interpolation on a same-size canvas, the
    /// uncovered corners left transparent white.
    #[instrument(skip(self), fields(degrees))]
    pub fn rotate(self, degrees: f32) -> Self {
        info!(degrees, "Rotating image");

        let normalised = degrees.rem_euclid(360.0);
        let near = |target: f32| (normalised - target).abs() < 0.01;
        if near(0.0) || near(360.0) {
            return self;
        }
        if near(90.0) {
            return Self {
                image: self.image.rotate90(),
            };
        }
        if near(180.0) {
            return Self {
                image: self.image.rotate180(),
            };
        }
        if near(270.0) {
            return Self {
                image: self.image.rotate270(),
            };
        }

        let rgba = self.image.to_rgba8();
        let rotated: RgbaImage = geometric_transformations::rotate_about_center(
            &rgba,
            degrees.to_radians(),
            Interpolation::Bilinear,
            image::Rgba([255u8, 255, 255, 0]),
        );

        debug!("General rotation applied");
        Self {
            image: DynamicImage::ImageRgba8(rotated),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as `format`. `quality` applies to JPEG only.
    #[instrument(skip(self))]
    pub fn encode(&self, format: Format, quality: Option<u8>) -> Result<Vec<u8>, WandelwerkError> {
        match format {
            Format::Jpeg => self.to_jpeg_bytes(quality.unwrap_or(DEFAULT_JPEG_QUALITY)),
            Format::Png => encode_to_format(&self.image, ImageFormat::Png),
            Format::Tiff => encode_to_format(&self.image, ImageFormat::Tiff),
            // The BMP and WebP encoders only take 8-bit RGB(A).
            Format::Bmp => encode_to_format(
                &DynamicImage::ImageRgba8(self.image.to_rgba8()),
                ImageFormat::Bmp,
            ),
            Format::Webp => encode_to_format(
                &DynamicImage::ImageRgba8(self.image.to_rgba8()),
                ImageFormat::WebP,
            ),
            other => Err(WandelwerkError::ImageError(format!(
                "{} is not a raster image format",
                other
            ))),
        }
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, WandelwerkError> {
        let mut buffer = Vec::new();
        // JPEG has no alpha channel.
        let rgb = self.image.to_rgb8();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder).map_err(|err| {
            WandelwerkError::ImageError(format!("JPEG encoding failed: {}", err))
        })?;
        Ok(buffer)
    }
}

/// Size of a `width` x `height` image scaled to fit the box, aspect ratio
/// kept and neither side below one pixel.
pub fn fitted_size(width: u32, height: u32, max_width: u32, max_height: u32) -> (u64, u64) {
    let ratio = f64::min(
        f64::from(max_width) / f64::from(width.max(1)),
        f64::from(max_height) / f64::from(height.max(1)),
    );
    let scale = |side: u32| ((f64::from(side) * ratio).round() as u64).max(1);
    (scale(width), scale(height))
}

/// Reject a resize whose output would exceed [`MAX_RESIZED_PIXELS`].
pub fn check_resize_budget(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Result<(), WandelwerkError> {
    let (new_width, new_height) = fitted_size(width, height, max_width, max_height);
    let pixels = new_width.saturating_mul(new_height);
    if pixels > MAX_RESIZED_PIXELS {
        return Err(WandelwerkError::InputTooLarge {
            constraint: "MAX_RESIZED_PIXELS",
            limit: MAX_RESIZED_PIXELS,
            actual: pixels,
        });
    }
    Ok(())
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(
    image: &DynamicImage,
    format: ImageFormat,
) -> Result<Vec<u8>, WandelwerkError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image.write_to(&mut cursor, format).map_err(|err| {
        WandelwerkError::ImageError(format!("image encoding failed: {}", err))
    })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{solid_jpeg, solid_png};

    #[test]
    fn resize_fits_box_preserving_aspect() {
        let processor = ImageProcessor::from_bytes(&solid_png(200, 100, [1, 2, 3]))
            .unwrap()
            .resize(50, 50)
            .unwrap();
        assert_eq!((processor.width(), processor.height()), (50, 25));
    }

    #[test]
    fn resize_beyond_pixel_budget_is_refused() {
        let tiny = ImageProcessor::from_bytes(&solid_png(1, 1, [0, 0, 0])).unwrap();
        match tiny.resize(20_000, 20_000) {
            Err(WandelwerkError::InputTooLarge { constraint, actual, .. }) => {
                assert_eq!(constraint, "MAX_RESIZED_PIXELS");
                assert_eq!(actual, 400_000_000);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("oversized resize was accepted"),
        }
    }

    #[test]
    fn fitted_size_keeps_aspect() {
        assert_eq!(fitted_size(64, 32, 16, 16), (16, 8));
        assert_eq!(fitted_size(1, 1, 20_000, 300), (300, 300));
        assert_eq!(fitted_size(1000, 1, 10, 10), (10, 1));
    }

    #[test]
    fn header_dimensions_match_decoded_image() {
        let png = solid_png(37, 11, [4, 5, 6]);
        assert_eq!(ImageProcessor::dimensions_of(&png).unwrap(), (37, 11));
        assert!(ImageProcessor::dimensions_of(b"not an image").is_err());
    }

    #[test]
    fn right_angle_rotation_swaps_dimensions() {
        let processor = ImageProcessor::from_bytes(&solid_png(40, 20, [9, 9, 9]))
            .unwrap()
            .rotate(-90.0);
        assert_eq!((processor.width(), processor.height()), (20, 40));
    }

    #[test]
    fn arbitrary_rotation_keeps_canvas() {
        let processor = ImageProcessor::from_bytes(&solid_png(40, 20, [9, 9, 9]))
            .unwrap()
            .rotate(30.0);
        assert_eq!((processor.width(), processor.height()), (40, 20));
    }

    #[test]
    fn encodes_every_raster_format() {
        let processor = ImageProcessor::from_bytes(&solid_jpeg(16, 16, [120, 60, 30])).unwrap();
        for format in Format::IMAGES {
            let bytes = processor.encode(format, None).unwrap();
            let guessed = image::guess_format(&bytes).unwrap();
            let expected = match format {
                Format::Jpeg => ImageFormat::Jpeg,
                Format::Png => ImageFormat::Png,
                Format::Webp => ImageFormat::WebP,
                Format::Bmp => ImageFormat::Bmp,
                _ => ImageFormat::Tiff,
            };
            assert_eq!(guessed, expected, "{format}");
        }
    }

    #[test]
    fn lower_quality_jpeg_is_smaller() {
        let processor = ImageProcessor::from_bytes(&solid_png(64, 64, [10, 200, 90])).unwrap();
        let rotated = processor.rotate(17.0);
        let low = rotated.encode(Format::Jpeg, Some(10)).unwrap();
        let high = rotated.encode(Format::Jpeg, Some(100)).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn refuses_non_image_targets() {
        let processor = ImageProcessor::from_bytes(&solid_png(4, 4, [0, 0, 0])).unwrap();
        assert!(processor.encode(Format::Pdf, None).is_err());
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            ImageProcessor::from_bytes(b"not an image"),
            Err(WandelwerkError::ImageError(_))
        ));
    }
}
