// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image converter: re-encoding, resize and rotation through the image
// library, and image-to-PDF through printpdf.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, instrument};
use wandelwerk_core::error::Result;
use wandelwerk_core::registry::{CapabilityEntry, ExternalTool};
use wandelwerk_core::types::{ConversionOptions, Format};
use wandelwerk_document::{ImageProcessor, PdfWriter};

use super::{Converter, blocking, input, output_path};

#[derive(Debug, Clone)]
pub struct ImageConverter {
    /// Resolution images are placed at on PDF pages, unless the request
    /// gives its own `dpi`.
    image_dpi: u32,
}

impl ImageConverter {
    pub fn new(image_dpi: u32) -> Self {
        Self { image_dpi }
    }

    fn page_dpi(&self, options: &ConversionOptions) -> u32 {
        options.dpi.unwrap_or(self.image_dpi)
    }
}

#[async_trait]
impl Converter for ImageConverter {
    fn tool(&self) -> ExternalTool {
        ExternalTool::ImageLibrary
    }

    #[instrument(skip_all, fields(operation = %entry.operation, target = %entry.target, inputs = inputs.len()))]
    async fn run(
        &self,
        entry: &CapabilityEntry,
        inputs: &[PathBuf],
        output_dir: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<PathBuf>> {
        let target = entry.target;
        let inputs = inputs.to_vec();
        let output_dir = output_dir.to_path_buf();
        let options = options.clone();
        let dpi = self.page_dpi(&options);

        blocking(self.tool(), move || {
            if target == Format::Pdf {
                images_to_pdf(&inputs, &output_dir, dpi)
            } else {
                transform(target, input(&inputs, 0)?, &output_dir, &options)
            }
        })
        .await
    }
}

/// Decode, apply the requested resize and rotation, re-encode as `target`.
fn transform(
    target: Format,
    input: &Path,
    output_dir: &Path,
    options: &ConversionOptions,
) -> Result<Vec<PathBuf>> {
    let mut processor = ImageProcessor::from_bytes(&std::fs::read(input)?)?;
    if let Some((max_width, max_height)) = options.resize_box() {
        processor = processor.resize(max_width, max_height)?;
    }
    if let Some(degrees) = options.rotation {
        processor = processor.rotate(degrees as f32);
    }

    let bytes = processor.encode(target, options.quality)?;
    let path = output_path(output_dir, input, target.extension());
    std::fs::write(&path, bytes)?;

    info!(
        width = processor.width(),
        height = processor.height(),
        "Image written"
    );
    Ok(vec![path])
}

/// One PDF page per image, in input order, each sized as if printed at `dpi`.
fn images_to_pdf(inputs: &[PathBuf], output_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>> {
    let images = inputs
        .iter()
        .map(std::fs::read)
        .collect::<std::io::Result<Vec<_>>>()?;
    let refs: Vec<&[u8]> = images.iter().map(Vec::as_slice).collect();
    let pdf = PdfWriter::a4().with_image_dpi(dpi).create_from_images(&refs)?;

    let path = output_path(output_dir, input(inputs, 0)?, "pdf");
    std::fs::write(&path, pdf)?;
    info!(pages = inputs.len(), dpi, "Images combined into PDF");
    Ok(vec![path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use wandelwerk_document::PdfReader;
    use wandelwerk_document::fixtures::{solid_jpeg, solid_png};

    #[test]
    fn transform_resizes_and_reencodes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input_1.png");
        std::fs::write(&input, solid_png(120, 60, [5, 6, 7])).unwrap();

        let options = ConversionOptions {
            width: Some(30),
            ..Default::default()
        };
        let outputs = transform(Format::Webp, &input, dir.path(), &options).unwrap();
        assert!(outputs[0].ends_with("input_1.webp"));

        let written = ImageProcessor::from_bytes(&std::fs::read(&outputs[0]).unwrap()).unwrap();
        assert_eq!((written.width(), written.height()), (30, 15));
    }

    #[test]
    fn images_become_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<PathBuf> = (1..=3)
            .map(|n| {
                let path = dir.path().join(format!("input_{n}.jpg"));
                std::fs::write(&path, solid_jpeg(20 * n, 20, [n as u8 * 40, 0, 0])).unwrap();
                path
            })
            .collect();

        let outputs = images_to_pdf(&inputs, dir.path(), 150).unwrap();
        let pdf = std::fs::read(&outputs[0]).unwrap();
        assert_eq!(PdfReader::from_bytes(&pdf).unwrap().page_count(), 3);
    }

    #[test]
    fn page_dpi_prefers_the_request() {
        let converter = ImageConverter::new(150);
        assert_eq!(converter.page_dpi(&ConversionOptions::default()), 150);

        let options = ConversionOptions {
            dpi: Some(300),
            ..Default::default()
        };
        assert_eq!(converter.page_dpi(&options), 300);
    }
}
