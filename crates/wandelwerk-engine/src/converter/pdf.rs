// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF converter: page rasterisation through `pdftoppm`, and the PDF-to-PDF
// operations (merge, split, rotate, compress, extract) through lopdf.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::registry::{CapabilityEntry, ExternalTool};
use wandelwerk_core::types::{ConversionOptions, Format, Operation, PageRange};
use wandelwerk_document::PdfReader;
use wandelwerk_document::image::processor::DEFAULT_JPEG_QUALITY;

use super::{Converter, blocking, collect_outputs, input, output_path, write_output};
use crate::external::run_tool;

/// Prefix `pdftoppm` writes rendered pages under.
const RENDER_PREFIX: &str = "page";

#[derive(Debug, Clone)]
pub struct PdfConverter {
    pdftoppm: PathBuf,
    default_dpi: u32,
}

impl PdfConverter {
    pub fn new(pdftoppm: impl Into<PathBuf>, default_dpi: u32) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            default_dpi,
        }
    }

    /// Command rendering pages `range` (all pages when `None`) of `input`.
    pub fn render_command(
        &self,
        target: Format,
        input: &Path,
        output_dir: &Path,
        options: &ConversionOptions,
        range: Option<PageRange>,
    ) -> Command {
        let mut command = Command::new(&self.pdftoppm);
        command
            .arg("-r")
            .arg(options.dpi.unwrap_or(self.default_dpi).to_string());
        match target {
            Format::Png => {
                command.arg("-png");
            }
            _ => {
                command.arg("-jpeg").arg("-jpegopt").arg(format!(
                    "quality={}",
                    options.quality.unwrap_or(DEFAULT_JPEG_QUALITY)
                ));
            }
        }
        if let Some(range) = range {
            command
                .arg("-f")
                .arg(range.start.to_string())
                .arg("-l")
                .arg(range.end.to_string());
        }
        command.arg(input).arg(output_dir.join(RENDER_PREFIX));
        command
    }

    #[instrument(skip_all, fields(%target))]
    async fn rasterise(
        &self,
        target: Format,
        input: &Path,
        output_dir: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<PathBuf>> {
        // pdftoppm takes one contiguous range per run.
        let ranges: Vec<Option<PageRange>> = match &options.pages {
            Some(selection) => selection.ranges.iter().copied().map(Some).collect(),
            None => vec![None],
        };
        for range in ranges {
            let command = self.render_command(target, input, output_dir, options, range);
            run_tool(self.tool(), command).await?;
        }

        let rendered = collect_outputs(output_dir)?;
        if rendered.is_empty() {
            return Err(WandelwerkError::ExternalToolFailure {
                tool: self.tool(),
                diagnostics: "no pages were rendered".into(),
            });
        }

        // pdftoppm zero-pads page numbers to the document's digit count
        // (page-01.jpg); normalise to page_1.jpg, page_2.jpg, ...
        let mut outputs = Vec::with_capacity(rendered.len());
        for path in rendered {
            let Some(page) = rendered_page_number(&path) else {
                debug!(path = %path.display(), "Ignoring unexpected render output");
                continue;
            };
            let renamed = output_dir.join(format!("page_{page}.{}", target.extension()));
            std::fs::rename(&path, &renamed)?;
            outputs.push(renamed);
        }

        info!(pages = outputs.len(), "PDF rasterised");
        Ok(outputs)
    }
}

/// Page number from a pdftoppm output name such as `page-07.png`.
fn rendered_page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(RENDER_PREFIX)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

#[async_trait]
impl Converter for PdfConverter {
    fn tool(&self) -> ExternalTool {
        ExternalTool::PdfRenderer
    }

    #[instrument(skip_all, fields(operation = %entry.operation, target = %entry.target, inputs = inputs.len()))]
    async fn run(
        &self,
        entry: &CapabilityEntry,
        inputs: &[PathBuf],
        output_dir: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<PathBuf>> {
        let first = input(inputs, 0)?.clone();
        if entry.target.is_image() {
            return self.rasterise(entry.target, &first, output_dir, options).await;
        }

        let operation = entry.operation;
        let inputs = inputs.to_vec();
        let output_dir = output_dir.to_path_buf();
        let options = options.clone();
        blocking(self.tool(), move || {
            pdf_operation(operation, &inputs, &output_dir, &options)
        })
        .await
    }
}

/// The in-process PDF-to-PDF operations.
fn pdf_operation(
    operation: Operation,
    inputs: &[PathBuf],
    output_dir: &Path,
    options: &ConversionOptions,
) -> Result<Vec<PathBuf>> {
    let first = input(inputs, 0)?;
    let reader = PdfReader::open(first)?;
    let single = |bytes: Vec<u8>| -> Result<Vec<PathBuf>> {
        let path = output_path(output_dir, first, "pdf");
        std::fs::write(&path, bytes)?;
        Ok(vec![path])
    };

    match operation {
        Operation::Merge => {
            let others = inputs[1..]
                .iter()
                .map(std::fs::read)
                .collect::<std::io::Result<Vec<_>>>()?;
            let refs: Vec<&[u8]> = others.iter().map(Vec::as_slice).collect();
            let merged = reader.merge(&refs)?;
            Ok(vec![write_output(output_dir, "merged.pdf", &merged)?])
        }
        Operation::Split => match options.split_at {
            Some(after_page) => {
                let (head, tail) = reader.split(after_page)?;
                Ok(vec![
                    write_output(output_dir, "part_1.pdf", &head)?,
                    write_output(output_dir, "part_2.pdf", &tail)?,
                ])
            }
            None => reader
                .split_pages()?
                .iter()
                .enumerate()
                .map(|(index, page)| write_output(output_dir, &format!("page_{}.pdf", index + 1), page))
                .collect(),
        },
        Operation::Rotate => {
            let degrees = options
                .rotation
                .ok_or_else(|| WandelwerkError::invalid_option("rotation", "required for rotate"))?;
            single(reader.rotate_pages(degrees, options.pages.as_ref())?)
        }
        Operation::Compress => single(reader.compress()?),
        Operation::ExtractPages => {
            let selection = options
                .pages
                .as_ref()
                .ok_or_else(|| WandelwerkError::invalid_option("pages", "required for extract-pages"))?;
            single(reader.extract_pages(selection)?)
        }
        other => Err(WandelwerkError::ExternalToolFailure {
            tool: ExternalTool::PdfRenderer,
            diagnostics: format!("operation {other} is not a PDF operation"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wandelwerk_document::fixtures::{marked_pdf, page_markers};

    fn args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn render_command_for_jpeg_range() {
        let converter = PdfConverter::new("pdftoppm", 150);
        let options = ConversionOptions {
            quality: Some(70),
            ..Default::default()
        };
        let command = converter.render_command(
            Format::Jpeg,
            Path::new("/ws/in/input_1.pdf"),
            Path::new("/ws/out"),
            &options,
            Some(PageRange { start: 2, end: 4 }),
        );
        assert_eq!(
            args(&command),
            vec![
                "-r", "150", "-jpeg", "-jpegopt", "quality=70", "-f", "2", "-l", "4",
                "/ws/in/input_1.pdf", "/ws/out/page",
            ]
        );
    }

    #[test]
    fn render_command_for_png_with_dpi() {
        let options = ConversionOptions {
            dpi: Some(300),
            ..Default::default()
        };
        let command = PdfConverter::new("pdftoppm", 150).render_command(
            Format::Png,
            Path::new("in.pdf"),
            Path::new("out"),
            &options,
            None,
        );
        assert_eq!(args(&command), vec!["-r", "300", "-png", "in.pdf", "out/page"]);
    }

    #[test]
    fn page_numbers_from_render_names() {
        assert_eq!(rendered_page_number(Path::new("out/page-07.png")), Some(7));
        assert_eq!(rendered_page_number(Path::new("out/page-12.jpg")), Some(12));
        assert_eq!(rendered_page_number(Path::new("out/other.jpg")), None);
    }

    fn stage(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn split_without_point_yields_one_file_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let input = stage(dir.path(), "input_1.pdf", &marked_pdf(3));

        let outputs =
            pdf_operation(Operation::Split, &[input], &out, &ConversionOptions::default()).unwrap();
        let names: Vec<String> = outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page_1.pdf", "page_2.pdf", "page_3.pdf"]);
        assert_eq!(page_markers(&std::fs::read(&outputs[2]).unwrap()), vec![3]);
    }

    #[test]
    fn merge_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let a = stage(dir.path(), "input_1.pdf", &marked_pdf(1));
        let b = stage(dir.path(), "input_2.pdf", &marked_pdf(2));

        let outputs =
            pdf_operation(Operation::Merge, &[b, a], &out, &ConversionOptions::default()).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].ends_with("merged.pdf"));
        assert_eq!(page_markers(&std::fs::read(&outputs[0]).unwrap()), vec![1, 2, 1]);
    }

    #[test]
    fn rotate_requires_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let input = stage(dir.path(), "input_1.pdf", &marked_pdf(1));
        let err = pdf_operation(Operation::Rotate, &[input], dir.path(), &ConversionOptions::default())
            .unwrap_err();
        assert!(matches!(err, WandelwerkError::InvalidOptions { .. }));
    }
}
