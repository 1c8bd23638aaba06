// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversion dispatcher. Checks a request against the capability registry
// and the configured ceilings, then runs the registered converter inside the
// request's workspace and turns its output into exactly one artifact.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use wandelwerk_core::config::AppConfig;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::registry::{CapabilityEntry, CapabilityRegistry};
use wandelwerk_core::types::{
    ARCHIVE_FILENAME, ConversionOptions, ConversionRequest, ConversionResult, Format, Operation,
    ZIP_MEDIA_TYPE,
};
use wandelwerk_document::image::processor::check_resize_budget;
use wandelwerk_document::{ImageProcessor, PdfReader, archive};

use crate::converter::{ConverterSet, blocking};
use crate::workspace::Workspace;

/// Request ceilings. Exceeding any of them rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_file_size_bytes: u64,
    pub max_pdf_pages: u32,
    pub max_image_batch_pages: u32,
}

impl Limits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes,
            max_pdf_pages: config.max_pdf_pages,
            max_image_batch_pages: config.max_image_batch_pages,
        }
    }
}

/// Routes requests to converters.
pub struct Dispatcher {
    registry: &'static CapabilityRegistry,
    converters: ConverterSet,
    limits: Limits,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            registry: CapabilityRegistry::standard(),
            converters: ConverterSet::from_config(config),
            limits: Limits::from_config(config),
            timeout: config.tool_timeout(),
        }
    }

    pub fn with_converters(mut self, converters: ConverterSet) -> Self {
        self.converters = converters;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &'static CapabilityRegistry {
        self.registry
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    // -- Validation -----------------------------------------------------------

    /// Check a request before any workspace exists: registry entry, input
    /// count, size and page ceilings, and the options the operation needs.
    ///
    /// Counting PDF pages parses every PDF input, so call this off the async
    /// executor for large uploads.
    #[instrument(skip_all, fields(request_id = %request.id, source = %request.source, target = %request.target, operation = %request.operation))]
    pub fn validate(&self, request: &ConversionRequest) -> Result<CapabilityEntry> {
        let entry = self.entry_for(request)?;

        if let Some(empty) = request.inputs.iter().find(|input| input.bytes.is_empty()) {
            return Err(WandelwerkError::InvalidInput(format!(
                "`{}` is empty",
                empty.name
            )));
        }

        let total_bytes = request.total_bytes();
        if total_bytes > self.limits.max_file_size_bytes {
            return Err(WandelwerkError::InputTooLarge {
                constraint: "MAX_FILE_SIZE_BYTES",
                limit: self.limits.max_file_size_bytes,
                actual: total_bytes,
            });
        }

        check_required_options(&entry, &request.options)?;

        if request.source == Format::Pdf {
            self.check_pdf_pages(&entry, request)?;
        }

        if request.source.is_image() && request.target.is_image() {
            check_resized_pixels(request)?;
        }

        if request.source.is_image() && request.target == Format::Pdf {
            let images = request.inputs.len() as u64;
            let limit = u64::from(self.limits.max_image_batch_pages);
            if images > limit {
                return Err(WandelwerkError::InputTooLarge {
                    constraint: "MAX_IMAGE_BATCH_PAGES",
                    limit,
                    actual: images,
                });
            }
        }

        debug!(tool = %entry.tool, total_bytes, "Request validated");
        Ok(entry)
    }

    /// Registry entry for the request's triple, with the input count checked
    /// against the entry's arity.
    fn entry_for(&self, request: &ConversionRequest) -> Result<CapabilityEntry> {
        let entry = *self
            .registry
            .lookup_operation(request.source, request.target, request.operation)?;
        let count = request.inputs.len();
        if !entry.arity.accepts(count) {
            return Err(WandelwerkError::InvalidInput(format!(
                "{} from {} to {} takes {}, got {}",
                entry.operation, entry.source, entry.target, entry.arity, count
            )));
        }
        Ok(entry)
    }

    fn check_pdf_pages(&self, entry: &CapabilityEntry, request: &ConversionRequest) -> Result<()> {
        let mut total_pages: u64 = 0;
        let mut first_document_pages = 0;
        for (index, input) in request.inputs.iter().enumerate() {
            let pages = PdfReader::from_bytes(&input.bytes)
                .map_err(|_| {
                    WandelwerkError::InvalidInput(format!("`{}` is not a readable PDF", input.name))
                })?
                .page_count();
            if index == 0 {
                first_document_pages = pages;
            }
            total_pages += u64::from(pages);
        }

        let limit = u64::from(self.limits.max_pdf_pages);
        if total_pages > limit {
            return Err(WandelwerkError::InputTooLarge {
                constraint: "MAX_PDF_PAGES",
                limit,
                actual: total_pages,
            });
        }

        // Page selections must fit the document they apply to.
        let selected = match &request.options.pages {
            Some(selection) => selection.resolve(first_document_pages)?.len() as u64,
            None => u64::from(first_document_pages),
        };

        if entry.target.is_image() {
            let limit = u64::from(self.limits.max_image_batch_pages);
            if selected > limit {
                return Err(WandelwerkError::InputTooLarge {
                    constraint: "MAX_IMAGE_BATCH_PAGES",
                    limit,
                    actual: selected,
                });
            }
        }

        if entry.operation == Operation::Split {
            if let Some(split_at) = request.options.split_at {
                if split_at >= first_document_pages {
                    return Err(WandelwerkError::invalid_option(
                        "split_at",
                        format!(
                            "must be less than the page count ({first_document_pages})"
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    // -- Execution ------------------------------------------------------------

    /// Run a validated request inside `workspace` and return its artifact.
    ///
    /// The registry lookup is repeated here so a request that skipped
    /// validation still cannot reach a converter. Errors never contain the
    /// workspace path.
    #[instrument(skip_all, fields(request_id = %request.id, source = %request.source, target = %request.target, operation = %request.operation))]
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        workspace: &Workspace,
    ) -> Result<ConversionResult> {
        let entry = self.entry_for(request)?;
        self.execute(&entry, request, workspace)
            .await
            .map_err(|err| workspace.redact_error(err.into_tool_failure(entry.tool)))
    }

    async fn execute(
        &self,
        entry: &CapabilityEntry,
        request: &ConversionRequest,
        workspace: &Workspace,
    ) -> Result<ConversionResult> {
        let inputs = stage_inputs(request, workspace).await?;
        let output_dir = workspace.output_dir();
        let converter = self.converters.get(entry.tool)?;

        let started = Instant::now();
        let run = converter.run(entry, &inputs, &output_dir, &request.options);
        let outputs = match tokio::time::timeout(self.timeout, run).await {
            Ok(outputs) => outputs?,
            Err(_) => {
                warn!(tool = %entry.tool, seconds = self.timeout.as_secs(), "Capability timed out");
                return Err(WandelwerkError::Timeout {
                    tool: entry.tool,
                    seconds: self.timeout.as_secs(),
                });
            }
        };
        debug!(
            tool = %entry.tool,
            outputs = outputs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Capability finished"
        );

        let result = self.package(entry, request, outputs).await?;
        info!(
            filename = %result.filename,
            media_type = %result.media_type,
            bytes = result.artifact.len(),
            "Artifact ready"
        );
        Ok(result)
    }

    /// Read the outputs back into memory: one file as-is, several as a
    /// deterministic zip in natural name order.
    async fn package(
        &self,
        entry: &CapabilityEntry,
        request: &ConversionRequest,
        mut outputs: Vec<PathBuf>,
    ) -> Result<ConversionResult> {
        if outputs.is_empty() {
            return Err(WandelwerkError::ExternalToolFailure {
                tool: entry.tool,
                diagnostics: "no output was produced".into(),
            });
        }
        outputs.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));

        if let [only] = outputs.as_slice() {
            return Ok(ConversionResult {
                artifact: tokio::fs::read(only).await?,
                media_type: entry.target.mime_type().into(),
                filename: download_name(entry, request),
            });
        }

        let mut entries = Vec::with_capacity(outputs.len());
        for path in &outputs {
            entries.push((file_name(path), tokio::fs::read(path).await?));
        }
        let artifact = blocking(entry.tool, move || archive::pack(&entries)).await?;
        Ok(ConversionResult {
            artifact,
            media_type: ZIP_MEDIA_TYPE.into(),
            filename: ARCHIVE_FILENAME.into(),
        })
    }
}

/// Options an operation cannot run without.
fn check_required_options(entry: &CapabilityEntry, options: &ConversionOptions) -> Result<()> {
    match entry.operation {
        Operation::Rotate => {
            let degrees = options
                .rotation
                .ok_or_else(|| WandelwerkError::invalid_option("rotation", "required for rotate"))?;
            if entry.source == Format::Pdf && degrees % 90 != 0 {
                return Err(WandelwerkError::invalid_option(
                    "rotation",
                    "PDF pages rotate in multiples of 90 degrees",
                ));
            }
        }
        Operation::Resize if options.resize_box().is_none() => {
            return Err(WandelwerkError::invalid_option(
                "width",
                "resize needs a width, a height, or both",
            ));
        }
        Operation::ExtractPages if options.pages.is_none() => {
            return Err(WandelwerkError::invalid_option(
                "pages",
                "required for extract-pages",
            ));
        }
        _ => {}
    }
    Ok(())
}

/// Reject a resize box that would blow a small image up past the pixel
/// budget. Only the image header is read.
fn check_resized_pixels(request: &ConversionRequest) -> Result<()> {
    let Some((max_width, max_height)) = request.options.resize_box() else {
        return Ok(());
    };
    for input in &request.inputs {
        let (width, height) = ImageProcessor::dimensions_of(&input.bytes).map_err(|err| {
            WandelwerkError::InvalidInput(format!("`{}` is not a readable image: {err}", input.name))
        })?;
        check_resize_budget(width, height, max_width, max_height)?;
    }
    Ok(())
}

/// Write each input to `in/input_<n>.<ext>`, numbered from 1 in caller order.
async fn stage_inputs(request: &ConversionRequest, workspace: &Workspace) -> Result<Vec<PathBuf>> {
    let input_dir = workspace.input_dir();
    let mut paths = Vec::with_capacity(request.inputs.len());
    for (index, input) in request.inputs.iter().enumerate() {
        let path = input_dir.join(format!("input_{}.{}", index + 1, request.source.extension()));
        tokio::fs::write(&path, &input.bytes).await.map_err(|err| {
            WandelwerkError::ResourceExhausted(format!("cannot stage input {}: {err}", index + 1))
        })?;
        paths.push(path);
    }
    Ok(paths)
}

/// Download name: `merged.pdf` for merges, otherwise the first input's stem
/// with the target's extension.
fn download_name(entry: &CapabilityEntry, request: &ConversionRequest) -> String {
    if entry.operation == Operation::Merge {
        return "merged.pdf".into();
    }
    let stem = request
        .inputs
        .first()
        .map(|input| input.stem())
        .unwrap_or("converted");
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_control() || matches!(c, '"' | '/' | '\\') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    let stem = if cleaned.is_empty() { "converted" } else { cleaned };
    format!("{stem}.{}", entry.target.extension())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compare names so embedded numbers order by value: `page_2` < `page_10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (left, right) = (chunks(a), chunks(b));
    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l, r) {
            (Chunk::Number(l), Chunk::Number(r)) => {
                let (l, r) = (l.trim_start_matches('0'), r.trim_start_matches('0'));
                l.len().cmp(&r.len()).then_with(|| l.cmp(r))
            }
            (l, r) => l.text().cmp(r.text()),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

impl<'a> Chunk<'a> {
    fn text(&self) -> &'a str {
        match self {
            Self::Number(s) | Self::Text(s) => *s,
        }
    }
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut in_digits = None;
    for (index, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(previous) if previous != digit => {
                chunks.push(chunk(&s[start..index], previous));
                start = index;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(digit) = in_digits {
        chunks.push(chunk(&s[start..], digit));
    }
    chunks
}

fn chunk(text: &str, digits: bool) -> Chunk<'_> {
    if digits { Chunk::Number(text) } else { Chunk::Text(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wandelwerk_core::types::{InputFile, PageSelection};
    use wandelwerk_document::fixtures::{marked_pdf, solid_png};

    fn dispatcher() -> Dispatcher {
        let config = AppConfig {
            max_file_size_bytes: 10_000,
            max_pdf_pages: 10,
            max_image_batch_pages: 3,
            ..AppConfig::default()
        };
        Dispatcher::new(&config)
    }

    fn pdf_request(operation: Operation, target: Format, pdfs: &[Vec<u8>]) -> ConversionRequest {
        let inputs = pdfs
            .iter()
            .enumerate()
            .map(|(i, bytes)| InputFile::new(format!("doc{i}.pdf"), bytes.clone()))
            .collect();
        ConversionRequest::new(Format::Pdf, target, operation, inputs)
    }

    #[test]
    fn natural_order() {
        let mut names = vec!["page_10.png", "page_2.png", "page_1.png", "page_01a.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["page_1.png", "page_01a.png", "page_2.png", "page_10.png"]);
        assert_eq!(natural_cmp("Data.csv", "Summary.csv"), Ordering::Less);
    }

    #[test]
    fn unknown_triple_is_unsupported() {
        let request = ConversionRequest::new(
            Format::Csv,
            Format::Pptx,
            Operation::Convert,
            vec![InputFile::new("a.csv", b"a,b".to_vec())],
        );
        let err = dispatcher().validate(&request).unwrap_err();
        assert!(matches!(err, WandelwerkError::UnsupportedConversion { .. }));
    }

    #[test]
    fn merge_needs_two_inputs() {
        let request = pdf_request(Operation::Merge, Format::Pdf, &[marked_pdf(1)]);
        let err = dispatcher().validate(&request).unwrap_err();
        assert!(matches!(err, WandelwerkError::InvalidInput(_)));
    }

    #[test]
    fn byte_ceiling_names_the_constraint() {
        let request = ConversionRequest::new(
            Format::Png,
            Format::Jpeg,
            Operation::Convert,
            vec![InputFile::new("big.png", vec![0u8; 10_001])],
        );
        match dispatcher().validate(&request).unwrap_err() {
            WandelwerkError::InputTooLarge { constraint, limit, actual } => {
                assert_eq!(constraint, "MAX_FILE_SIZE_BYTES");
                assert_eq!((limit, actual), (10_000, 10_001));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn merged_page_count_is_summed() {
        let request = pdf_request(Operation::Merge, Format::Pdf, &[marked_pdf(6), marked_pdf(5)]);
        let err = dispatcher().validate(&request).unwrap_err();
        assert!(matches!(
            err,
            WandelwerkError::InputTooLarge { constraint: "MAX_PDF_PAGES", actual: 11, .. }
        ));
    }

    #[test]
    fn rasterising_too_many_pages_is_rejected_unless_selected() {
        let pdf = marked_pdf(5);
        let request = pdf_request(Operation::Convert, Format::Png, &[pdf.clone()]);
        let err = dispatcher().validate(&request).unwrap_err();
        assert!(matches!(
            err,
            WandelwerkError::InputTooLarge { constraint: "MAX_IMAGE_BATCH_PAGES", .. }
        ));

        let selection: PageSelection = "1-2".parse().unwrap();
        let request = pdf_request(Operation::Convert, Format::Png, &[pdf]).with_options(
            ConversionOptions {
                pages: Some(selection),
                ..Default::default()
            },
        );
        assert!(dispatcher().validate(&request).is_ok());
    }

    #[test]
    fn too_many_images_for_one_pdf() {
        let png = solid_png(2, 2, [0, 0, 0]);
        let inputs = (0..4)
            .map(|i| InputFile::new(format!("{i}.png"), png.clone()))
            .collect();
        let request = ConversionRequest::new(Format::Png, Format::Pdf, Operation::Convert, inputs);
        let err = dispatcher().validate(&request).unwrap_err();
        assert!(matches!(
            err,
            WandelwerkError::InputTooLarge { constraint: "MAX_IMAGE_BATCH_PAGES", actual: 4, .. }
        ));
    }

    #[test]
    fn resize_box_is_checked_against_the_source_dimensions() {
        let mut request = ConversionRequest::new(
            Format::Png,
            Format::Jpeg,
            Operation::Convert,
            vec![InputFile::new("dot.png", solid_png(1, 1, [0, 0, 0]))],
        );
        request.options = ConversionOptions {
            width: Some(20_000),
            height: Some(20_000),
            ..Default::default()
        };
        let err = dispatcher().validate(&request).unwrap_err();
        assert!(matches!(
            err,
            WandelwerkError::InputTooLarge { constraint: "MAX_RESIZED_PIXELS", .. }
        ));

        request.options.height = Some(200);
        assert!(dispatcher().validate(&request).is_ok());
    }

    #[test]
    fn unreadable_pdf_is_invalid_input() {
        let request = pdf_request(Operation::Compress, Format::Pdf, &[b"%PDF-garbage".to_vec()]);
        let err = dispatcher().validate(&request).unwrap_err();
        assert!(matches!(err, WandelwerkError::InvalidInput(_)));
    }

    #[test]
    fn operations_demand_their_options() {
        let d = dispatcher();
        let rotate = pdf_request(Operation::Rotate, Format::Pdf, &[marked_pdf(1)]);
        assert!(matches!(
            d.validate(&rotate).unwrap_err(),
            WandelwerkError::InvalidOptions { name, .. } if name == "rotation"
        ));

        let crooked = rotate.with_options(ConversionOptions {
            rotation: Some(45),
            ..Default::default()
        });
        assert!(d.validate(&crooked).is_err());

        let extract = pdf_request(Operation::ExtractPages, Format::Pdf, &[marked_pdf(2)]);
        assert!(matches!(
            d.validate(&extract).unwrap_err(),
            WandelwerkError::InvalidOptions { name, .. } if name == "pages"
        ));

        let out_of_range = extract.with_options(ConversionOptions {
            pages: Some("3".parse().unwrap()),
            ..Default::default()
        });
        assert!(d.validate(&out_of_range).is_err());

        let split = pdf_request(Operation::Split, Format::Pdf, &[marked_pdf(2)]).with_options(
            ConversionOptions {
                split_at: Some(2),
                ..Default::default()
            },
        );
        assert!(matches!(
            d.validate(&split).unwrap_err(),
            WandelwerkError::InvalidOptions { name, .. } if name == "split_at"
        ));
    }

    #[test]
    fn empty_upload_is_invalid() {
        let request = ConversionRequest::new(
            Format::Csv,
            Format::Xlsx,
            Operation::Convert,
            vec![InputFile::new("empty.csv", Vec::new())],
        );
        assert!(matches!(
            dispatcher().validate(&request).unwrap_err(),
            WandelwerkError::InvalidInput(_)
        ));
    }

    #[test]
    fn download_names() {
        let registry = CapabilityRegistry::standard();
        let request = ConversionRequest::new(
            Format::Docx,
            Format::Pdf,
            Operation::Convert,
            vec![InputFile::new("uploads/Quarterly \"Report\".docx", vec![1])],
        );
        let entry = registry.lookup(Format::Docx, Format::Pdf).unwrap();
        assert_eq!(download_name(entry, &request), "Quarterly _Report_.pdf");

        let merge = registry
            .lookup_operation(Format::Pdf, Format::Pdf, Operation::Merge)
            .unwrap();
        assert_eq!(download_name(merge, &request), "merged.pdf");
    }
}
