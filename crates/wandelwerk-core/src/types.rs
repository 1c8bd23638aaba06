// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Wandelwerk conversion service.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WandelwerkError};

/// Media type of every archived multi-file artifact.
pub const ZIP_MEDIA_TYPE: &str = "application/zip";

/// Filename of every archived multi-file artifact.
pub const ARCHIVE_FILENAME: &str = "converted.zip";

/// Largest accepted `width` or `height` for a resize.
pub const MAX_IMAGE_DIMENSION: u32 = 20_000;

/// Unique identifier for a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broad category a format belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    Pdf,
    WordProcessing,
    Spreadsheet,
    Presentation,
    Image,
    Text,
}

/// File formats the service knows how to accept or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Pdf,
    Docx,
    Doc,
    Odt,
    Rtf,
    Xlsx,
    Xls,
    Ods,
    Csv,
    Pptx,
    Ppt,
    Odp,
    Jpeg,
    Png,
    Webp,
    Bmp,
    Tiff,
    #[serde(rename = "txt")]
    Text,
}

impl Format {
    pub const ALL: [Format; 18] = [
        Self::Pdf,
        Self::Docx,
        Self::Doc,
        Self::Odt,
        Self::Rtf,
        Self::Xlsx,
        Self::Xls,
        Self::Ods,
        Self::Csv,
        Self::Pptx,
        Self::Ppt,
        Self::Odp,
        Self::Jpeg,
        Self::Png,
        Self::Webp,
        Self::Bmp,
        Self::Tiff,
        Self::Text,
    ];

    /// Raster image formats handled by the image library.
    pub const IMAGES: [Format; 5] = [Self::Jpeg, Self::Png, Self::Webp, Self::Bmp, Self::Tiff];

    /// Canonical file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Odt => "odt",
            Self::Rtf => "rtf",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Ods => "ods",
            Self::Csv => "csv",
            Self::Pptx => "pptx",
            Self::Ppt => "ppt",
            Self::Odp => "odp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Text => "txt",
        }
    }

    /// MIME type used for the download's `Content-Type`.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Doc => "application/msword",
            Self::Odt => "application/vnd.oasis.opendocument.text",
            Self::Rtf => "application/rtf",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Xls => "application/vnd.ms-excel",
            Self::Ods => "application/vnd.oasis.opendocument.spreadsheet",
            Self::Csv => "text/csv",
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Self::Ppt => "application/vnd.ms-powerpoint",
            Self::Odp => "application/vnd.oasis.opendocument.presentation",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Text => "text/plain",
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            Self::Pdf => FormatFamily::Pdf,
            Self::Docx | Self::Doc | Self::Odt | Self::Rtf => FormatFamily::WordProcessing,
            Self::Xlsx | Self::Xls | Self::Ods | Self::Csv => FormatFamily::Spreadsheet,
            Self::Pptx | Self::Ppt | Self::Odp => FormatFamily::Presentation,
            Self::Jpeg | Self::Png | Self::Webp | Self::Bmp | Self::Tiff => FormatFamily::Image,
            Self::Text => FormatFamily::Text,
        }
    }

    pub fn is_image(&self) -> bool {
        self.family() == FormatFamily::Image
    }

    /// Infer the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            "odt" => Some(Self::Odt),
            "rtf" => Some(Self::Rtf),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "ods" => Some(Self::Ods),
            "csv" => Some(Self::Csv),
            "pptx" => Some(Self::Pptx),
            "ppt" => Some(Self::Ppt),
            "odp" => Some(Self::Odp),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "txt" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Infer the format from a file name such as `report.docx`.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = WandelwerkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s.trim().trim_start_matches('.'))
            .ok_or_else(|| WandelwerkError::InvalidInput(format!("unknown format `{s}`")))
    }
}

/// What to do with the input(s) within a (source, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Plain format conversion.
    Convert,
    /// Concatenate several documents in upload order.
    Merge,
    /// Cut one document into several.
    Split,
    /// Rotate pages or images.
    Rotate,
    /// Re-encode to reduce size.
    Compress,
    /// Keep only the selected pages.
    ExtractPages,
    /// Scale an image to fit a box.
    Resize,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Merge => "merge",
            Self::Split => "split",
            Self::Rotate => "rotate",
            Self::Compress => "compress",
            Self::ExtractPages => "extract-pages",
            Self::Resize => "resize",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = WandelwerkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "" | "convert" => Ok(Self::Convert),
            "merge" => Ok(Self::Merge),
            "split" => Ok(Self::Split),
            "rotate" => Ok(Self::Rotate),
            "compress" => Ok(Self::Compress),
            "extract-pages" | "extract" => Ok(Self::ExtractPages),
            "resize" => Ok(Self::Resize),
            other => Err(WandelwerkError::InvalidInput(format!(
                "unknown operation `{other}`"
            ))),
        }
    }
}

/// Inclusive, 1-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

/// A list of page ranges such as `1,3,5-7`, kept in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    pub ranges: Vec<PageRange>,
}

impl PageSelection {
    /// Resolve the selection against a document of `total` pages.
    ///
    /// Pages come back in selection order with duplicates removed. Any page
    /// beyond `total` is an error.
    pub fn resolve(&self, total: u32) -> Result<Vec<u32>> {
        let mut pages = Vec::new();
        for range in &self.ranges {
            if range.end > total {
                return Err(WandelwerkError::invalid_option(
                    "pages",
                    format!("page {} out of range (document has {total} pages)", range.end),
                ));
            }
            for page in range.start..=range.end {
                if !pages.contains(&page) {
                    pages.push(page);
                }
            }
        }
        Ok(pages)
    }

    pub fn contains(&self, page: u32) -> bool {
        self.ranges
            .iter()
            .any(|range| (range.start..=range.end).contains(&page))
    }
}

impl FromStr for PageSelection {
    type Err = WandelwerkError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = |reason: String| WandelwerkError::invalid_option("pages", reason);
        let parse_page = |text: &str| -> Result<u32> {
            let page: u32 = text
                .trim()
                .parse()
                .map_err(|_| bad(format!("`{}` is not a page number", text.trim())))?;
            if page == 0 {
                return Err(bad("pages are numbered from 1".into()));
            }
            Ok(page)
        };

        let mut ranges = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (parse_page(start)?, parse_page(end)?);
                    if start > end {
                        return Err(bad(format!("range {start}-{end} is reversed")));
                    }
                    PageRange { start, end }
                }
                None => {
                    let page = parse_page(part)?;
                    PageRange {
                        start: page,
                        end: page,
                    }
                }
            };
            ranges.push(range);
        }

        if ranges.is_empty() {
            return Err(bad("no pages selected".into()));
        }
        Ok(Self { ranges })
    }
}

/// Operation-specific options, parsed from the caller's name → value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub pages: Option<PageSelection>,
    /// Rotation in degrees, clockwise.
    pub rotation: Option<i32>,
    /// Lossy encoder quality, 1-100.
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Last page of the first part when splitting.
    pub split_at: Option<u32>,
    /// Rasterisation resolution.
    pub dpi: Option<u32>,
}

impl ConversionOptions {
    /// Option names accepted by [`ConversionOptions::from_map`].
    pub const NAMES: [&'static str; 7] = [
        "pages", "rotation", "quality", "width", "height", "split_at", "dpi",
    ];

    /// Parse options from a string map. Blank values are ignored; unknown
    /// names and malformed values are rejected.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut options = Self::default();
        for (name, value) in map {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.as_str() {
                "pages" => options.pages = Some(value.parse()?),
                "rotation" => options.rotation = Some(parse_number(name, value)?),
                "quality" => {
                    let quality: u8 = parse_number(name, value)?;
                    if !(1..=100).contains(&quality) {
                        return Err(WandelwerkError::invalid_option(
                            name.as_str(),
                            "must be between 1 and 100",
                        ));
                    }
                    options.quality = Some(quality);
                }
                "width" => options.width = Some(parse_dimension(name, value)?),
                "height" => options.height = Some(parse_dimension(name, value)?),
                "split_at" => options.split_at = Some(parse_positive(name, value)?),
                "dpi" => {
                    let dpi: u32 = parse_number(name, value)?;
                    if !(36..=600).contains(&dpi) {
                        return Err(WandelwerkError::invalid_option(
                            name.as_str(),
                            "must be between 36 and 600",
                        ));
                    }
                    options.dpi = Some(dpi);
                }
                other => {
                    return Err(WandelwerkError::invalid_option(
                        other,
                        format!("unknown option (expected one of {})", Self::NAMES.join(", ")),
                    ));
                }
            }
        }
        Ok(options)
    }

    /// Bounding box for a resize, if either dimension was given.
    pub fn resize_box(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (None, None) => None,
            (w, h) => Some((
                w.unwrap_or(MAX_IMAGE_DIMENSION),
                h.unwrap_or(MAX_IMAGE_DIMENSION),
            )),
        }
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| WandelwerkError::invalid_option(name, format!("`{value}` is not a valid number")))
}

fn parse_positive(name: &str, value: &str) -> Result<u32> {
    let number: u32 = parse_number(name, value)?;
    if number == 0 {
        return Err(WandelwerkError::invalid_option(name, "must be greater than zero"));
    }
    Ok(number)
}

fn parse_dimension(name: &str, value: &str) -> Result<u32> {
    let number = parse_positive(name, value)?;
    if number > MAX_IMAGE_DIMENSION {
        return Err(WandelwerkError::invalid_option(
            name,
            format!("must be at most {MAX_IMAGE_DIMENSION} pixels"),
        ));
    }
    Ok(number)
}

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Name as uploaded by the caller.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// File name without directory components or extension.
    pub fn stem(&self) -> &str {
        let base = self
            .name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.name.as_str());
        match base.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ if base.is_empty() => "converted",
            _ => base,
        }
    }
}

/// A complete conversion request as received from the upload surface.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub id: RequestId,
    pub source: Format,
    pub target: Format,
    pub operation: Operation,
    /// Uploaded files in caller order.
    pub inputs: Vec<InputFile>,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(source: Format, target: Format, operation: Operation, inputs: Vec<InputFile>) -> Self {
        Self {
            id: RequestId::new(),
            source,
            target,
            operation,
            inputs,
            options: ConversionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sum of all input sizes in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.inputs.iter().map(|input| input.bytes.len() as u64).sum()
    }
}

/// The single artifact handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub artifact: Vec<u8>,
    pub media_type: String,
    pub filename: String,
}

/// Lifecycle states of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Upload accepted, nothing checked yet.
    Received,
    /// Registry entry and ceilings checked.
    Validated,
    /// Workspace allocated and capability running.
    Dispatched,
    /// Artifact produced.
    Completed,
    /// Validation failed; no workspace was created.
    Rejected,
    /// Capability failed or timed out.
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Failed)
    }

    pub fn can_transition_to(&self, next: RequestState) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Validated)
                | (Self::Received, Self::Rejected)
                | (Self::Validated, Self::Dispatched)
                | (Self::Dispatched, Self::Completed)
                | (Self::Dispatched, Self::Failed)
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(self, next: RequestState) -> Result<RequestState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WandelwerkError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension_accepts_aliases() {
        assert_eq!(Format::from_extension("JPG"), Some(Format::Jpeg));
        assert_eq!(Format::from_extension("tif"), Some(Format::Tiff));
        assert_eq!(Format::from_filename("report.final.docx"), Some(Format::Docx));
        assert_eq!(Format::from_filename("README"), None);
        assert!("dwg".parse::<Format>().is_err());
    }

    #[test]
    fn format_serialises_as_extension() {
        assert_eq!(serde_json::to_string(&Format::Text).unwrap(), "\"txt\"");
        assert_eq!(serde_json::to_string(&Format::Xlsx).unwrap(), "\"xlsx\"");
        assert_eq!(
            serde_json::to_string(&Operation::ExtractPages).unwrap(),
            "\"extract-pages\""
        );
    }

    #[test]
    fn page_selection_resolves_in_order_without_duplicates() {
        let selection: PageSelection = "3, 1-2, 2".parse().unwrap();
        assert_eq!(selection.resolve(5).unwrap(), vec![3, 1, 2]);
        assert!(selection.contains(2));
        assert!(!selection.contains(4));
    }

    #[test]
    fn page_selection_rejects_bad_input() {
        assert!("".parse::<PageSelection>().is_err());
        assert!("0".parse::<PageSelection>().is_err());
        assert!("4-2".parse::<PageSelection>().is_err());
        assert!("a-b".parse::<PageSelection>().is_err());

        let selection: PageSelection = "2-9".parse().unwrap();
        let err = selection.resolve(5).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn options_parse_from_map() {
        let map: BTreeMap<String, String> = [
            ("pages", "2-3"),
            ("rotation", "90"),
            ("quality", "75"),
            ("width", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let options = ConversionOptions::from_map(&map).unwrap();
        assert_eq!(options.rotation, Some(90));
        assert_eq!(options.quality, Some(75));
        assert_eq!(options.width, None);
        assert_eq!(options.pages.unwrap().resolve(3).unwrap(), vec![2, 3]);
    }

    #[test]
    fn options_reject_unknown_and_out_of_range() {
        let unknown: BTreeMap<String, String> =
            [("colour".to_string(), "red".to_string())].into_iter().collect();
        match ConversionOptions::from_map(&unknown).unwrap_err() {
            WandelwerkError::InvalidOptions { name, .. } => assert_eq!(name, "colour"),
            other => panic!("unexpected error variant: {other}"),
        }

        let quality: BTreeMap<String, String> =
            [("quality".to_string(), "0".to_string())].into_iter().collect();
        assert!(ConversionOptions::from_map(&quality).is_err());
    }

    #[test]
    fn resize_dimensions_are_bounded() {
        let huge: BTreeMap<String, String> = [
            ("width".to_string(), "200000".to_string()),
            ("height".to_string(), "200000".to_string()),
        ]
        .into_iter()
        .collect();
        match ConversionOptions::from_map(&huge).unwrap_err() {
            WandelwerkError::InvalidOptions { name, .. } => assert_eq!(name, "height"),
            other => panic!("unexpected error variant: {other}"),
        }

        let largest: BTreeMap<String, String> =
            [("width".to_string(), MAX_IMAGE_DIMENSION.to_string())].into_iter().collect();
        let options = ConversionOptions::from_map(&largest).unwrap();
        assert_eq!(options.width, Some(MAX_IMAGE_DIMENSION));
    }

    #[test]
    fn resize_box_fills_missing_dimension() {
        let options = ConversionOptions {
            width: Some(640),
            ..Default::default()
        };
        assert_eq!(options.resize_box(), Some((640, MAX_IMAGE_DIMENSION)));
        assert_eq!(ConversionOptions::default().resize_box(), None);
    }

    #[test]
    fn input_stem_strips_directories_and_extension() {
        assert_eq!(InputFile::new("C:\\docs\\q3 report.xlsx", vec![]).stem(), "q3 report");
        assert_eq!(InputFile::new("archive.tar.gz", vec![]).stem(), "archive.tar");
        assert_eq!(InputFile::new("notes", vec![]).stem(), "notes");
        assert_eq!(InputFile::new("", vec![]).stem(), "converted");
    }

    #[test]
    fn request_state_lifecycle() {
        let state = RequestState::Received
            .transition(RequestState::Validated)
            .and_then(|s| s.transition(RequestState::Dispatched))
            .and_then(|s| s.transition(RequestState::Completed))
            .unwrap();
        assert!(state.is_terminal());

        assert!(RequestState::Completed.transition(RequestState::Failed).is_err());
        assert!(RequestState::Rejected.transition(RequestState::Validated).is_err());
        assert!(RequestState::Received.transition(RequestState::Dispatched).is_err());
    }
}
