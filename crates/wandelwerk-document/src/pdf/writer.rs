// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer: create new PDF documents from text or images using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};
use wandelwerk_core::error::WandelwerkError;

/// ISO 216 A4 in millimetres.
const A4_MM: (f32, f32) = (210.0, 297.0);

/// Title embedded in the PDF /Info dictionary.
const DOCUMENT_TITLE: &str = "Wandelwerk Document";

/// Creates new PDF documents from text content or raster images.
pub struct PdfWriter {
    /// Page size in millimetres (width, height).
    page_mm: (f32, f32),
    /// Resolution images are assumed to have when placed on a page.
    image_dpi: f32,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self {
            page_mm: A4_MM,
            image_dpi: 150.0,
        }
    }
}

impl PdfWriter {
    /// Create a writer targeting A4 paper.
    pub fn a4() -> Self {
        Self::default()
    }

    /// Set the resolution used to size images on the page.
    pub fn with_image_dpi(mut self, dpi: u32) -> Self {
        self.image_dpi = dpi.max(1) as f32;
        self
    }

    fn page_dimensions(&self) -> (Mm, Mm) {
        (Mm(self.page_mm.0), Mm(self.page_mm.1))
    }

    // -- Text to PDF ----------------------------------------------------------

    /// Create a PDF from plain text content.
    ///
    /// The text is laid out in a simple top-to-bottom flow using the built-in
    /// Helvetica font. Long lines are wrapped at an estimated character width
    /// and pages break automatically.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn create_from_text(&self, text: &str) -> Result<Vec<u8>, WandelwerkError> {
        let (page_w, page_h) = self.page_dimensions();
        info!("Creating text PDF");

        let font_size_pt: f32 = 11.0;
        let line_height_pt: f32 = 14.0;
        let margin_mm: f32 = 20.0;
        let margin_pt: f32 = Mm(margin_mm).into_pt().0;
        let usable_width_mm = page_w.0 - 2.0 * margin_mm;

        // Average Helvetica glyph width is roughly 0.50 * font_size in pt,
        // converted to mm (1pt = 0.3528mm).
        let avg_char_width_mm: f32 = 0.50 * font_size_pt * 0.3528;
        let max_chars_per_line = (usable_width_mm / avg_char_width_mm) as usize;

        let wrapped_lines = wrap_text(text, max_chars_per_line);
        let page_h_pt = page_h.into_pt().0;
        let usable_height_pt = page_h_pt - 2.0 * margin_pt;
        let lines_per_page = ((usable_height_pt / line_height_pt) as usize).max(1);

        let mut pages: Vec<PdfPage> = wrapped_lines
            .chunks(lines_per_page)
            .map(|chunk| {
                let mut ops: Vec<Op> = Vec::with_capacity(chunk.len() * 5);
                for (line_idx, line) in chunk.iter().enumerate() {
                    // Position: top-left of the page, moving downward.
                    let y_pt = page_h_pt - margin_pt - (line_idx as f32 * line_height_pt);
                    ops.push(Op::StartTextSection);
                    ops.push(Op::SetTextCursor {
                        pos: Point {
                            x: Pt(margin_pt),
                            y: Pt(y_pt),
                        },
                    });
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(font_size_pt),
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(line.clone())],
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::EndTextSection);
                }
                PdfPage::new(page_w, page_h, ops)
            })
            .collect();

        // Empty input still yields a valid one-page document.
        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }

        debug!(
            total_lines = wrapped_lines.len(),
            pages = pages.len(),
            "Text layout complete"
        );

        let mut doc = PdfDocument::new(DOCUMENT_TITLE);
        doc.with_pages(pages);
        Ok(save(&doc))
    }

    // -- Images to PDF --------------------------------------------------------

    /// Create a PDF with one page per image, in the order given.
    ///
    /// Each image is scaled to fit within the page margins while preserving
    /// its aspect ratio, and centred.
    #[instrument(skip_all, fields(images = images.len()))]
    pub fn create_from_images(&self, images: &[&[u8]]) -> Result<Vec<u8>, WandelwerkError> {
        if images.is_empty() {
            return Err(WandelwerkError::InvalidInput(
                "at least one image is required".into(),
            ));
        }

        let (page_w, page_h) = self.page_dimensions();
        info!(image_dpi = self.image_dpi, "Creating image PDF");

        let mut doc = PdfDocument::new(DOCUMENT_TITLE);
        let mut pages = Vec::with_capacity(images.len());

        for (index, image_bytes) in images.iter().enumerate() {
            let dynamic_image = ::image::load_from_memory(image_bytes).map_err(|err| {
                WandelwerkError::ImageError(format!(
                    "failed to decode image #{} for PDF: {}",
                    index + 1,
                    err
                ))
            })?;

            let img_width = dynamic_image.width() as usize;
            let img_height = dynamic_image.height() as usize;

            let rgb_image = dynamic_image.to_rgb8();
            let raw = RawImage {
                pixels: RawImageData::U8(rgb_image.into_raw()),
                width: img_width,
                height: img_height,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let margin_mm: f32 = 15.0;
            let usable_w_pt = Mm(page_w.0 - 2.0 * margin_mm).into_pt().0;
            let usable_h_pt = Mm(page_h.0 - 2.0 * margin_mm).into_pt().0;

            let img_w_pt = img_width as f32 / self.image_dpi * 72.0;
            let img_h_pt = img_height as f32 / self.image_dpi * 72.0;

            // Scale to fit while preserving aspect ratio; do not upscale.
            let scale = (usable_w_pt / img_w_pt)
                .min(usable_h_pt / img_h_pt)
                .min(1.0);
            let rendered_w_pt = img_w_pt * scale;
            let rendered_h_pt = img_h_pt * scale;

            let margin_pt = Mm(margin_mm).into_pt().0;
            let x_offset = margin_pt + (usable_w_pt - rendered_w_pt) / 2.0;
            let y_offset = margin_pt + (usable_h_pt - rendered_h_pt) / 2.0;

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(x_offset)),
                    translate_y: Some(Pt(y_offset)),
                    scale_x: Some(scale),
                    scale_y: Some(scale),
                    dpi: Some(self.image_dpi),
                    rotate: None,
                },
            }];

            debug!(index, rendered_w_pt, rendered_h_pt, scale, "Image placed on page");
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pages);
        Ok(save(&doc))
    }
}

fn save(doc: &PdfDocument) -> Vec<u8> {
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if !warnings.is_empty() {
        debug!(warnings = warnings.len(), "printpdf reported warnings");
    }
    output
}

// -- Text wrapping helper -----------------------------------------------------

/// Wrap a multi-line string so that no line exceeds `max_width` characters.
///
/// Splits on existing newlines first, then performs simple word-wrap within each
/// paragraph. Words longer than `max_width` are force-broken on character
/// boundaries.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut result = Vec::new();

    for paragraph in text.lines() {
        let mut current_line = String::with_capacity(max_width);
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if word_len > max_width {
                if !current_line.is_empty() {
                    result.push(std::mem::take(&mut current_line));
                }
                let chars: Vec<char> = word.chars().collect();
                let mut chunks = chars.chunks(max_width).peekable();
                while let Some(chunk) = chunks.next() {
                    let piece: String = chunk.iter().collect();
                    if chunks.peek().is_some() {
                        result.push(piece);
                    } else {
                        current_len = chunk.len();
                        current_line = piece;
                    }
                }
            } else if current_line.is_empty() {
                current_line.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_width {
                current_line.push(' ');
                current_line.push_str(word);
                current_len += 1 + word_len;
            } else {
                result.push(std::mem::replace(&mut current_line, word.to_string()));
                current_len = word_len;
            }
        }

        result.push(current_line);
    }

    result
}
