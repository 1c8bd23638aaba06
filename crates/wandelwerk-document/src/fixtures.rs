// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic documents for tests. Compiled for this crate's own tests and, via
// the `fixtures` feature, for downstream test suites. Helpers panic on
// failure since their inputs are fixed.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::sheet::{Sheet, XlsxWriter};

/// A PDF with `pages` A4 pages. Page `n` shows the text "Page n" and carries
/// a custom `/Marker n` entry, so reordering can be checked with
/// [`page_markers`]. Resources and MediaBox live on the /Pages node and are
/// inherited.
pub fn marked_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for n in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content stream encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Marker" => n as i64,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture PDF serialises");
    bytes
}

/// `/Marker` of every page in page order; -1 for unmarked pages.
pub fn page_markers(pdf: &[u8]) -> Vec<i64> {
    page_values(pdf, b"Marker", -1)
}

/// `/Rotate` of every page in page order, 0 when absent.
pub fn page_rotations(pdf: &[u8]) -> Vec<i64> {
    page_values(pdf, b"Rotate", 0)
}

fn page_values(pdf: &[u8], key: &[u8], missing: i64) -> Vec<i64> {
    let doc = Document::load_mem(pdf).expect("fixture reads a valid PDF");
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            doc.get_dictionary(page_id)
                .and_then(|page| page.get(key))
                .and_then(Object::as_i64)
                .unwrap_or(missing)
        })
        .collect()
}

/// A single-colour PNG.
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_solid(width, height, rgb, ImageFormat::Png)
}

/// A single-colour JPEG.
pub fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_solid(width, height, rgb, ImageFormat::Jpeg)
}

fn encode_solid(width: u32, height: u32, rgb: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("fixture image encodes");
    bytes
}

/// An XLSX workbook with sheets "Summary" and "Data".
///
/// Summary: `name,total` / `widgets,42`. Data: `id,label` / `,"x, y"`.
pub fn two_sheet_xlsx() -> Vec<u8> {
    let cells = |rows: &[&[&str]]| -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    };
    let mut writer = XlsxWriter::new();
    writer
        .add_sheet(Sheet::new(
            "Summary",
            cells(&[&["name", "total"], &["widgets", "42"]]),
        ))
        .add_sheet(Sheet::new("Data", cells(&[&["id", "label"], &["", "x, y"]])));
    writer.to_bytes().expect("fixture workbook serialises")
}

/// A one-sheet XLSX whose first column holds styled date cells: a header
/// `when`, the serial 45292 as a date, 45292.5 as a date and time, and 0.75
/// as a bare time of day. B2 holds the same serial unstyled.
pub fn dated_xlsx() -> Vec<u8> {
    const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
    const MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
    const PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

    let parts = [
        (
            "[Content_Types].xml",
            format!(
                r#"{DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#
            ),
        ),
        (
            "_rels/.rels",
            format!(
                r#"{DECL}<Relationships xmlns="{PKG_REL}"><Relationship Id="rId1" Type="{REL}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
            ),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"{DECL}<workbook xmlns="{MAIN}" xmlns:r="{REL}"><sheets><sheet name="Dates" sheetId="1" r:id="rId1"/></sheets></workbook>"#
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            format!(
                r#"{DECL}<Relationships xmlns="{PKG_REL}"><Relationship Id="rId1" Type="{REL}/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="{REL}/styles" Target="styles.xml"/></Relationships>"#
            ),
        ),
        (
            // Built-in number formats: 14 date, 22 date and time, 21 time.
            "xl/styles.xml",
            format!(
                r#"{DECL}<styleSheet xmlns="{MAIN}"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="4"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="22" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="21" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#
            ),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"{DECL}<worksheet xmlns="{MAIN}"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>when</t></is></c></row><row r="2"><c r="A2" s="1"><v>45292</v></c><c r="B2"><v>45292</v></c></row><row r="3"><c r="A3" s="2"><v>45292.5</v></c></row><row r="4"><c r="A4" s="3"><v>0.75</v></c></row></sheetData></worksheet>"#
            ),
        ),
    ];
    crate::archive::pack(&parts).expect("fixture workbook serialises")
}
