// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the in-process document operations: PDF merge and
// page extraction, image resize + re-encode, and XLSX writing.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use wandelwerk_core::types::{Format, PageSelection};
use wandelwerk_document::fixtures::{marked_pdf, solid_png};
use wandelwerk_document::{ImageProcessor, PdfReader, Sheet, XlsxWriter};

/// Merge three 20-page documents.
fn bench_pdf_merge(c: &mut Criterion) {
    let base = marked_pdf(20);
    let others = [marked_pdf(20), marked_pdf(20)];
    let other_refs: Vec<&[u8]> = others.iter().map(Vec::as_slice).collect();

    c.bench_function("pdf_merge (3 x 20 pages)", |b| {
        b.iter(|| {
            let reader = PdfReader::from_bytes(black_box(&base)).unwrap();
            black_box(reader.merge(&other_refs).unwrap());
        });
    });
}

/// Extract every other page of a 50-page document.
fn bench_pdf_extract(c: &mut Criterion) {
    let pdf = marked_pdf(50);
    let selection: PageSelection = (1..=50)
        .step_by(2)
        .map(|page| page.to_string())
        .collect::<Vec<_>>()
        .join(",")
        .parse()
        .unwrap();

    c.bench_function("pdf_extract (25 of 50 pages)", |b| {
        b.iter(|| {
            let reader = PdfReader::from_bytes(black_box(&pdf)).unwrap();
            black_box(reader.extract_pages(&selection).unwrap());
        });
    });
}

/// Downscale a 1024x768 PNG and encode it as JPEG.
fn bench_image_resize(c: &mut Criterion) {
    let png = solid_png(1024, 768, [40, 120, 200]);

    c.bench_function("image_resize_to_jpeg (1024x768 -> 256)", |b| {
        b.iter(|| {
            let processor = ImageProcessor::from_bytes(black_box(&png))
                .unwrap()
                .resize(256, 256)
                .unwrap();
            black_box(processor.encode(Format::Jpeg, Some(85)).unwrap());
        });
    });
}

/// Write a 1000 x 10 sheet of mixed numbers and text.
fn bench_xlsx_write(c: &mut Criterion) {
    let rows: Vec<Vec<String>> = (0..1000)
        .map(|r| {
            (0..10)
                .map(|col| if col % 2 == 0 { format!("{}", r * col) } else { format!("cell {r}") })
                .collect()
        })
        .collect();

    c.bench_function("xlsx_write (1000 x 10)", |b| {
        b.iter(|| {
            let mut writer = XlsxWriter::new();
            writer.add_sheet(Sheet::new("Data", black_box(rows.clone())));
            black_box(writer.to_bytes().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_pdf_merge,
    bench_pdf_extract,
    bench_image_resize,
    bench_xlsx_write
);
criterion_main!(benches);
