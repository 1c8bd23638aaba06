// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format capability registry: the single table of legal conversions.
//
// Every (source, target, operation) triple the service accepts appears here
// exactly once, together with the capability that performs it. The HTTP
// listing and the dispatcher both read this table, so they cannot disagree
// about what is allowed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WandelwerkError};
use crate::types::{Format, Operation};

/// The collaborator a conversion is delegated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalTool {
    /// Headless office suite (`soffice --convert-to`).
    OfficeSuite,
    /// PDF rasteriser binary plus the in-process PDF library.
    PdfRenderer,
    /// In-process image codecs.
    ImageLibrary,
    /// Conversions implemented directly on top of parsing crates.
    Native,
}

impl ExternalTool {
    pub const ALL: [ExternalTool; 4] = [
        Self::OfficeSuite,
        Self::PdfRenderer,
        Self::ImageLibrary,
        Self::Native,
    ];
}

impl fmt::Display for ExternalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OfficeSuite => "office suite",
            Self::PdfRenderer => "PDF renderer",
            Self::ImageLibrary => "image library",
            Self::Native => "native converter",
        })
    }
}

/// How many input files an entry accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputArity {
    Single,
    Many { min: usize },
}

impl InputArity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Self::Single => count == 1,
            Self::Many { min } => count >= *min,
        }
    }
}

impl fmt::Display for InputArity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("exactly one file"),
            Self::Many { min: 1 } => f.write_str("one or more files"),
            Self::Many { min } => write!(f, "at least {min} files"),
        }
    }
}

/// One legal conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub source: Format,
    pub target: Format,
    pub operation: Operation,
    pub tool: ExternalTool,
    pub arity: InputArity,
}

type Key = (Format, Format, Operation);

/// Read-only lookup table of [`CapabilityEntry`] values.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<Key, CapabilityEntry>,
}

static STANDARD: LazyLock<CapabilityRegistry> =
    LazyLock::new(|| CapabilityRegistry::new(standard_entries()));

impl CapabilityRegistry {
    /// Build a registry from explicit entries. A later entry for the same
    /// triple replaces an earlier one.
    pub fn new(entries: impl IntoIterator<Item = CapabilityEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| ((entry.source, entry.target, entry.operation), entry))
            .collect();
        Self { entries }
    }

    /// The process-wide table of every conversion the service supports.
    pub fn standard() -> &'static CapabilityRegistry {
        &STANDARD
    }

    /// Look up the plain `convert` entry for a format pair.
    pub fn lookup(&self, source: Format, target: Format) -> Result<&CapabilityEntry> {
        self.lookup_operation(source, target, Operation::Convert)
    }

    /// Look up an exact (source, target, operation) triple.
    pub fn lookup_operation(
        &self,
        source: Format,
        target: Format,
        operation: Operation,
    ) -> Result<&CapabilityEntry> {
        self.entries
            .get(&(source, target, operation))
            .ok_or(WandelwerkError::UnsupportedConversion {
                from: source,
                to: target,
                operation,
            })
    }

    /// Every format `source` can be turned into, by any operation.
    pub fn supported_targets(&self, source: Format) -> BTreeSet<Format> {
        self.entries
            .values()
            .filter(|entry| entry.source == source)
            .map(|entry| entry.target)
            .collect()
    }

    /// Operations available for a format pair.
    pub fn operations(&self, source: Format, target: Format) -> Vec<Operation> {
        self.entries
            .values()
            .filter(|entry| entry.source == source && entry.target == target)
            .map(|entry| entry.operation)
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CapabilityEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn standard_entries() -> Vec<CapabilityEntry> {
    use ExternalTool::*;
    use Format::*;

    let mut entries = Vec::new();
    let mut add = |source, target, operation, tool, arity| {
        entries.push(CapabilityEntry {
            source,
            target,
            operation,
            tool,
            arity,
        });
    };
    let single = InputArity::Single;

    // -- Office suite -----------------------------------------------------------
    for source in [Docx, Doc, Odt, Rtf, Xlsx, Xls, Ods, Pptx, Ppt, Odp] {
        add(source, Pdf, Operation::Convert, OfficeSuite, single);
    }
    for (source, target) in [
        (Docx, Odt),
        (Odt, Docx),
        (Doc, Docx),
        (Rtf, Docx),
        (Xlsx, Ods),
        (Ods, Xlsx),
        (Xls, Xlsx),
        (Pptx, Odp),
        (Odp, Pptx),
        (Ppt, Pptx),
        (Pdf, Docx),
    ] {
        add(source, target, Operation::Convert, OfficeSuite, single);
    }

    // -- PDF renderer -------------------------------------------------------------
    add(Pdf, Jpeg, Operation::Convert, PdfRenderer, single);
    add(Pdf, Png, Operation::Convert, PdfRenderer, single);
    add(Pdf, Pdf, Operation::Merge, PdfRenderer, InputArity::Many { min: 2 });
    for operation in [
        Operation::Split,
        Operation::Rotate,
        Operation::Compress,
        Operation::ExtractPages,
    ] {
        add(Pdf, Pdf, operation, PdfRenderer, single);
    }

    // -- Image library ------------------------------------------------------------
    for source in Format::IMAGES {
        for target in Format::IMAGES {
            if source == target {
                add(source, target, Operation::Resize, ImageLibrary, single);
                add(source, target, Operation::Rotate, ImageLibrary, single);
            } else {
                add(source, target, Operation::Convert, ImageLibrary, single);
            }
        }
        add(source, Pdf, Operation::Convert, ImageLibrary, InputArity::Many { min: 1 });
    }

    // -- Native -------------------------------------------------------------------
    add(Csv, Xlsx, Operation::Convert, Native, single);
    for source in [Xlsx, Xls, Ods] {
        add(source, Csv, Operation::Convert, Native, single);
    }
    add(Pdf, Xlsx, Operation::Convert, Native, single);
    add(Pdf, Text, Operation::Convert, Native, single);
    add(Text, Pdf, Operation::Convert, Native, single);

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_one_entry_per_triple() {
        let registry = CapabilityRegistry::standard();
        assert_eq!(registry.len(), standard_entries().len());
        assert!(!registry.is_empty());
    }

    #[test]
    fn lookup_finds_office_and_native_routes() {
        let registry = CapabilityRegistry::standard();
        assert_eq!(
            registry.lookup(Format::Docx, Format::Pdf).unwrap().tool,
            ExternalTool::OfficeSuite
        );
        assert_eq!(
            registry.lookup(Format::Csv, Format::Xlsx).unwrap().tool,
            ExternalTool::Native
        );
        assert_eq!(
            registry
                .lookup_operation(Format::Pdf, Format::Pdf, Operation::Merge)
                .unwrap()
                .arity,
            InputArity::Many { min: 2 }
        );
    }

    #[test]
    fn unknown_pair_is_not_supported() {
        let registry = CapabilityRegistry::standard();
        match registry.lookup(Format::Csv, Format::Pptx).unwrap_err() {
            WandelwerkError::UnsupportedConversion { from, to, operation } => {
                assert_eq!(from, Format::Csv);
                assert_eq!(to, Format::Pptx);
                assert_eq!(operation, Operation::Convert);
            }
            other => panic!("unexpected error variant: {other}"),
        }
        // Same-format image conversion only exists as resize/rotate.
        assert!(registry.lookup(Format::Png, Format::Png).is_err());
    }

    #[test]
    fn supported_targets_match_entries() {
        let registry = CapabilityRegistry::standard();
        let targets = registry.supported_targets(Format::Pdf);
        for expected in [Format::Pdf, Format::Png, Format::Jpeg, Format::Docx, Format::Xlsx, Format::Text] {
            assert!(targets.contains(&expected), "missing {expected}");
        }
        for target in &targets {
            assert!(!registry.operations(Format::Pdf, *target).is_empty());
        }
        assert!(registry.supported_targets(Format::Text).contains(&Format::Pdf));
    }

    #[test]
    fn arity_accepts_counts() {
        assert!(InputArity::Single.accepts(1));
        assert!(!InputArity::Single.accepts(2));
        assert!(!InputArity::Many { min: 2 }.accepts(1));
        assert!(InputArity::Many { min: 1 }.accepts(3));
    }

    #[test]
    fn custom_registry_overrides_duplicates() {
        let entry = CapabilityEntry {
            source: Format::Csv,
            target: Format::Xlsx,
            operation: Operation::Convert,
            tool: ExternalTool::Native,
            arity: InputArity::Single,
        };
        let replacement = CapabilityEntry {
            tool: ExternalTool::OfficeSuite,
            ..entry
        };
        let registry = CapabilityRegistry::new([entry, replacement]);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup(Format::Csv, Format::Xlsx).unwrap().tool,
            ExternalTool::OfficeSuite
        );
    }
}
