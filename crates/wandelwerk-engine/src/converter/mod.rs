// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Converters: one implementation per external capability.
//
// The dispatcher never branches on formats itself: it looks the request up in
// the capability registry and hands the staged inputs to the converter for
// the entry's tool through the uniform `Converter::run` contract.

pub mod image;
pub mod native;
pub mod office;
pub mod pdf;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use wandelwerk_core::config::AppConfig;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::registry::{CapabilityEntry, ExternalTool};
use wandelwerk_core::types::ConversionOptions;

pub use self::image::ImageConverter;
pub use native::NativeConverter;
pub use office::OfficeConverter;
pub use pdf::PdfConverter;

/// A capability that turns staged input files into output files.
#[async_trait]
pub trait Converter: Send + Sync {
    /// The tool this converter stands for; used to attribute failures.
    fn tool(&self) -> ExternalTool;

    /// Convert `inputs` (in caller order) as described by `entry`, writing
    /// results into `output_dir`. Returns the produced files.
    async fn run(
        &self,
        entry: &CapabilityEntry,
        inputs: &[PathBuf],
        output_dir: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<PathBuf>>;
}

/// The converter for every [`ExternalTool`].
#[derive(Clone)]
pub struct ConverterSet {
    converters: BTreeMap<ExternalTool, Arc<dyn Converter>>,
}

impl ConverterSet {
    /// The production converters, with binaries and defaults from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let converters: [Arc<dyn Converter>; 4] = [
            Arc::new(OfficeConverter::new(&config.office_binary)),
            Arc::new(PdfConverter::new(&config.pdftoppm_binary, config.render_dpi)),
            Arc::new(ImageConverter::new(config.render_dpi)),
            Arc::new(NativeConverter::new()),
        ];
        Self {
            converters: converters
                .into_iter()
                .map(|converter| (converter.tool(), converter))
                .collect(),
        }
    }

    /// Replace the converter for its tool.
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converters.insert(converter.tool(), converter);
        self
    }

    pub fn get(&self, tool: ExternalTool) -> Result<&Arc<dyn Converter>> {
        self.converters
            .get(&tool)
            .ok_or_else(|| WandelwerkError::ExternalToolFailure {
                tool,
                diagnostics: "no converter configured".into(),
            })
    }
}

/// Run CPU-bound library work off the async executor.
///
/// A panic inside `work` is reported as a failure of `tool`. If the caller's
/// timeout fires first, the blocking task runs to completion in the
/// background and its result is discarded.
pub(crate) async fn blocking<T, F>(tool: ExternalTool, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| WandelwerkError::ExternalToolFailure {
            tool,
            diagnostics: format!("worker task aborted: {err}"),
        })?
}

/// Path of the `index`-th (0-based) input, or an error naming the arity.
pub(crate) fn input(inputs: &[PathBuf], index: usize) -> Result<&PathBuf> {
    inputs.get(index).ok_or_else(|| {
        WandelwerkError::InvalidInput(format!("expected at least {} input file(s)", index + 1))
    })
}

/// Output file named after the first input's stem with a new extension.
pub(crate) fn output_path(output_dir: &Path, input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    output_dir.join(format!("{stem}.{extension}"))
}

/// Write `bytes` to `output_dir/name` and return the path.
pub(crate) fn write_output(output_dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = output_dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Regular files in `output_dir`, in directory order.
pub(crate) fn collect_outputs(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::new();
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            outputs.push(entry.path());
        }
    }
    Ok(outputs)
}
