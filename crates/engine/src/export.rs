use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use ab_glyph::Font;
use core_types::{ExportSpec, PlacementSpec, RenderConfig, ResizeSpec};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::compositor::{Compositor, PreparedWatermark};
use crate::encode::{encode, write_atomic};
use crate::font::FontRegistry;
use crate::naming::output_name;
use crate::{EngineError, Result, SourceImage};

#[derive(Clone, Default, Debug)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct ExportProgress {
    pub completed: usize,
    pub total: usize,
    pub input: PathBuf,
    pub error: Option<String>,
}

#[derive(Clone, Default)]
pub struct ExportOptions {
    pub progress: Option<Arc<dyn Fn(ExportProgress) + Send + Sync>>,
    pub cancel: CancellationFlag,
}

impl ExportOptions {
    fn emit_progress(&self, completed: usize, total: usize, input: &Path, error: Option<String>) {
        if let Some(cb) = &self.progress {
            cb(ExportProgress {
                completed,
                total,
                input: input.to_path_buf(),
                error,
            });
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExportReport {
    /// Written files, in input order.
    pub exported: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub canceled: bool,
}

impl ExportReport {
    pub fn failed_names(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|(path, _)| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            })
            .collect()
    }
}

enum Outcome {
    Written(PathBuf),
    Failed(String),
    Skipped,
}

/// Renders and writes every input into `out_dir` in parallel. A failing
/// image is recorded in the report and does not stop the others; only an
/// invalid configuration or an unusable output directory fails the batch.
///
/// The watermark layer is prepared once. If that fails, every input is
/// reported as failed with the same error.
pub fn export_batch<R>(
    compositor: &Compositor<R>,
    inputs: &[PathBuf],
    config: &RenderConfig,
    export: &ExportSpec,
    out_dir: &Path,
    options: &ExportOptions,
) -> Result<ExportReport>
where
    R: FontRegistry,
    R::Face: Font,
{
    config.validate()?;
    export.validate()?;
    fs::create_dir_all(out_dir)?;

    let total = inputs.len();
    info!(total, out_dir = %out_dir.display(), format = %export.format, "starting export");
    let completed = AtomicUsize::new(0);

    let prepared = compositor.prepare_config(config).map_err(|err| {
        warn!(error = %err, "watermark could not be prepared");
        err.to_string()
    });

    let outcomes: Vec<Outcome> = inputs
        .par_iter()
        .map(|input| {
            if options.cancel.is_canceled() {
                return Outcome::Skipped;
            }
            let outcome = match &prepared {
                Err(msg) => Outcome::Failed(msg.clone()),
                Ok(watermark) => {
                    let placement = &config.placement;
                    match export_prepared(compositor, input, watermark, placement, export, out_dir)
                    {
                        Ok(path) => Outcome::Written(path),
                        Err(err) => {
                            warn!(input = %input.display(), error = %err, "export failed");
                            Outcome::Failed(err.to_string())
                        }
                    }
                }
            };
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            let error = match &outcome {
                Outcome::Failed(msg) => Some(msg.clone()),
                _ => None,
            };
            options.emit_progress(done, total, input, error);
            outcome
        })
        .collect();

    let mut report = ExportReport::default();
    for (input, outcome) in inputs.iter().zip(outcomes) {
        match outcome {
            Outcome::Written(path) => report.exported.push(path),
            Outcome::Failed(msg) => report.failed.push((input.clone(), msg)),
            Outcome::Skipped => report.canceled = true,
        }
    }
    info!(
        exported = report.exported.len(),
        failed = report.failed.len(),
        canceled = report.canceled,
        "export finished"
    );
    Ok(report)
}

/// Decode, render, resize, encode and write a single input. Returns the
/// written path.
pub fn export_one<R>(
    compositor: &Compositor<R>,
    input: &Path,
    config: &RenderConfig,
    export: &ExportSpec,
    out_dir: &Path,
) -> Result<PathBuf>
where
    R: FontRegistry,
    R::Face: Font,
{
    let watermark = compositor.prepare_config(config)?;
    export_prepared(compositor, input, &watermark, &config.placement, export, out_dir)
}

fn export_prepared<R>(
    compositor: &Compositor<R>,
    input: &Path,
    watermark: &PreparedWatermark,
    placement: &PlacementSpec,
    export: &ExportSpec,
    out_dir: &Path,
) -> Result<PathBuf>
where
    R: FontRegistry,
    R::Face: Font,
{
    let target = out_dir.join(output_name(input, export));
    if is_same_file(input, &target) {
        return Err(EngineError::WouldOverwriteSource(input.to_path_buf()));
    }

    let source = SourceImage::open(input)?;
    let mut composited = compositor.render_prepared(&source, watermark, placement)?;
    if let Some(resize) = &export.resize {
        composited = apply_resize(&composited, resize);
    }
    let bytes = encode(&composited, export.format, export.jpeg_quality)?;
    write_atomic(&target, &bytes)?;
    Ok(target)
}

pub fn apply_resize(buffer: &RgbaImage, resize: &ResizeSpec) -> RgbaImage {
    let (w, h) = resize.target_dimensions(buffer.width(), buffer.height());
    if (w, h) == buffer.dimensions() {
        return buffer.clone();
    }
    imageops::resize(buffer, w, h, FilterType::Triangle)
}

fn is_same_file(input: &Path, target: &Path) -> bool {
    let (Some(dir), Some(name)) = (target.parent(), target.file_name()) else {
        return false;
    };
    match (input.canonicalize(), dir.canonicalize()) {
        (Ok(input), Ok(dir)) => input == dir.join(name),
        _ => false,
    }
}
