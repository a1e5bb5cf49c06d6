use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use core_types::{
    Anchor, ExportFormat, ExportSpec, FontStyle, ImageWatermark, RenderConfig, ResizeSpec,
};
use engine::{
    export_batch, Compositor, CoverageMode, ExportOptions, ExportProgress, FontRegistry,
    PreviewScheduler, SourceImage, SystemFontRegistry,
};
use image::RgbaImage;
use template_store::{Template, TemplateStore};
use tracing::{debug, info, warn};

use crate::scanner::collect_inputs;
use crate::{ApplyArgs, ExportArgs, PreviewArgs, TemplateCommand, WatermarkArgs};

pub fn apply(args: ApplyArgs, config_dir: Option<&Path>) -> Result<()> {
    let store = open_store(config_dir);
    let (mut render, mut export) = base_config(store.as_ref(), &args.watermark)?;
    args.watermark.apply_to(&mut render);
    args.export.apply_to(&mut export);
    render.validate().context("invalid watermark settings")?;
    export.validate().context("invalid export settings")?;
    if render.watermark.active().is_none() {
        warn!("no watermark configured; images will be exported unchanged");
    }

    let inputs = collect_inputs(&args.inputs);
    if inputs.is_empty() {
        bail!("No images found in the given inputs");
    }
    info!(images = inputs.len(), "collected inputs");

    let compositor = compositor(args.watermark.lenient_fonts);
    let options = ExportOptions {
        progress: Some(Arc::new(|p: ExportProgress| {
            debug!(completed = p.completed, total = p.total, input = %p.input.display(), "exported");
        })),
        ..ExportOptions::default()
    };
    let report = export_batch(&compositor, &inputs, &render, &export, &args.output, &options)
        .with_context(|| format!("export to {} failed", args.output.display()))?;

    println!(
        "Exported {} of {} images to {}",
        report.exported.len(),
        inputs.len(),
        args.output.display()
    );

    if let Some(store) = &store {
        if let Err(err) = store.save_last_used(render.clone(), export.clone()) {
            warn!(error = %err, "could not remember this configuration");
        }
    }
    if let Some(name) = &args.save_template {
        let store = require_store(store.as_ref())?;
        let path = store
            .save(&Template::new(name.clone(), render, export))
            .with_context(|| format!("failed to save template {name:?}"))?;
        println!("Saved template {name:?} to {}", path.display());
    }

    if !report.failed.is_empty() {
        eprintln!("Failed ({}):", report.failed.len());
        for (name, (_, error)) in report.failed_names().iter().zip(&report.failed) {
            eprintln!("  {name}: {error}");
        }
        bail!("{} image(s) could not be exported", report.failed.len());
    }
    Ok(())
}

pub fn preview(args: PreviewArgs, config_dir: Option<&Path>) -> Result<()> {
    let store = open_store(config_dir);
    let (mut render, _) = base_config(store.as_ref(), &args.watermark)?;
    args.watermark.apply_to(&mut render);

    let source = SourceImage::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let compositor = compositor(args.watermark.lenient_fonts);
    let scheduler = PreviewScheduler::new();
    let ticket = scheduler.request();
    let preview = scheduler
        .render(
            ticket,
            &compositor,
            &source,
            &render,
            args.max_width,
            args.max_height,
        )?
        .context("preview was superseded")?;

    let image = RgbaImage::from_raw(preview.width, preview.height, preview.data)
        .context("preview buffer does not match its dimensions")?;
    let bytes = engine::encode(&image, ExportFormat::Png, 100)?;
    engine::write_atomic(&args.output, &bytes)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "Wrote {}x{} preview to {}",
        preview.width,
        preview.height,
        args.output.display()
    );
    Ok(())
}

pub fn templates(cmd: TemplateCommand, config_dir: Option<&Path>) -> Result<()> {
    let store = open_store(config_dir);
    let store = require_store(store.as_ref())?;
    match cmd {
        TemplateCommand::List => {
            for name in store.list()? {
                println!("{name}");
            }
        }
        TemplateCommand::Show { name } => {
            let template = store
                .load(&name)?
                .with_context(|| format!("no template named {name:?}"))?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
        TemplateCommand::Delete { name } => {
            if !store.delete(&name)? {
                bail!("no template named {name:?}");
            }
            println!("Deleted template {name:?}");
        }
    }
    Ok(())
}

pub fn fonts() -> Result<()> {
    let registry = SystemFontRegistry::new();
    let mut families = registry.families();
    families.sort();
    families.dedup();
    if families.is_empty() {
        warn!("no fonts found; text watermarks cannot be drawn");
    }
    for family in families {
        println!("{family}");
    }
    Ok(())
}

fn compositor(lenient_fonts: bool) -> Compositor<SystemFontRegistry> {
    let coverage = if lenient_fonts {
        CoverageMode::Any
    } else {
        CoverageMode::All
    };
    Compositor::new(SystemFontRegistry::new()).with_coverage(coverage)
}

fn open_store(config_dir: Option<&Path>) -> Option<TemplateStore> {
    let opened = match config_dir {
        Some(dir) => TemplateStore::open(dir),
        None => TemplateStore::open_default(),
    };
    match opened {
        Ok(store) => Some(store),
        Err(err) => {
            warn!(error = %err, "template store unavailable");
            None
        }
    }
}

fn require_store(store: Option<&TemplateStore>) -> Result<&TemplateStore> {
    store.context("template store is unavailable; pass --config-dir")
}

/// Starting point before command-line overrides: a named template, the
/// previous run, or defaults.
fn base_config(
    store: Option<&TemplateStore>,
    args: &WatermarkArgs,
) -> Result<(RenderConfig, ExportSpec)> {
    if let Some(name) = &args.template {
        let template = require_store(store)?
            .load(name)
            .with_context(|| format!("failed to load template {name:?}"))?
            .with_context(|| format!("no template named {name:?}"))?;
        return Ok((template.render, template.export));
    }
    if args.last {
        if let Some(template) = store.and_then(TemplateStore::load_last_used) {
            return Ok((template.render, template.export));
        }
        warn!("no previous configuration found; using defaults");
    }
    Ok((RenderConfig::default(), ExportSpec::default()))
}

impl WatermarkArgs {
    pub fn apply_to(&self, config: &mut RenderConfig) {
        let text = &mut config.watermark.text;
        if let Some(content) = &self.text {
            text.content = content.clone();
        }
        if let Some(font) = &self.font {
            text.font_family = font.clone();
        }
        if let Some(size) = self.size {
            text.size = size;
        }
        if self.bold || self.italic {
            text.style = FontStyle::from_flags(self.bold, self.italic);
        }
        if let Some(color) = self.color {
            text.color = color;
        }
        if let Some(opacity) = self.opacity {
            text.opacity = opacity;
        }

        if self.no_image {
            config.watermark.image = None;
        }
        if let Some(path) = &self.image {
            config.watermark.image = Some(ImageWatermark::new(path));
        }
        match &mut config.watermark.image {
            Some(image) => {
                if let Some(scale) = self.scale {
                    image.scale = scale;
                }
                if let Some(opacity) = self.image_opacity {
                    image.opacity = opacity;
                }
            }
            None if self.scale.is_some() || self.image_opacity.is_some() => {
                warn!("--scale and --image-opacity only apply to image watermarks");
            }
            None => {}
        }

        let placement = &mut config.placement;
        if let Some(anchor) = self.anchor {
            placement.anchor = anchor;
        }
        if self.x.is_some() || self.y.is_some() {
            placement.anchor = Anchor::Custom;
            placement.custom_x = self.x.unwrap_or(placement.custom_x);
            placement.custom_y = self.y.unwrap_or(placement.custom_y);
        }
        if let Some(rotation) = self.rotation {
            placement.rotation_degrees = rotation;
        }
    }
}

impl ExportArgs {
    pub fn apply_to(&self, spec: &mut ExportSpec) {
        if let Some(format) = self.format {
            spec.format = format;
        }
        if let Some(quality) = self.quality {
            spec.jpeg_quality = quality;
        }
        if let Some(naming) = self.naming {
            spec.naming = naming;
        }
        if let Some(prefix) = &self.prefix {
            spec.prefix = prefix.clone();
        }
        if let Some(suffix) = &self.suffix {
            spec.suffix = suffix.clone();
        }
        if let Some(percent) = self.resize_percent {
            spec.resize = Some(ResizeSpec::Percent(percent));
        }
        if let (Some(width), Some(height)) = (self.fit_width, self.fit_height) {
            spec.resize = Some(ResizeSpec::Fit { width, height });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{NamingPolicy, PlacementSpec, Rgb, TextWatermark, WatermarkSettings};
    use image::Rgb as Pixel;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn flags_override_text_and_placement() {
        let mut config = RenderConfig::default();
        let args = WatermarkArgs {
            text: Some("© me".into()),
            size: Some(40.0),
            bold: true,
            color: Some(Rgb::WHITE),
            opacity: Some(60.0),
            x: Some(-5),
            rotation: Some(45.0),
            ..WatermarkArgs::default()
        };
        args.apply_to(&mut config);

        let text = &config.watermark.text;
        assert_eq!(text.content, "© me");
        assert_eq!(text.size, 40.0);
        assert!(text.style.is_bold() && !text.style.is_italic());
        assert_eq!(text.color, Rgb::WHITE);
        assert_eq!(text.opacity, 60.0);
        assert_eq!(config.placement.anchor, Anchor::Custom);
        assert_eq!(config.placement.custom_x, -5);
        assert_eq!(config.placement.rotation_degrees, 45.0);
    }

    #[test]
    fn image_flags_and_no_image() {
        let mut config = RenderConfig {
            watermark: WatermarkSettings {
                text: TextWatermark::new("kept"),
                image: Some(ImageWatermark::new("logo.png")),
            },
            placement: PlacementSpec::at(Anchor::TopLeft),
        };
        let args = WatermarkArgs {
            scale: Some(50.0),
            image_opacity: Some(25.0),
            ..WatermarkArgs::default()
        };
        args.apply_to(&mut config);
        let image = config.watermark.image.as_ref().unwrap();
        assert_eq!((image.scale, image.opacity), (50.0, 25.0));
        assert_eq!(config.placement.anchor, Anchor::TopLeft);

        let drop = WatermarkArgs {
            no_image: true,
            ..WatermarkArgs::default()
        };
        drop.apply_to(&mut config);
        assert!(config.watermark.image.is_none());
        assert_eq!(config.watermark.text.content, "kept");
    }

    #[test]
    fn export_flags_override_spec() {
        let mut spec = ExportSpec::default();
        ExportArgs {
            format: Some(ExportFormat::Jpeg),
            quality: Some(70),
            naming: Some(NamingPolicy::Prefix),
            prefix: Some("wm_".into()),
            fit_width: Some(800),
            fit_height: Some(600),
            ..ExportArgs::default()
        }
        .apply_to(&mut spec);

        assert_eq!(spec.format, ExportFormat::Jpeg);
        assert_eq!(spec.jpeg_quality, 70);
        assert_eq!(spec.naming, NamingPolicy::Prefix);
        assert_eq!(spec.prefix, "wm_");
        assert_eq!(
            spec.resize,
            Some(ResizeSpec::Fit {
                width: 800,
                height: 600
            })
        );
    }

    #[test]
    fn base_config_reads_named_template_and_last_used() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        let render = RenderConfig {
            placement: PlacementSpec::at(Anchor::BottomLeft),
            ..RenderConfig::default()
        };
        store
            .save(&Template::new("mine", render.clone(), ExportSpec::default()))
            .unwrap();

        let named = WatermarkArgs {
            template: Some("mine".into()),
            ..WatermarkArgs::default()
        };
        assert_eq!(base_config(Some(&store), &named).unwrap().0, render);

        let missing = WatermarkArgs {
            template: Some("other".into()),
            ..WatermarkArgs::default()
        };
        assert!(base_config(Some(&store), &missing).is_err());

        let last = WatermarkArgs {
            last: true,
            ..WatermarkArgs::default()
        };
        assert_eq!(
            base_config(Some(&store), &last).unwrap().0,
            RenderConfig::default()
        );
        store
            .save_last_used(render.clone(), ExportSpec::default())
            .unwrap();
        assert_eq!(base_config(Some(&store), &last).unwrap().0, render);
    }

    #[test]
    fn apply_exports_folder_and_remembers_configuration() {
        let dir = tempdir().unwrap();
        let inputs = dir.path().join("in");
        std::fs::create_dir_all(&inputs).unwrap();
        for name in ["one.png", "two.jpg"] {
            image::RgbImage::from_pixel(24, 16, Pixel([200, 200, 200]))
                .save(inputs.join(name))
                .unwrap();
        }
        let logo = dir.path().join("logo.png");
        image::RgbImage::from_pixel(4, 4, Pixel([255, 0, 0]))
            .save(&logo)
            .unwrap();
        let out = dir.path().join("out");
        let config_dir = dir.path().join("config");

        let args = ApplyArgs {
            inputs: vec![inputs],
            output: out.clone(),
            watermark: WatermarkArgs {
                image: Some(logo),
                anchor: Some(Anchor::BottomRight),
                ..WatermarkArgs::default()
            },
            export: ExportArgs {
                naming: Some(NamingPolicy::Suffix),
                ..ExportArgs::default()
            },
            save_template: Some("logo corner".into()),
        };
        apply(args, Some(&config_dir)).unwrap();

        let mut written: Vec<PathBuf> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        written.sort();
        assert_eq!(
            written,
            vec![out.join("one_watermarked.png"), out.join("two_watermarked.png")]
        );

        let store = TemplateStore::open(&config_dir).unwrap();
        assert_eq!(store.list().unwrap(), vec!["logo corner"]);
        let last = store.load_last_used().unwrap();
        assert_eq!(last.render.placement.anchor, Anchor::BottomRight);
    }
}
