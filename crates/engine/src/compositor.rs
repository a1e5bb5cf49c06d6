//! Watermark compositing.
//!
//! Every render starts from a private copy of the source pixels. The
//! watermark is first rasterised into its own layer, placed with
//! [`resolve_position`] by its content box, then blended source-over onto
//! the copy, either directly or through an inverse rotation about the box
//! centre.
//!
//! A layer does not depend on the source, so a batch prepares it once with
//! [`Compositor::prepare`] and reuses it for every image.

use ab_glyph::{point, Font, GlyphId, OutlinedGlyph, PxScale, Rect, ScaleFont};
use core_types::{
    ImageWatermark, PlacementSpec, RenderConfig, Rgb, TextWatermark, WatermarkSpec,
    EDGE_PADDING_PX,
};
use image::imageops::{self, FilterType};
use image::{ImageReader, Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::font::{resolve, CoverageMode, FontRegistry, FontRequest, SystemFontRegistry};
use crate::placement::resolve_position;
use crate::{decode_limited, EngineError, Result, SourceImage, MAX_SOURCE_DIMENSION};

/// Longest side of a rasterised watermark layer.
pub const MAX_LAYER_DIMENSION: u32 = MAX_SOURCE_DIMENSION;
/// Pixel budget of one watermark layer (256 MiB of RGBA).
pub const MAX_LAYER_PIXELS: u64 = 64 * 1024 * 1024;

/// Measured extent of a single line of text at a resolved font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: u32,
    pub height: u32,
    pub ascent: f32,
    pub descent: f32,
}

struct TextLayout {
    outlines: Vec<OutlinedGlyph>,
    metrics: TextMetrics,
    /// Union of the advance box and every glyph's pixel bounds.
    ink: Rect,
}

impl TextLayout {
    /// Whole-pixel buffer covering all ink, as (left, top, width, height)
    /// relative to the advance box.
    fn buffer(&self) -> (f64, f64, f64, f64) {
        let left = f64::from(self.ink.min.x).floor();
        let top = f64::from(self.ink.min.y).floor();
        let right = f64::from(self.ink.max.x).ceil();
        let bottom = f64::from(self.ink.max.y).ceil();
        (left, top, right - left, bottom - top)
    }
}

/// Straight-alpha pixels plus where they sit relative to the content box.
#[derive(Debug)]
struct Layer {
    pixels: RgbaImage,
    /// Box used for placement and as the rotation pivot.
    box_size: (u32, u32),
    /// Offset of `pixels` inside the box; negative where glyphs overhang.
    origin: (i64, i64),
    /// Blend strength in 0..=1.
    opacity: f32,
}

impl Layer {
    fn unpadded(pixels: RgbaImage, opacity: f32) -> Self {
        Self {
            box_size: pixels.dimensions(),
            pixels,
            origin: (0, 0),
            opacity,
        }
    }
}

/// A validated watermark with its layer already rasterised or decoded.
/// Cheap to share between threads rendering different sources.
#[derive(Debug)]
pub struct PreparedWatermark {
    layer: Option<Layer>,
}

impl PreparedWatermark {
    /// Renders leave the source untouched.
    pub fn none() -> Self {
        Self { layer: None }
    }

    pub fn is_empty(&self) -> bool {
        self.layer.is_none()
    }

    /// Content box size used for placement.
    pub fn box_size(&self) -> Option<(u32, u32)> {
        self.layer.as_ref().map(|layer| layer.box_size)
    }
}

pub struct Compositor<R = SystemFontRegistry> {
    registry: R,
    coverage: CoverageMode,
}

impl<R> Compositor<R>
where
    R: FontRegistry,
    R::Face: Font,
{
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            coverage: CoverageMode::default(),
        }
    }

    pub fn with_coverage(mut self, coverage: CoverageMode) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Applies the image-over-text precedence; with nothing configured the
    /// result is an unmodified copy of the source.
    pub fn render_config(&self, source: &SourceImage, config: &RenderConfig) -> Result<RgbaImage> {
        let prepared = self.prepare_config(config)?;
        self.render_prepared(source, &prepared, &config.placement)
    }

    /// Draws `spec` onto a new buffer. `source` is never modified.
    pub fn render(
        &self,
        source: &SourceImage,
        spec: &WatermarkSpec,
        placement: &PlacementSpec,
    ) -> Result<RgbaImage> {
        let prepared = self.prepare(spec)?;
        self.render_prepared(source, &prepared, placement)
    }

    pub fn prepare_config(&self, config: &RenderConfig) -> Result<PreparedWatermark> {
        match config.watermark.active() {
            Some(spec) => self.prepare(&spec),
            None => Ok(PreparedWatermark::none()),
        }
    }

    /// Validates `spec` and builds its layer. Fails when an image watermark
    /// cannot be decoded or would exceed the layer limits; text too large
    /// for the limits is drawn smaller instead.
    pub fn prepare(&self, spec: &WatermarkSpec) -> Result<PreparedWatermark> {
        spec.validate()?;
        if spec.opacity() <= 0.0 {
            return Ok(PreparedWatermark::none());
        }
        let layer = match spec {
            WatermarkSpec::Text(text) => self.text_layer(text),
            WatermarkSpec::Image(image) => image_layer(image)?,
        };
        Ok(PreparedWatermark { layer })
    }

    pub fn render_prepared(
        &self,
        source: &SourceImage,
        watermark: &PreparedWatermark,
        placement: &PlacementSpec,
    ) -> Result<RgbaImage> {
        placement.validate()?;
        let mut canvas = source.pixels().clone();
        let Some(layer) = &watermark.layer else {
            return Ok(canvas);
        };

        let (w, h) = layer.box_size;
        let (x, y) = resolve_position(
            placement.anchor,
            placement.custom_x,
            placement.custom_y,
            i64::from(w),
            i64::from(h),
            i64::from(canvas.width()),
            i64::from(canvas.height()),
            EDGE_PADDING_PX,
        );
        let rotation = placement.clamped_rotation();
        debug!(
            origin = %source.origin(),
            anchor = %placement.anchor,
            x,
            y,
            width = w,
            height = h,
            rotation,
            "compositing watermark"
        );

        if rotation == 0.0 {
            composite_direct(&mut canvas, layer, x, y);
        } else {
            composite_rotated(&mut canvas, layer, x, y, rotation);
        }
        Ok(canvas)
    }

    /// `None` when no font is available at all.
    pub fn measure_text(&self, text: &TextWatermark) -> Option<TextMetrics> {
        let font = self.resolve_font(text)?;
        Some(layout_text(&font.face, font.size_px, &text.content).metrics)
    }

    fn resolve_font(&self, text: &TextWatermark) -> Option<crate::font::ResolvedFont<R::Face>> {
        let request = FontRequest {
            family: &text.font_family,
            style: text.style,
            size_px: text.size,
            coverage: self.coverage,
        };
        resolve(&self.registry, &request, &text.content)
    }

    fn text_layer(&self, text: &TextWatermark) -> Option<Layer> {
        if text.content.is_empty() {
            return None;
        }
        let Some(font) = self.resolve_font(text) else {
            warn!(text = %text.content, "no font available, skipping text watermark");
            return None;
        };

        let mut layout = layout_text(&font.face, font.size_px, &text.content);
        let (_, _, w, h) = layout.buffer();
        let factor = layer_fit_factor(w, h);
        if factor < 1.0 {
            // 0.98 leaves room for rounding the shrunk ink out to whole pixels.
            let size_px = font.size_px * (factor * 0.98) as f32;
            warn!(
                requested = font.size_px,
                size_px, "text watermark exceeds the layer limit, drawing it smaller"
            );
            if size_px.is_nan() || size_px < 1.0 {
                return None;
            }
            layout = layout_text(&font.face, size_px, &text.content);
        }

        let (left, top, w, h) = layout.buffer();
        if layout.metrics.width == 0 || layout.metrics.height == 0 || layer_fit_factor(w, h) < 1.0
        {
            return None;
        }
        let origin = (left as i64, top as i64);
        let alpha = (255.0 * text.opacity / 100.0).round();
        Some(Layer {
            pixels: rasterize_text(&layout, origin, (w as u32, h as u32), text.color),
            box_size: (layout.metrics.width, layout.metrics.height),
            origin,
            opacity: alpha / 255.0,
        })
    }
}

/// Uniform scale that brings a `width` x `height` layer within
/// [`MAX_LAYER_DIMENSION`] and [`MAX_LAYER_PIXELS`]; 1.0 when it fits.
fn layer_fit_factor(width: f64, height: f64) -> f64 {
    if !(width.is_finite() && height.is_finite()) {
        return 0.0;
    }
    let max_side = f64::from(MAX_LAYER_DIMENSION);
    let budget = MAX_LAYER_PIXELS as f64;
    let mut factor = 1.0f64;
    if width > max_side || height > max_side {
        factor = factor.min(max_side / width.max(height));
    }
    if width * height > budget {
        factor = factor.min((budget / (width * height)).sqrt());
    }
    factor
}

fn image_layer(image: &ImageWatermark) -> Result<Option<Layer>> {
    let path = &image.source_path;
    let reader = ImageReader::open(path)
        .map_err(|e| EngineError::decode(path.display(), e))?
        .with_guessed_format()
        .map_err(|e| EngineError::decode(path.display(), e))?;
    let decoded = decode_limited(reader, &path.display())?;

    let factor = f64::from(image.scale) / 100.0;
    let w = (f64::from(decoded.width()) * factor).floor();
    let h = (f64::from(decoded.height()) * factor).floor();
    if w < 1.0 || h < 1.0 {
        return Ok(None);
    }
    if layer_fit_factor(w, h) < 1.0 {
        return Err(EngineError::WatermarkTooLarge {
            width: w as u64,
            height: h as u64,
        });
    }

    let (w, h) = (w as u32, h as u32);
    let pixels = if (w, h) == decoded.dimensions() {
        decoded
    } else {
        imageops::resize(&decoded, w, h, FilterType::Triangle)
    };
    Ok(Some(Layer::unpadded(pixels, image.opacity / 100.0)))
}

/// Single line, baseline at `ascent` inside a box of height ascent - descent.
fn layout_text<F: Font>(font: &F, size_px: f32, content: &str) -> TextLayout {
    let scale = PxScale::from(size_px);
    let scaled = font.as_scaled(scale);
    let ascent = scaled.ascent();
    let descent = scaled.descent();

    let mut caret = 0.0f32;
    let mut previous: Option<GlyphId> = None;
    let mut outlines = Vec::new();
    for ch in content.chars().filter(|c| !c.is_control()) {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, ascent));
        if let Some(outlined) = font.outline_glyph(glyph) {
            outlines.push(outlined);
        }
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let width = caret.max(0.0);
    let height = (ascent - descent).max(0.0);
    let mut ink = Rect {
        min: point(0.0, 0.0),
        max: point(width, height),
    };
    for outlined in &outlines {
        let bounds = outlined.px_bounds();
        ink.min.x = ink.min.x.min(bounds.min.x);
        ink.min.y = ink.min.y.min(bounds.min.y);
        ink.max.x = ink.max.x.max(bounds.max.x);
        ink.max.y = ink.max.y.max(bounds.max.y);
    }

    TextLayout {
        outlines,
        metrics: TextMetrics {
            width: width.ceil() as u32,
            height: height.ceil() as u32,
            ascent,
            descent,
        },
        ink,
    }
}

/// Draws every glyph into a `size` buffer whose top-left corner sits at
/// `origin` in advance-box coordinates.
fn rasterize_text(
    layout: &TextLayout,
    origin: (i64, i64),
    (width, height): (u32, u32),
    color: Rgb,
) -> RgbaImage {
    let mut layer = RgbaImage::from_pixel(width, height, Rgba([color.r, color.g, color.b, 0]));
    for outlined in &layout.outlines {
        let bounds = outlined.px_bounds();
        let left = bounds.min.x as i64 - origin.0;
        let top = bounds.min.y as i64 - origin.1;
        outlined.draw(|gx, gy, coverage| {
            let px = left + i64::from(gx);
            let py = top + i64::from(gy);
            if px < 0 || py < 0 || px >= i64::from(width) || py >= i64::from(height) {
                return;
            }
            let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            let pixel = layer.get_pixel_mut(px as u32, py as u32);
            pixel[3] = pixel[3].max(alpha);
        });
    }
    layer
}

/// Source-over with straight alpha. `src` is RGB in 0..=255 and alpha in 0..=1.
fn blend_pixel(dst: &mut Rgba<u8>, src: [f32; 4], opacity: f32) {
    let sa = src[3] * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let value = (src[c] * sa + f32::from(dst[c]) * da * (1.0 - sa)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

fn straight(pixel: &Rgba<u8>) -> [f32; 4] {
    [
        f32::from(pixel[0]),
        f32::from(pixel[1]),
        f32::from(pixel[2]),
        f32::from(pixel[3]) / 255.0,
    ]
}

/// Blends only the part of the layer that overlaps the canvas.
fn composite_direct(canvas: &mut RgbaImage, layer: &Layer, x: i64, y: i64) {
    let left = x + layer.origin.0;
    let top = y + layer.origin.1;
    let x0 = left.max(0);
    let y0 = top.max(0);
    let x1 = (left + i64::from(layer.pixels.width())).min(i64::from(canvas.width()));
    let y1 = (top + i64::from(layer.pixels.height())).min(i64::from(canvas.height()));

    for cy in y0..y1 {
        for cx in x0..x1 {
            let pixel = layer.pixels.get_pixel((cx - left) as u32, (cy - top) as u32);
            blend_pixel(
                canvas.get_pixel_mut(cx as u32, cy as u32),
                straight(pixel),
                layer.opacity,
            );
        }
    }
}

/// Rotates the layer clockwise by `degrees` about the centre of its content
/// box at (x, y). Canvas pixels are inverse-mapped into the layer and
/// sampled bilinearly.
fn composite_rotated(canvas: &mut RgbaImage, layer: &Layer, x: i64, y: i64, degrees: f32) {
    let (w, h) = (f64::from(layer.box_size.0), f64::from(layer.box_size.1));
    let (ox, oy) = (layer.origin.0 as f64, layer.origin.1 as f64);
    let (pw, ph) = (
        f64::from(layer.pixels.width()),
        f64::from(layer.pixels.height()),
    );
    let cx = x as f64 + w / 2.0;
    let cy = y as f64 + h / 2.0;
    let (sin, cos) = f64::from(degrees).to_radians().sin_cos();

    let (left, top) = (ox - w / 2.0, oy - h / 2.0);
    let corners = [
        (left, top),
        (left + pw, top),
        (left + pw, top + ph),
        (left, top + ph),
    ];
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for (dx, dy) in corners {
        let rx = cos * dx - sin * dy;
        let ry = sin * dx + cos * dy;
        min_x = min_x.min(rx);
        max_x = max_x.max(rx);
        min_y = min_y.min(ry);
        max_y = max_y.max(ry);
    }

    let x0 = ((cx + min_x).floor() as i64).max(0);
    let y0 = ((cy + min_y).floor() as i64).max(0);
    let x1 = ((cx + max_x).ceil() as i64).min(i64::from(canvas.width()));
    let y1 = ((cy + max_y).ceil() as i64).min(i64::from(canvas.height()));

    for py in y0..y1 {
        for px in x0..x1 {
            let ux = px as f64 + 0.5 - cx;
            let uy = py as f64 + 0.5 - cy;
            let lx = cos * ux + sin * uy + w / 2.0 - ox;
            let ly = -sin * ux + cos * uy + h / 2.0 - oy;
            if let Some(sample) = sample_bilinear(&layer.pixels, lx - 0.5, ly - 0.5) {
                blend_pixel(
                    canvas.get_pixel_mut(px as u32, py as u32),
                    sample,
                    layer.opacity,
                );
            }
        }
    }
}

/// Samples at continuous pixel coordinates, transparent outside the layer.
/// Interpolates premultiplied values so edges do not pick up dark fringes.
fn sample_bilinear(layer: &RgbaImage, x: f64, y: f64) -> Option<[f32; 4]> {
    let (w, h) = (i64::from(layer.width()), i64::from(layer.height()));
    if x <= -1.0 || y <= -1.0 || x >= w as f64 || y >= h as f64 {
        return None;
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let fetch = |ix: i64, iy: i64| -> [f32; 4] {
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 4];
        }
        let [r, g, b, a] = straight(layer.get_pixel(ix as u32, iy as u32));
        [r * a, g * a, b * a, a]
    };

    let taps = [
        (fetch(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (fetch(x0 + 1, y0), fx * (1.0 - fy)),
        (fetch(x0, y0 + 1), (1.0 - fx) * fy),
        (fetch(x0 + 1, y0 + 1), fx * fy),
    ];
    let mut acc = [0.0f32; 4];
    for (value, weight) in taps {
        for c in 0..4 {
            acc[c] += value[c] * weight;
        }
    }

    let alpha = acc[3].min(1.0);
    if alpha <= 0.0 {
        return None;
    }
    Some([acc[0] / acc[3], acc[1] / acc[3], acc[2] / acc[3], alpha])
}
