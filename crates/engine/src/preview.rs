//! Latest-wins preview rendering.
//!
//! A driver asks for a [`PreviewTicket`] whenever the configuration changes
//! and renders with it, possibly on another thread. Only the most recent
//! ticket's result is handed back; older renders are dropped.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use ab_glyph::Font;
use core_types::{PreviewImage, RenderConfig};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::debug;

use crate::compositor::Compositor;
use crate::font::FontRegistry;
use crate::{Result, SourceImage};

/// Used when the display area has no size yet.
pub const DEFAULT_PREVIEW_BOX: (u32, u32) = (400, 300);
pub const MIN_PREVIEW_SCALE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PreviewTicket(u64);

#[derive(Debug, Clone, Default)]
pub struct PreviewScheduler {
    latest: Arc<AtomicU64>,
}

impl PreviewScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersedes every ticket handed out before.
    pub fn request(&self) -> PreviewTicket {
        PreviewTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: PreviewTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Renders `config` over the untouched `source` and fits the result into
    /// `max_width` x `max_height`. `Ok(None)` means a newer request arrived
    /// and this result should be discarded.
    pub fn render<R>(
        &self,
        ticket: PreviewTicket,
        compositor: &Compositor<R>,
        source: &SourceImage,
        config: &RenderConfig,
        max_width: u32,
        max_height: u32,
    ) -> Result<Option<PreviewImage>>
    where
        R: FontRegistry,
        R::Face: Font,
    {
        if !self.is_current(ticket) {
            debug!(?ticket, "preview superseded before render");
            return Ok(None);
        }
        let composited = compositor.render_config(source, config)?;
        if !self.is_current(ticket) {
            debug!(?ticket, "preview superseded during render");
            return Ok(None);
        }

        let fitted = fit_preview(&composited, max_width, max_height);
        let (width, height) = fitted.dimensions();
        Ok(Some(PreviewImage {
            width,
            height,
            data: fitted.into_raw(),
        }))
    }
}

/// Scales to fit the box, never below [`MIN_PREVIEW_SCALE`]. Small images
/// are enlarged to fill the box.
pub fn fit_preview(image: &RgbaImage, max_width: u32, max_height: u32) -> RgbaImage {
    let (max_width, max_height) = if max_width == 0 || max_height == 0 {
        DEFAULT_PREVIEW_BOX
    } else {
        (max_width, max_height)
    };
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let scale = (f64::from(max_width) / f64::from(w))
        .min(f64::from(max_height) / f64::from(h))
        .max(MIN_PREVIEW_SCALE);
    let target_w = ((f64::from(w) * scale) as u32).max(1);
    let target_h = ((f64::from(h) * scale) as u32).max(1);
    if (target_w, target_h) == (w, h) {
        return image.clone();
    }
    imageops::resize(image, target_w, target_h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::SystemFontRegistry;
    use crate::SourceOrigin;
    use image::Rgba;

    fn source(w: u32, h: u32) -> SourceImage {
        SourceImage::from_rgba(
            SourceOrigin::Buffer("preview".into()),
            RgbaImage::from_pixel(w, h, Rgba([9, 9, 9, 255])),
        )
    }

    #[test]
    fn newer_request_supersedes_older_ticket() {
        let scheduler = PreviewScheduler::new();
        let first = scheduler.request();
        assert!(scheduler.is_current(first));
        let second = scheduler.request();
        assert!(!scheduler.is_current(first));
        assert!(scheduler.is_current(second));
        assert!(second > first);
    }

    #[test]
    fn stale_ticket_renders_nothing() {
        let scheduler = PreviewScheduler::new();
        let compositor = Compositor::new(SystemFontRegistry::empty());
        let stale = scheduler.request();
        let fresh = scheduler.request();
        let src = source(100, 50);

        let none = scheduler
            .render(stale, &compositor, &src, &RenderConfig::default(), 50, 50)
            .unwrap();
        assert!(none.is_none());

        let preview = scheduler
            .render(fresh, &compositor, &src, &RenderConfig::default(), 50, 50)
            .unwrap()
            .expect("current ticket renders");
        assert_eq!((preview.width, preview.height), (50, 25));
        assert_eq!(preview.data.len(), 50 * 25 * 4);
    }

    #[test]
    fn clones_share_the_ticket_counter() {
        let scheduler = PreviewScheduler::new();
        let worker_side = scheduler.clone();
        let ticket = worker_side.request();
        assert!(scheduler.is_current(ticket));
        scheduler.request();
        assert!(!worker_side.is_current(ticket));
    }

    #[test]
    fn fit_uses_default_box_and_minimum_scale() {
        let img = RgbaImage::new(800, 600);
        assert_eq!(fit_preview(&img, 0, 0).dimensions(), (400, 300));

        let huge = RgbaImage::new(2000, 100);
        assert_eq!(fit_preview(&huge, 10, 10).dimensions(), (200, 10));

        let small = RgbaImage::new(10, 10);
        assert_eq!(fit_preview(&small, 40, 20).dimensions(), (20, 20));
    }
}
