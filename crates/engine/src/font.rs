//! Font selection with glyph-coverage fallback.
//!
//! A watermark asks for a family by name, but the text may contain CJK or
//! other glyphs that family lacks. [`resolve`] walks the requested family,
//! then a fixed list of widely installed CJK-capable families, then a
//! generic sans-serif face, and returns the first one whose glyph table
//! covers the text.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

use ab_glyph::{Font, FontArc, FontVec};
use core_types::FontStyle;
use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use tracing::{debug, warn};

pub const CJK_FALLBACK_FAMILIES: &[&str] = &[
    "Microsoft YaHei",
    "SimHei",
    "KaiTi",
    "SimSun",
    "FangSong",
    "YouYuan",
    "STHeiti",
    "STSong",
    "STKaiti",
    "STFangsong",
    "PingFang SC",
    "Hiragino Sans GB",
    "Source Han Sans CN",
    "Noto Sans CJK SC",
    "WenQuanYi Micro Hei",
    "WenQuanYi Zen Hei",
];

/// Tried in order when the generic sans-serif slot is requested and the
/// database has no configured sans-serif family installed.
const GENERIC_SANS_FAMILIES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Arial",
    "Helvetica",
    "Segoe UI",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FontFamily {
    Named(String),
    SansSerif,
}

impl FontFamily {
    pub fn name(&self) -> &str {
        match self {
            FontFamily::Named(name) => name,
            FontFamily::SansSerif => "sans-serif",
        }
    }
}

pub trait GlyphCoverage {
    fn has_glyph(&self, ch: char) -> bool;
}

impl GlyphCoverage for FontArc {
    fn has_glyph(&self, ch: char) -> bool {
        self.glyph_id(ch).0 != 0
    }
}

/// Source of renderable faces. Injected so resolution can be tested without
/// depending on what the host has installed.
pub trait FontRegistry: Send + Sync {
    type Face: GlyphCoverage + Clone;

    /// `None` when the family is not installed.
    fn load(&self, family: &FontFamily, style: FontStyle) -> Option<Self::Face>;

    fn families(&self) -> Vec<String>;
}

/// How much of the text a candidate must cover to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverageMode {
    /// Every distinct character needs a glyph.
    #[default]
    All,
    /// One covered character is enough. Kept for templates that relied on
    /// the lenient check.
    Any,
}

#[derive(Debug, Clone)]
pub struct FontRequest<'a> {
    pub family: &'a str,
    pub style: FontStyle,
    pub size_px: f32,
    pub coverage: CoverageMode,
}

#[derive(Debug, Clone)]
pub struct ResolvedFont<F> {
    pub family: FontFamily,
    pub face: F,
    pub style: FontStyle,
    pub size_px: f32,
}

pub fn candidates(requested: &str) -> Vec<FontFamily> {
    let mut out = Vec::with_capacity(CJK_FALLBACK_FAMILIES.len() + 2);
    let requested = requested.trim();
    if !requested.is_empty() {
        out.push(FontFamily::Named(requested.to_string()));
    }
    for name in CJK_FALLBACK_FAMILIES {
        if !requested.eq_ignore_ascii_case(name) {
            out.push(FontFamily::Named((*name).to_string()));
        }
    }
    out.push(FontFamily::SansSerif);
    out
}

/// Whitespace is ignored; text with nothing else is always covered.
pub fn covers<F: GlyphCoverage>(face: &F, text: &str, mode: CoverageMode) -> bool {
    let distinct: BTreeSet<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if distinct.is_empty() {
        return true;
    }
    match mode {
        CoverageMode::All => distinct.iter().all(|&c| face.has_glyph(c)),
        CoverageMode::Any => distinct.iter().any(|&c| face.has_glyph(c)),
    }
}

/// Picks the first candidate covering `required_text`, falling back to the
/// generic sans-serif face regardless of coverage. Only `None` when the
/// registry has no usable face at all.
pub fn resolve<R: FontRegistry>(
    registry: &R,
    request: &FontRequest<'_>,
    required_text: &str,
) -> Option<ResolvedFont<R::Face>> {
    for family in candidates(request.family) {
        let Some(face) = registry.load(&family, request.style) else {
            continue;
        };
        if covers(&face, required_text, request.coverage) {
            debug!(family = family.name(), requested = request.family, "resolved font");
            return Some(ResolvedFont {
                family,
                face,
                style: request.style,
                size_px: request.size_px,
            });
        }
    }

    let face = registry.load(&FontFamily::SansSerif, request.style);
    if face.is_none() {
        warn!(requested = request.family, "no font available in registry");
    }
    face.map(|face| ResolvedFont {
        family: FontFamily::SansSerif,
        face,
        style: request.style,
        size_px: request.size_px,
    })
}

/// Installed fonts, discovered through `fontdb` and parsed by `ab_glyph`.
/// Parsed faces are cached per family and style.
pub struct SystemFontRegistry {
    db: Database,
    cache: Mutex<HashMap<(FontFamily, FontStyle), Option<FontArc>>>,
}

impl SystemFontRegistry {
    pub fn new() -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        debug!(faces = db.len(), "loaded system fonts");
        Self::from_database(db)
    }

    /// A registry with no faces at all. Text watermarks render nothing.
    pub fn empty() -> Self {
        Self::from_database(Database::new())
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a font file or a directory of fonts on top of the system set.
    pub fn add_source(&mut self, path: &Path) -> std::io::Result<()> {
        if path.is_dir() {
            self.db.load_fonts_dir(path);
        } else {
            self.db.load_font_file(path)?;
        }
        self.cache.lock().expect("font cache poisoned").clear();
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    fn query(&self, family: &FontFamily, style: FontStyle) -> Option<fontdb::ID> {
        let weight = if style.is_bold() {
            Weight::BOLD
        } else {
            Weight::NORMAL
        };
        let slant = if style.is_italic() {
            Style::Italic
        } else {
            Style::Normal
        };
        let by_family = |family: Family<'_>| {
            self.db.query(&Query {
                families: &[family],
                weight,
                stretch: Stretch::Normal,
                style: slant,
            })
        };

        match family {
            FontFamily::Named(name) => by_family(Family::Name(name)),
            FontFamily::SansSerif => by_family(Family::SansSerif)
                .or_else(|| {
                    GENERIC_SANS_FAMILIES
                        .iter()
                        .find_map(|name| by_family(Family::Name(name)))
                })
                .or_else(|| self.db.faces().next().map(|face| face.id)),
        }
    }
}

impl Default for SystemFontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry for SystemFontRegistry {
    type Face = FontArc;

    fn load(&self, family: &FontFamily, style: FontStyle) -> Option<FontArc> {
        let key = (family.clone(), style);
        if let Some(cached) = self.cache.lock().expect("font cache poisoned").get(&key) {
            return cached.clone();
        }

        let face = self.query(family, style).and_then(|id| {
            self.db
                .with_face_data(id, |data, index| {
                    FontVec::try_from_vec_and_index(data.to_vec(), index).ok()
                })
                .flatten()
                .map(FontArc::new)
        });

        self.cache
            .lock()
            .expect("font cache poisoned")
            .insert(key, face.clone());
        face
    }

    fn families(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .db
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.clone()))
            .collect();
        names.into_iter().collect()
    }
}
