extern crate alloc;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::image::ScannedImage;

/// Number of addressable cells in every truncation scheme.
pub const CELL_COUNT: usize = 1 << 16;

/// How a color is truncated to a coarse cell index.
///
/// Opaque images spend all 16 bits on color; images with alpha trade color
/// precision for alpha levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellScheme {
    /// 5-6-5 bits of red, green, blue.
    Rgb565,
    /// One alpha bit plus 5-5-5 color. Used when the only non-opaque pixels are fully transparent.
    Argb1555,
    /// 4 bits per channel including alpha. Used when partial alpha is present.
    Argb4444,
}

impl CellScheme {
    pub fn for_image(image: &ScannedImage) -> Self {
        if image.has_partial_alpha() {
            Self::Argb4444
        } else if image.has_alpha() {
            Self::Argb1555
        } else {
            Self::Rgb565
        }
    }

    /// Cell index of a color under this scheme. Always below [`CELL_COUNT`].
    pub fn cell_index(self, c: RGBA8) -> usize {
        let (a, r, g, b) = (c.a as usize, c.r as usize, c.g as usize, c.b as usize);
        match self {
            Self::Rgb565 => (r & 0xF8) << 8 | (g & 0xFC) << 3 | b >> 3,
            Self::Argb1555 => (a & 0x80) << 8 | (r & 0xF8) << 7 | (g & 0xF8) << 2 | b >> 3,
            Self::Argb4444 => (a & 0xF0) << 8 | (r & 0xF0) << 4 | (g & 0xF0) | b >> 4,
        }
    }
}

/// Accumulated channel sums and pixel count for one cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellAccumulator {
    pub a_sum: f64,
    pub r_sum: f64,
    pub g_sum: f64,
    pub b_sum: f64,
    pub count: u32,
}

impl CellAccumulator {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Dense cell table: one accumulator per addressable cell.
#[derive(Debug, Clone)]
pub struct Histogram {
    cells: Vec<CellAccumulator>,
    scheme: CellScheme,
    with_alpha: bool,
    transparent_cell: Option<usize>,
}

impl Histogram {
    pub fn cells(&self) -> &[CellAccumulator] {
        &self.cells
    }

    pub fn scheme(&self) -> CellScheme {
        self.scheme
    }

    /// Whether alpha sums were accumulated.
    pub fn with_alpha(&self) -> bool {
        self.with_alpha
    }

    /// Cell holding the (normalized) fully transparent pixels, if any.
    pub fn transparent_cell(&self) -> Option<usize> {
        self.transparent_cell
    }

    /// Number of non-empty cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }
}

/// Accumulate every pixel of the image into its coarse cell.
pub fn build_histogram(image: &ScannedImage) -> Histogram {
    let scheme = CellScheme::for_image(image);
    let with_alpha = image.has_alpha();
    let mut cells = vec![CellAccumulator::default(); CELL_COUNT];

    for &px in image.pixels() {
        let c = image.normalized(px);
        let cell = &mut cells[scheme.cell_index(c)];
        if with_alpha {
            cell.a_sum += c.a as f64;
        }
        cell.r_sum += c.r as f64;
        cell.g_sum += c.g as f64;
        cell.b_sum += c.b as f64;
        cell.count += 1;
    }

    let transparent_cell = image.transparent_color().map(|c| scheme.cell_index(c));

    log::debug!(
        "histogram: {:?}, {} occupied cells from {} pixels",
        scheme,
        cells.iter().filter(|c| !c.is_empty()).count(),
        image.pixels().len()
    );

    Histogram {
        cells,
        scheme,
        with_alpha,
        transparent_cell,
    }
}

/// The image's distinct colors in first-seen order, transparent color first, or `None`
/// as soon as more than `max_colors` of them turn up.
pub(crate) fn detect_exact_palette(image: &ScannedImage, max_colors: usize) -> Option<Vec<RGBA8>> {
    let mut seen: BTreeMap<u32, usize> = BTreeMap::new();
    let mut colors = Vec::new();

    if let Some(t) = image.transparent_color() {
        seen.insert(pack_argb(t), 0);
        colors.push(t);
    }

    for &px in image.pixels() {
        let c = image.normalized(px);
        let key = pack_argb(c);
        if seen.contains_key(&key) {
            continue;
        }
        seen.insert(key, colors.len());
        colors.push(c);
        if colors.len() > max_colors {
            return None;
        }
    }
    Some(colors)
}

/// Every distinct (normalized) color with its pixel count, ordered by packed ARGB value,
/// or `None` once more than `limit` distinct colors turn up.
pub(crate) fn distinct_colors(image: &ScannedImage, limit: usize) -> Option<Vec<(RGBA8, u32)>> {
    let mut counts: BTreeMap<u32, (RGBA8, u32)> = BTreeMap::new();
    for &px in image.pixels() {
        let c = image.normalized(px);
        counts.entry(pack_argb(c)).or_insert((c, 0)).1 += 1;
        if counts.len() > limit {
            return None;
        }
    }
    Some(counts.into_values().collect())
}

/// Pack a color into a single `0xAARRGGBB` key.
pub(crate) fn pack_argb(c: RGBA8) -> u32 {
    (c.a as u32) << 24 | (c.r as u32) << 16 | (c.g as u32) << 8 | c.b as u32
}
