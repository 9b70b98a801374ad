#![forbid(unsafe_code)]

//! Palette reduction by pairwise nearest-neighbor clustering.
//!
//! Pixels are binned into coarse color cells, the cells are merged greedily by the
//! smallest increase in squared error until the requested number of colors remains, and
//! the image is then remapped onto the resulting palette, optionally with serpentine
//! error diffusion.

extern crate alloc;

pub mod bins;
pub mod classify;
pub mod dither;
pub mod error;
pub mod heap;
pub mod histogram;
pub mod image;
pub mod palette;
pub mod pnn;
pub mod remap;

pub use classify::Matching;
pub use error::QuantizeError;
pub use image::{PixelBuffer, PixelSource, ScannedImage};
pub use palette::Palette;

use alloc::vec::Vec;

use crate::bins::BinArena;
use crate::classify::Classifier;
use crate::pnn::ClusterReducer;

/// Smallest supported palette.
pub const MIN_COLORS: u32 = 2;
/// Largest supported palette; indices must fit in `u16`.
pub const MAX_COLORS: u32 = 65536;

/// Configuration for palette quantization.
#[derive(Debug, Clone)]
pub struct QuantizeConfig {
    /// Maximum number of palette colors (2..=65536).
    pub max_colors: u32,
    /// Serpentine error diffusion during remapping.
    pub dither: bool,
    /// How pixels are matched to palette entries.
    pub matching: Matching,
    /// Seed for the approximate matcher's random choices.
    pub seed: u64,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            max_colors: 256,
            dither: true,
            matching: Matching::Auto,
            seed: 0,
        }
    }
}

impl QuantizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_colors(mut self, n: u32) -> Self {
        self.max_colors = n;
        self
    }

    pub fn dither(mut self, enabled: bool) -> Self {
        self.dither = enabled;
        self
    }

    pub fn matching(mut self, matching: Matching) -> Self {
        self.matching = matching;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Clamp a requested color count into the supported range.
    pub fn clamped_max_colors(n: u32) -> u32 {
        n.clamp(MIN_COLORS, MAX_COLORS)
    }

    /// Population counts are square-rooted for large palettes.
    fn sqrt_weights(&self) -> bool {
        self.max_colors > 255
    }
}

/// Quantization result.
#[derive(Debug)]
pub struct QuantizeResult {
    palette: Palette,
    indices: Vec<u16>,
}

impl QuantizeResult {
    pub fn palette(&self) -> &[rgb::RGBA8] {
        self.palette.entries()
    }

    /// Get the palette index for each pixel, row-major.
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Get the transparent palette index, if any. Always 0 when present.
    pub fn transparent_index(&self) -> Option<u16> {
        self.palette.transparent_index()
    }

    /// Number of colors in the palette.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// Get the alpha table suitable for a PNG tRNS chunk.
    ///
    /// Returns `None` if all entries are fully opaque (no tRNS needed).
    pub fn alpha_table(&self) -> Option<Vec<u8>> {
        self.palette.alpha_table()
    }

    pub fn into_parts(self) -> (Palette, Vec<u16>) {
        (self.palette, self.indices)
    }
}

/// Quantize a row-major RGBA buffer.
pub fn quantize(
    pixels: &[rgb::RGBA8],
    width: usize,
    height: usize,
    config: &QuantizeConfig,
) -> Result<QuantizeResult, QuantizeError> {
    let buffer = PixelBuffer::new(pixels, width, height)?;
    quantize_source(&buffer, config)
}

/// Quantize any [`PixelSource`]. A failed pixel read fails the whole call.
pub fn quantize_source<S: PixelSource + ?Sized>(
    source: &S,
    config: &QuantizeConfig,
) -> Result<QuantizeResult, QuantizeError> {
    validate_config(config)?;
    let image = ScannedImage::scan(source)?;

    let palette = build_palette(&image, config);

    let strategy = config
        .matching
        .resolve(config.max_colors, image.transparent().is_some());
    let mut classifier = Classifier::new(&palette, strategy, config.seed);
    let indices = if config.dither {
        dither::dither_image(&image, &mut classifier)
    } else {
        remap::remap_pixels(&image, &mut classifier)
    };
    log::debug!(
        "quantize: {}x{} -> {} colors, {} distinct colors classified",
        image.width(),
        image.height(),
        palette.len(),
        classifier.cached()
    );
    drop(classifier);

    Ok(QuantizeResult { palette, indices })
}

/// Produce the palette for a scanned image: the image's own colors when few enough,
/// otherwise the survivors of pairwise nearest-neighbor reduction over coarse cells, or
/// over the exact colors when there are fewer cells than `max_colors`.
pub fn build_palette(image: &ScannedImage, config: &QuantizeConfig) -> Palette {
    let max_colors = config.max_colors as usize;
    let transparent = image.transparent_color();

    if let Some(colors) = histogram::detect_exact_palette(image, max_colors) {
        log::debug!("palette: image has {} distinct colors, using them directly", colors.len());
        return Palette::from_entries(colors, transparent);
    }

    let hist = histogram::build_histogram(image);
    let mut arena = BinArena::compact(&hist, config.sqrt_weights());
    if arena.active_count() < max_colors {
        // Too few cells for the target: reduce the exact colors instead.
        if let Some(colors) = histogram::distinct_colors(image, histogram::CELL_COUNT) {
            log::debug!(
                "palette: {} cells for {} distinct colors, reducing exact colors",
                arena.active_count(),
                colors.len()
            );
            arena = BinArena::from_colors(
                &colors,
                hist.with_alpha(),
                config.sqrt_weights(),
                transparent,
            );
        }
    }
    let arena = ClusterReducer::new(arena, max_colors).run();
    Palette::from_active_bins(&arena, transparent)
}

fn validate_config(config: &QuantizeConfig) -> Result<(), QuantizeError> {
    if !(MIN_COLORS..=MAX_COLORS).contains(&config.max_colors) {
        return Err(QuantizeError::InvalidMaxColors(config.max_colors));
    }
    Ok(())
}
