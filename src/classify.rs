use std::collections::HashMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rgb::RGBA8;

use crate::histogram::pack_argb;
use crate::palette::Palette;

/// How source colors are matched to palette entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Matching {
    /// Exact for small palettes or images with transparency, approximate otherwise.
    #[default]
    Auto,
    /// Always the true nearest entry by squared distance.
    Exact,
    /// Randomized pick between the two closest entries by absolute distance.
    Approximate,
}

/// Resolved strategy for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    Approximate,
}

impl Matching {
    pub fn resolve(self, max_colors: u32, has_transparent: bool) -> MatchStrategy {
        match self {
            Self::Exact => MatchStrategy::Exact,
            Self::Approximate => MatchStrategy::Approximate,
            Self::Auto if has_transparent || max_colors < 256 => MatchStrategy::Exact,
            Self::Auto => MatchStrategy::Approximate,
        }
    }
}

/// Index of the entry with the smallest squared ARGB distance to `color`.
///
/// Accumulation for a candidate stops as soon as it can no longer win. Ties keep the
/// lower index.
pub fn nearest_color_index(entries: &[RGBA8], color: RGBA8) -> u16 {
    let mut best = 0usize;
    let mut best_dist = u32::MAX;

    'candidates: for (i, e) in entries.iter().enumerate() {
        let mut dist = 0u32;
        for (x, y) in [(e.a, color.a), (e.r, color.r), (e.g, color.g), (e.b, color.b)] {
            dist += sqr_diff(x, y);
            if dist >= best_dist {
                continue 'candidates;
            }
        }
        best_dist = dist;
        best = i;
        if dist == 0 {
            break;
        }
    }
    best as u16
}

fn sqr_diff(x: u8, y: u8) -> u32 {
    let d = x.abs_diff(y) as u32;
    d * d
}

fn abs_dist(x: RGBA8, y: RGBA8) -> u32 {
    x.a.abs_diff(y.a) as u32
        + x.r.abs_diff(y.r) as u32
        + x.g.abs_diff(y.g) as u32
        + x.b.abs_diff(y.b) as u32
}

/// The two closest palette entries to a color by sum of absolute channel differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidates {
    pub best: u16,
    pub second: u16,
    pub best_dist: u32,
    /// `None` when the palette has a single entry.
    pub second_dist: Option<u32>,
}

impl Candidates {
    /// Pick one candidate. The closer one wins with probability roughly
    /// `second_dist / (best_dist + second_dist)`; exact matches and equal distances
    /// always resolve to `best`.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> u16 {
        let Some(second_dist) = self.second_dist else {
            return self.best;
        };
        if self.best_dist == 0 || self.best_dist == second_dist {
            return self.best;
        }
        if rng.random_range(0..self.best_dist + second_dist) <= second_dist {
            self.best
        } else {
            self.second
        }
    }
}

pub fn closest_candidates(entries: &[RGBA8], color: RGBA8) -> Candidates {
    let mut c = Candidates {
        best: 0,
        second: 0,
        best_dist: u32::MAX,
        second_dist: None,
    };
    for (k, &e) in entries.iter().enumerate() {
        let dist = abs_dist(color, e);
        if dist < c.best_dist {
            if c.best_dist != u32::MAX {
                c.second = c.best;
                c.second_dist = Some(c.best_dist);
            }
            c.best = k as u16;
            c.best_dist = dist;
        } else if c.second_dist.is_none_or(|d| dist < d) {
            c.second = k as u16;
            c.second_dist = Some(dist);
        }
    }
    c
}

/// Maps source colors to palette indices for one run, memoizing by color value.
#[derive(Debug)]
pub struct Classifier<'p> {
    palette: &'p Palette,
    strategy: MatchStrategy,
    exact: HashMap<u32, u16>,
    approximate: HashMap<u32, Candidates>,
    rng: SmallRng,
}

impl<'p> Classifier<'p> {
    pub fn new(palette: &'p Palette, strategy: MatchStrategy, seed: u64) -> Self {
        log::debug!(
            "classifier: {:?} over {} entries",
            strategy,
            palette.len()
        );
        Self {
            palette,
            strategy,
            exact: HashMap::new(),
            approximate: HashMap::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn palette(&self) -> &'p Palette {
        self.palette
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Palette index for `color`. Fully transparent colors go straight to the
    /// transparent entry when the palette has one.
    pub fn classify(&mut self, color: RGBA8) -> u16 {
        if color.a == 0 {
            if let Some(t) = self.palette.transparent_index() {
                return t;
            }
        }
        let key = pack_argb(color);
        let entries = self.palette.entries();
        match self.strategy {
            MatchStrategy::Exact => *self
                .exact
                .entry(key)
                .or_insert_with(|| nearest_color_index(entries, color)),
            MatchStrategy::Approximate => {
                let candidates = *self
                    .approximate
                    .entry(key)
                    .or_insert_with(|| closest_candidates(entries, color));
                candidates.choose(&mut self.rng)
            }
        }
    }

    /// Number of distinct colors memoized so far.
    pub fn cached(&self) -> usize {
        self.exact.len() + self.approximate.len()
    }
}
