//! Active bins: the dense, doubly-linked arena the reducer merges in place.
//!
//! Bins are addressed by their slot index. Slot 0 is the list root; since a bin only
//! ever absorbs a bin further along the list, the root is never absorbed.

extern crate alloc;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::histogram::Histogram;

/// `invalidated_at` value of a bin that has been absorbed into another.
pub(crate) const ABSORBED: u32 = u32::MAX;

/// A cluster of source pixels, born from one coarse cell.
#[derive(Debug, Clone)]
pub struct Bin {
    /// Centroid channels.
    pub a: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
    /// Population weight (raw pixel count, or its truncated square root).
    pub count: u32,
    /// Cached cost of merging with `nearest`.
    pub err: f64,
    /// Cheapest forward merge partner as of `validated_at`.
    pub nearest: Option<usize>,
    pub next: Option<usize>,
    pub prev: Option<usize>,
    /// Merge counter value when `err`/`nearest` were last computed.
    pub validated_at: u32,
    /// Merge counter value when this bin last absorbed another, or [`ABSORBED`].
    pub invalidated_at: u32,
    /// Excluded from merging in both directions.
    pub pinned: bool,
}

impl Bin {
    fn seed([a, r, g, b]: [f64; 4], count: u32, pinned: bool) -> Self {
        Self {
            a,
            r,
            g,
            b,
            count,
            err: f64::INFINITY,
            nearest: None,
            next: None,
            prev: None,
            validated_at: 0,
            invalidated_at: 0,
            pinned,
        }
    }

    pub fn is_absorbed(&self) -> bool {
        self.invalidated_at == ABSORBED
    }

    /// Centroid rounded half-to-even into a color. Alpha is opaque unless tracked.
    pub fn color(&self, with_alpha: bool) -> RGBA8 {
        let a = if with_alpha {
            to_channel(self.a)
        } else {
            u8::MAX
        };
        RGBA8::new(to_channel(self.r), to_channel(self.g), to_channel(self.b), a)
    }
}

fn channels(c: RGBA8, with_alpha: bool) -> [f64; 4] {
    let a = if with_alpha { c.a as f64 } else { 0.0 };
    [a, c.r as f64, c.g as f64, c.b as f64]
}

/// Population weight, damped to the truncated square root for large palettes.
fn weight(count: u32, sqrt_weights: bool) -> u32 {
    if sqrt_weights {
        (count as f64).sqrt() as u32
    } else {
        count
    }
}

fn to_channel(v: f64) -> u8 {
    v.round_ties_even().clamp(0.0, 255.0) as u8
}

/// Dense arena of active bins threaded into a list rooted at slot 0.
#[derive(Debug, Clone)]
pub struct BinArena {
    bins: Vec<Bin>,
    with_alpha: bool,
    active: usize,
}

impl BinArena {
    /// Compact the non-empty cells of `hist`, in increasing cell order, into linked bins.
    ///
    /// With `sqrt_weights` the raw count is replaced by its truncated square root so huge
    /// flat regions do not dominate merge costs linearly.
    pub fn compact(hist: &Histogram, sqrt_weights: bool) -> Self {
        let with_alpha = hist.with_alpha();
        let transparent_cell = hist.transparent_cell();
        let mut bins = Vec::new();

        for (cell_index, cell) in hist.cells().iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let d = 1.0 / cell.count as f64;
            bins.push(Bin::seed(
                [
                    if with_alpha { cell.a_sum * d } else { 0.0 },
                    cell.r_sum * d,
                    cell.g_sum * d,
                    cell.b_sum * d,
                ],
                weight(cell.count, sqrt_weights),
                transparent_cell == Some(cell_index),
            ));
        }

        Self::linked(bins, with_alpha)
    }

    /// One bin per exact color, in the order given. Used when the coarse cells are too
    /// few to fill the requested palette. The bin equal to `transparent` is pinned.
    pub fn from_colors(
        colors: &[(RGBA8, u32)],
        with_alpha: bool,
        sqrt_weights: bool,
        transparent: Option<RGBA8>,
    ) -> Self {
        let bins = colors
            .iter()
            .map(|&(c, count)| {
                Bin::seed(
                    channels(c, with_alpha),
                    weight(count, sqrt_weights),
                    transparent == Some(c),
                )
            })
            .collect();
        Self::linked(bins, with_alpha)
    }

    /// Build an arena straight from centroids and weights. Mainly useful for exercising
    /// the reducer on synthetic histograms.
    pub fn from_centroids(centroids: &[(RGBA8, u32)], with_alpha: bool) -> Self {
        let bins = centroids
            .iter()
            .map(|&(c, count)| Bin::seed(channels(c, with_alpha), count.max(1), false))
            .collect();
        Self::linked(bins, with_alpha)
    }

    fn linked(mut bins: Vec<Bin>, with_alpha: bool) -> Self {
        let active = bins.len();
        for i in 1..active {
            bins[i - 1].next = Some(i);
            bins[i].prev = Some(i - 1);
        }
        Self {
            bins,
            with_alpha,
            active,
        }
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub(crate) fn bin_mut(&mut self, handle: usize) -> &mut Bin {
        &mut self.bins[handle]
    }

    pub fn with_alpha(&self) -> bool {
        self.with_alpha
    }

    /// Number of bins still linked into the active list.
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Walk the active list from its root.
    pub fn active_bins(&self) -> ActiveBins<'_> {
        ActiveBins {
            arena: self,
            cursor: if self.bins.is_empty() { None } else { Some(0) },
        }
    }

    /// Incremental squared error caused by merging `a` and `b`: squared centroid distance
    /// scaled by `n1 * n2 / (n1 + n2)`. Infinite if either bin is pinned.
    pub fn merge_cost(&self, a: usize, b: usize) -> f64 {
        let (x, y) = (&self.bins[a], &self.bins[b]);
        if x.pinned || y.pinned {
            return f64::INFINITY;
        }
        let mut dist = sqr(y.r - x.r) + sqr(y.g - x.g) + sqr(y.b - x.b);
        if self.with_alpha {
            dist += sqr(y.a - x.a);
        }
        let (n1, n2) = (x.count as f64, y.count as f64);
        dist * (n1 * n2) / (n1 + n2)
    }

    /// Scan every bin after `handle` and cache the cheapest merge partner and its cost.
    pub fn find_nearest(&mut self, handle: usize) {
        let mut best = f64::INFINITY;
        let mut nearest = None;

        if !self.bins[handle].pinned {
            let mut cursor = self.bins[handle].next;
            while let Some(i) = cursor {
                let cost = self.merge_cost(handle, i);
                if cost < best {
                    best = cost;
                    nearest = Some(i);
                }
                cursor = self.bins[i].next;
            }
        }

        let bin = &mut self.bins[handle];
        bin.err = best;
        bin.nearest = nearest;
    }

    /// Fold `absorbed` into `survivor` (population-weighted centroid, summed count), unlink
    /// `absorbed` and stamp both bins with `merge_count`.
    pub(crate) fn absorb(&mut self, survivor: usize, absorbed: usize, merge_count: u32) {
        let other = self.bins[absorbed].clone();
        let (n1, n2) = (self.bins[survivor].count as f64, other.count as f64);
        let d = 1.0 / (n1 + n2);

        let with_alpha = self.with_alpha;
        let s = &mut self.bins[survivor];
        if with_alpha {
            s.a = d * (n1 * s.a + n2 * other.a);
        }
        s.r = d * (n1 * s.r + n2 * other.r);
        s.g = d * (n1 * s.g + n2 * other.g);
        s.b = d * (n1 * s.b + n2 * other.b);
        s.count += other.count;
        s.invalidated_at = merge_count;

        self.unlink(absorbed);
        self.bins[absorbed].invalidated_at = ABSORBED;
        self.active -= 1;
    }

    fn unlink(&mut self, handle: usize) {
        let (prev, next) = (self.bins[handle].prev, self.bins[handle].next);
        if let Some(p) = prev {
            self.bins[p].next = next;
        }
        if let Some(n) = next {
            self.bins[n].prev = prev;
        }
        let bin = &mut self.bins[handle];
        bin.prev = None;
        bin.next = None;
    }
}

fn sqr(v: f64) -> f64 {
    v * v
}

/// Iterator over active bin handles in list order.
pub struct ActiveBins<'a> {
    arena: &'a BinArena,
    cursor: Option<usize>,
}

impl Iterator for ActiveBins<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.cursor?;
        self.cursor = self.arena.bins[current].next;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::build_histogram;
    use crate::image::{PixelBuffer, ScannedImage};

    fn arena(colors: &[(u8, u8, u8, u32)]) -> BinArena {
        let centroids: Vec<(RGBA8, u32)> = colors
            .iter()
            .map(|&(r, g, b, n)| (RGBA8::new(r, g, b, 255), n))
            .collect();
        BinArena::from_centroids(&centroids, false)
    }

    #[test]
    fn compaction_links_bins_in_cell_order() {
        let px = vec![
            RGBA8::new(255, 0, 0, 255),
            RGBA8::new(0, 0, 255, 255),
            RGBA8::new(0, 255, 0, 255),
            RGBA8::new(255, 0, 0, 255),
        ];
        let image = ScannedImage::scan(&PixelBuffer::new(&px, 2, 2).unwrap()).unwrap();
        let arena = BinArena::compact(&build_histogram(&image), false);

        assert_eq!(arena.active_count(), 3);
        let order: Vec<RGBA8> = arena
            .active_bins()
            .map(|h| arena.bins()[h].color(false))
            .collect();
        // blue (0x001F) < green (0x07E0) < red (0xF800)
        assert_eq!(
            order,
            vec![
                RGBA8::new(0, 0, 255, 255),
                RGBA8::new(0, 255, 0, 255),
                RGBA8::new(255, 0, 0, 255)
            ]
        );
        assert_eq!(arena.bins()[0].prev, None);
        assert_eq!(arena.bins()[2].next, None);
        assert_eq!(arena.bins()[2].count, 2);
    }

    #[test]
    fn sqrt_weights_damp_counts() {
        let px = vec![RGBA8::new(40, 40, 40, 255); 100];
        let image = ScannedImage::scan(&PixelBuffer::new(&px, 10, 10).unwrap()).unwrap();
        let arena = BinArena::compact(&build_histogram(&image), true);
        assert_eq!(arena.bins()[0].count, 10);
    }

    #[test]
    fn merge_cost_weights_by_population() {
        let arena = arena(&[(0, 0, 0, 1), (3, 4, 0, 1), (3, 4, 0, 3)]);
        // distance^2 = 25, 1*1/2
        assert_eq!(arena.merge_cost(0, 1), 12.5);
        // 1*3/4
        assert_eq!(arena.merge_cost(0, 2), 18.75);
        assert_eq!(arena.merge_cost(1, 2), 0.0);
    }

    #[test]
    fn find_nearest_only_looks_forward() {
        let mut arena = arena(&[(0, 0, 0, 1), (100, 0, 0, 1), (10, 0, 0, 1)]);
        arena.find_nearest(0);
        assert_eq!(arena.bins()[0].nearest, Some(2));
        assert_eq!(arena.bins()[0].err, 50.0);

        arena.find_nearest(1);
        assert_eq!(arena.bins()[1].nearest, Some(2));

        // The last bin has nothing ahead of it
        arena.find_nearest(2);
        assert_eq!(arena.bins()[2].nearest, None);
        assert!(arena.bins()[2].err.is_infinite());
    }

    #[test]
    fn absorb_moves_centroid_and_unlinks() {
        let mut arena = arena(&[(0, 0, 0, 1), (30, 0, 0, 1), (90, 0, 0, 2)]);
        arena.absorb(1, 2, 1);

        let survivor = &arena.bins()[1];
        assert_eq!(survivor.r, 70.0);
        assert_eq!(survivor.count, 3);
        assert_eq!(survivor.invalidated_at, 1);
        assert_eq!(survivor.next, None);
        assert!(arena.bins()[2].is_absorbed());
        assert_eq!(arena.active_count(), 2);
        assert_eq!(arena.active_bins().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn exact_colors_keep_their_values_and_pin_transparent() {
        let hole = RGBA8::new(4, 4, 4, 0);
        let colors = [
            (hole, 3),
            (RGBA8::new(200, 10, 10, 90), 16),
            (RGBA8::new(201, 10, 10, 90), 1),
        ];
        let arena = BinArena::from_colors(&colors, true, true, Some(hole));

        assert_eq!(arena.active_count(), 3);
        assert!(arena.bins()[0].pinned);
        assert!(!arena.bins()[1].pinned);
        assert_eq!(arena.bins()[1].count, 4);
        assert_eq!(arena.bins()[2].color(true), RGBA8::new(201, 10, 10, 90));
        assert!(arena.merge_cost(0, 1).is_infinite());
    }

    #[test]
    fn pinned_bins_never_pair() {
        let mut arena = arena(&[(0, 0, 0, 1), (1, 1, 1, 1), (200, 0, 0, 1)]);
        arena.bin_mut(1).pinned = true;
        arena.find_nearest(0);
        assert_eq!(arena.bins()[0].nearest, Some(2));
        arena.find_nearest(1);
        assert_eq!(arena.bins()[1].nearest, None);
    }
}
