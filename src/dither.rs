extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::classify::Classifier;
use crate::image::ScannedImage;

/// Channels per error cell, in `r, g, b, a` order.
const DJ: usize = 4;

/// Largest per-channel residual a pixel may pass on, before the 16ths weighting.
pub const DITHER_MAX: i32 = 20;

/// Add accumulated error (in sixteenths) to a channel, rounding and clamping to 0..=255.
pub fn apply_error(channel: u8, acc: i32) -> u8 {
    (channel as i32 + ((acc + 8) >> 4)).clamp(0, 255) as u8
}

/// Symmetric clamp on the residual one pixel diffuses.
pub fn limit_residual(diff: i32) -> i32 {
    diff.clamp(-DITHER_MAX, DITHER_MAX)
}

/// Two row buffers of diffused error with one guard cell at each end.
///
/// The next row is written in reverse, so that on the following (opposite-direction)
/// pass the same forward cursor reads it: for the pixel at scan step `j`, the current
/// row is read at cell `j + 1` and the row below is written around cell `width - j`.
#[derive(Debug, Clone)]
pub(crate) struct ErrorRows {
    current: Vec<i32>,
    next: Vec<i32>,
    width: usize,
}

impl ErrorRows {
    pub(crate) fn new(width: usize) -> Self {
        let len = (width + 2) * DJ;
        Self {
            current: vec![0; len],
            next: vec![0; len],
            width,
        }
    }

    /// Clear the cells of the next row that are only ever added to.
    pub(crate) fn begin_row(&mut self) {
        let start = self.width * DJ;
        self.next[start..].fill(0);
    }

    pub(crate) fn cursors(&self, step: usize) -> (usize, usize) {
        ((step + 1) * DJ, (self.width - step) * DJ)
    }

    pub(crate) fn adjusted(&self, cursor0: usize, px: RGBA8) -> RGBA8 {
        let e = &self.current[cursor0..cursor0 + DJ];
        RGBA8::new(
            apply_error(px.r, e[0]),
            apply_error(px.g, e[1]),
            apply_error(px.b, e[2]),
            apply_error(px.a, e[3]),
        )
    }

    /// Floyd-Steinberg spread in sixteenths: 7 ahead, 1 below-ahead, 5 below,
    /// 3 below-behind.
    pub(crate) fn spread(&mut self, cursor0: usize, cursor1: usize, residual: [i32; DJ]) {
        for (ch, &e) in residual.iter().enumerate() {
            self.next[cursor1 - DJ + ch] = e;
            self.next[cursor1 + DJ + ch] += 3 * e;
            self.next[cursor1 + ch] += 5 * e;
            self.current[cursor0 + DJ + ch] += 7 * e;
        }
    }

    pub(crate) fn finish_row(&mut self) {
        core::mem::swap(&mut self.current, &mut self.next);
    }
}

/// Serpentine error-diffusion remap: even rows left to right, odd rows right to left.
///
/// Every pixel is classified after adding the error diffused into it. Fully transparent
/// pixels map to the transparent entry and pass on no error. Indices come back in
/// row-major order.
pub fn dither_image(image: &ScannedImage, classifier: &mut Classifier<'_>) -> Vec<u16> {
    let (width, height) = (image.width(), image.height());
    let palette = classifier.palette();
    let transparent = palette.transparent_index();
    let pixels = image.pixels();

    let mut indices = vec![0u16; pixels.len()];
    let mut rows = ErrorRows::new(width);

    for y in 0..height {
        rows.begin_row();
        let reverse = y % 2 == 1;

        for step in 0..width {
            let x = if reverse { width - 1 - step } else { step };
            let idx = y * width + x;
            let (cursor0, cursor1) = rows.cursors(step);
            let px = pixels[idx];

            if let (0, Some(t)) = (px.a, transparent) {
                indices[idx] = t;
                rows.spread(cursor0, cursor1, [0; DJ]);
                continue;
            }

            let adjusted = rows.adjusted(cursor0, px);
            let k = classifier.classify(adjusted);
            indices[idx] = k;

            let chosen = palette.entries()[k as usize];
            let residual = [
                limit_residual(adjusted.r as i32 - chosen.r as i32),
                limit_residual(adjusted.g as i32 - chosen.g as i32),
                limit_residual(adjusted.b as i32 - chosen.b as i32),
                limit_residual(adjusted.a as i32 - chosen.a as i32),
            ];
            rows.spread(cursor0, cursor1, residual);
        }

        rows.finish_row();
    }

    indices
}
